//! Fixed, little-endian wire records for partition and plan set-up traffic.
//!
//! Every multi-byte integer is stored pre-LE with `.to_le()` and decoded with
//! `from_le`, so mixed-endian groups agree on the bytes.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::size_of;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

/// Copy raw message bytes into a typed vector.
///
/// Received buffers carry no alignment guarantee, so the bytes are copied into
/// storage that does. Returns `None` if the length is not a whole number of records.
pub fn decode_vec<T: Pod>(raw: &[u8]) -> Option<Vec<T>> {
    let width = size_of::<T>();
    if width == 0 || raw.len() % width != 0 {
        return None;
    }
    let mut out = vec![T::zeroed(); raw.len() / width];
    bytemuck::cast_slice_mut(&mut out).copy_from_slice(raw);
    Some(out)
}

/// A count in a size exchange.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u64,
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u64).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u64::from_le(self.n_le) as usize
    }
}

/// A global id on the wire.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct WireGid {
    pub gid_le: u64,
}

impl WireGid {
    pub fn of(gid: u64) -> Self {
        Self { gid_le: gid.to_le() }
    }
    pub fn get(&self) -> u64 {
        u64::from_le(self.gid_le)
    }
}

/// Registration of one locally held id with its directory rank.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct WireDirEntry {
    pub gid_le: u64,
    pub lid_le: u64,
}

impl WireDirEntry {
    pub fn new(gid: u64, lid: usize) -> Self {
        Self {
            gid_le: gid.to_le(),
            lid_le: (lid as u64).to_le(),
        }
    }
    pub fn gid(&self) -> u64 {
        u64::from_le(self.gid_le)
    }
    pub fn lid(&self) -> usize {
        u64::from_le(self.lid_le) as usize
    }
}

/// Directory answer: owning rank and local index, or "not found".
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct WireOwner {
    pub rank_le: u64,
    pub lid_le: u64,
}

impl WireOwner {
    const NOT_FOUND: u64 = u64::MAX;

    pub fn found(rank: usize, lid: usize) -> Self {
        Self {
            rank_le: (rank as u64).to_le(),
            lid_le: (lid as u64).to_le(),
        }
    }
    pub fn not_found() -> Self {
        Self {
            rank_le: Self::NOT_FOUND.to_le(),
            lid_le: Self::NOT_FOUND.to_le(),
        }
    }
    /// `(rank, lid)` when the id has an owner.
    pub fn get(&self) -> Option<(usize, usize)> {
        let rank = u64::from_le(self.rank_le);
        (rank != Self::NOT_FOUND).then(|| (rank as usize, u64::from_le(self.lid_le) as usize))
    }
}

/// Per-rank summary gathered when a partition is constructed.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct WireRankLayout {
    pub count_le: u64,
    pub first_le: u64,
    pub min_le: u64,
    pub max_le: u64,
    pub flags_le: u64,
}

impl WireRankLayout {
    pub const LOCALLY_CONTIGUOUS: u64 = 1;
    pub const INVALID_INPUT: u64 = 1 << 1;

    pub fn new(count: usize, first: u64, min: u64, max: u64, flags: u64) -> Self {
        Self {
            count_le: (count as u64).to_le(),
            first_le: first.to_le(),
            min_le: min.to_le(),
            max_le: max.to_le(),
            flags_le: flags.to_le(),
        }
    }

    /// Layout of a rank whose input was rejected.
    pub fn invalid() -> Self {
        Self::new(0, 0, 0, 0, Self::INVALID_INPUT)
    }

    pub fn count(&self) -> usize {
        u64::from_le(self.count_le) as usize
    }
    pub fn first(&self) -> u64 {
        u64::from_le(self.first_le)
    }
    pub fn min(&self) -> u64 {
        u64::from_le(self.min_le)
    }
    pub fn max(&self) -> u64 {
        u64::from_le(self.max_le)
    }
    fn flags(&self) -> u64 {
        u64::from_le(self.flags_le)
    }
    pub fn is_locally_contiguous(&self) -> bool {
        self.flags() & Self::LOCALLY_CONTIGUOUS != 0
    }
    pub fn is_invalid(&self) -> bool {
        self.flags() & Self::INVALID_INPUT != 0
    }
}

const_assert_eq!(size_of::<WireCount>(), 8);
const_assert_eq!(size_of::<WireGid>(), 8);
const_assert_eq!(size_of::<WireDirEntry>(), 16);
const_assert_eq!(size_of::<WireOwner>(), 16);
const_assert_eq!(size_of::<WireRankLayout>(), 40);
