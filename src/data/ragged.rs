//! RaggedArray: one growable row of values per local entry.
//!
//! Rows travel with their own length, so transfers use variable packets, and
//! `Insert` appends incoming rows to the stored ones.

use std::sync::Arc;

use crate::partition::{IndexPartition, LocalId};
use crate::remap_error::RemapError;
use crate::transfer::combine::{CombineMode, Scalar};
use crate::transfer::dist_object::{PacketLayout, Transferable};

#[derive(Clone, Debug)]
pub struct RaggedArray<V> {
    partition: Arc<IndexPartition>,
    rows: Vec<Vec<V>>,
}

impl<V: Scalar> RaggedArray<V> {
    /// One empty row per local entry.
    pub fn new(partition: Arc<IndexPartition>) -> Self {
        let rows = vec![Vec::new(); partition.local_count()];
        Self { partition, rows }
    }

    pub fn from_rows(partition: Arc<IndexPartition>, rows: Vec<Vec<V>>) -> Result<Self, RemapError> {
        if rows.len() != partition.local_count() {
            return Err(RemapError::SizeMismatch {
                what: "ragged rows",
                expected: partition.local_count(),
                got: rows.len(),
            });
        }
        Ok(Self { partition, rows })
    }

    pub fn partition(&self) -> &Arc<IndexPartition> {
        &self.partition
    }

    pub fn row(&self, lid: LocalId) -> Result<&[V], RemapError> {
        self.rows
            .get(lid)
            .map(Vec::as_slice)
            .ok_or(RemapError::LocalIndexOutOfRange {
                lid,
                len: self.rows.len(),
            })
    }

    pub fn push(&mut self, lid: LocalId, value: V) -> Result<(), RemapError> {
        let len = self.rows.len();
        self.rows
            .get_mut(lid)
            .ok_or(RemapError::LocalIndexOutOfRange { lid, len })?
            .push(value);
        Ok(())
    }

    pub fn rows(&self) -> &[Vec<V>] {
        &self.rows
    }

    fn check_lids(&self, lids: &[LocalId]) -> Result<(), RemapError> {
        let len = self.rows.len();
        match lids.iter().find(|&&lid| lid >= len) {
            Some(&lid) => Err(RemapError::LocalIndexOutOfRange { lid, len }),
            None => Ok(()),
        }
    }
}

impl<V: Scalar> Transferable for RaggedArray<V> {
    type Packet = V;

    fn partition(&self) -> &Arc<IndexPartition> {
        &self.partition
    }

    fn local_len(&self) -> usize {
        self.rows.len()
    }

    fn packet_layout(&self) -> PacketLayout {
        PacketLayout::Variable
    }

    fn supports_combine(&self, _mode: CombineMode) -> bool {
        true
    }

    fn copy_and_permute(
        &mut self,
        source: &Self,
        num_same: usize,
        permute_to: &[LocalId],
        permute_from: &[LocalId],
    ) -> Result<(), RemapError> {
        if num_same > self.rows.len().min(source.rows.len()) {
            return Err(RemapError::SizeMismatch {
                what: "same-entry prefix",
                expected: self.rows.len().min(source.rows.len()),
                got: num_same,
            });
        }
        self.check_lids(permute_to)?;
        source.check_lids(permute_from)?;
        self.rows[..num_same].clone_from_slice(&source.rows[..num_same]);
        for (&to, &from) in permute_to.iter().zip(permute_from) {
            self.rows[to].clone_from(&source.rows[from]);
        }
        Ok(())
    }

    fn pack_and_prepare(
        &self,
        export_lids: &[LocalId],
        exports: &mut Vec<V>,
        packets_per_lid: &mut [usize],
    ) -> Result<(), RemapError> {
        self.check_lids(export_lids)?;
        exports.clear();
        for (count, &lid) in packets_per_lid.iter_mut().zip(export_lids) {
            *count = self.rows[lid].len();
            exports.extend_from_slice(&self.rows[lid]);
        }
        Ok(())
    }

    /// `Replace` swaps the row for the incoming one and `Insert` appends it.
    /// `Add` and `AbsMax` merge position by position; entries past the end of
    /// the stored row are appended.
    fn unpack_and_combine(
        &mut self,
        import_lids: &[LocalId],
        imports: &[V],
        packets_per_lid: &[usize],
        mode: CombineMode,
    ) -> Result<(), RemapError> {
        if packets_per_lid.len() != import_lids.len() {
            return Err(RemapError::SizeMismatch {
                what: "received packet counts",
                expected: import_lids.len(),
                got: packets_per_lid.len(),
            });
        }
        let total: usize = packets_per_lid.iter().sum();
        if total != imports.len() {
            return Err(RemapError::SizeMismatch {
                what: "received packets",
                expected: total,
                got: imports.len(),
            });
        }
        self.check_lids(import_lids)?;

        let mut offset = 0;
        for (&lid, &count) in import_lids.iter().zip(packets_per_lid) {
            let incoming = &imports[offset..offset + count];
            offset += count;
            let row = &mut self.rows[lid];
            match mode {
                CombineMode::Replace => {
                    row.clear();
                    row.extend_from_slice(incoming);
                }
                CombineMode::Insert => row.extend_from_slice(incoming),
                CombineMode::Add | CombineMode::AbsMax => {
                    let fuse = mode.fuse_fn::<V>()?;
                    let shared = row.len().min(count);
                    for (slot, &v) in row.iter_mut().zip(&incoming[..shared]) {
                        fuse(slot, v);
                    }
                    row.extend_from_slice(&incoming[shared..]);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;

    fn part(n: usize) -> Arc<IndexPartition> {
        Arc::new(IndexPartition::contiguous(None, n, 0, &NoComm).unwrap())
    }

    #[test]
    fn pack_reports_row_lengths() {
        let r = RaggedArray::from_rows(part(3), vec![vec![1i32], vec![], vec![2, 3]]).unwrap();
        let mut exports = Vec::new();
        let mut counts = vec![0; 3];
        r.pack_and_prepare(&[2, 1, 0], &mut exports, &mut counts).unwrap();
        assert_eq!(exports, vec![2, 3, 1]);
        assert_eq!(counts, vec![2, 0, 1]);
    }

    #[test]
    fn insert_appends_and_add_extends() {
        let mut r = RaggedArray::from_rows(part(2), vec![vec![1i64], vec![5, 5]]).unwrap();
        r.unpack_and_combine(&[0, 1], &[7, 8, 1], &[2, 1], CombineMode::Insert)
            .unwrap();
        assert_eq!(r.row(0).unwrap(), &[1, 7, 8]);
        assert_eq!(r.row(1).unwrap(), &[5, 5, 1]);
        r.unpack_and_combine(&[1], &[1, 1, 1, 1], &[4], CombineMode::Add)
            .unwrap();
        assert_eq!(r.row(1).unwrap(), &[6, 6, 2, 1]);
    }

    #[test]
    fn replace_swaps_rows() {
        let mut r = RaggedArray::from_rows(part(1), vec![vec![1i32, 2, 3]]).unwrap();
        r.unpack_and_combine(&[0], &[9], &[1], CombineMode::Replace).unwrap();
        assert_eq!(r.row(0).unwrap(), &[9]);
    }
}
