//! MultiVector: a block of `num_vectors` columns over one partition.
//!
//! Storage is column-major: column `j` occupies `values[j * n .. (j + 1) * n]`
//! with `n` local entries. One entry travels as `num_vectors` packets, one per
//! column, so the packet layout is constant.

use std::sync::Arc;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::partition::{GlobalId, IndexPartition, LocalId};
use crate::remap_error::RemapError;
use crate::transfer::combine::{CombineMode, Scalar};
use crate::transfer::dist_object::{PacketLayout, Transferable};

#[derive(Clone, Debug)]
pub struct MultiVector<V> {
    partition: Arc<IndexPartition>,
    num_vectors: usize,
    values: Vec<V>,
}

impl<V: Scalar> MultiVector<V> {
    /// Zero-filled.
    pub fn new(partition: Arc<IndexPartition>, num_vectors: usize) -> Result<Self, RemapError> {
        if num_vectors == 0 {
            return Err(RemapError::InvalidArgument(
                "a multivector needs at least one column".into(),
            ));
        }
        let len = partition.local_count() * num_vectors;
        Ok(Self {
            partition,
            num_vectors,
            values: vec![V::zero(); len],
        })
    }

    /// Filled from `f(global id, column)`.
    pub fn from_fn<F>(partition: Arc<IndexPartition>, num_vectors: usize, mut f: F) -> Result<Self, RemapError>
    where
        F: FnMut(GlobalId, usize) -> V,
    {
        let mut mv = Self::new(partition, num_vectors)?;
        let gids: Vec<GlobalId> = mv.partition.global_ids().collect();
        let n = gids.len();
        for col in 0..num_vectors {
            for (lid, &gid) in gids.iter().enumerate() {
                mv.values[col * n + lid] = f(gid, col);
            }
        }
        Ok(mv)
    }

    pub fn partition(&self) -> &Arc<IndexPartition> {
        &self.partition
    }

    pub fn num_vectors(&self) -> usize {
        self.num_vectors
    }

    pub fn local_len(&self) -> usize {
        self.values.len() / self.num_vectors
    }

    fn slot(&self, lid: LocalId, col: usize) -> Result<usize, RemapError> {
        let n = self.local_len();
        if lid >= n {
            return Err(RemapError::LocalIndexOutOfRange { lid, len: n });
        }
        if col >= self.num_vectors {
            return Err(RemapError::InvalidArgument(format!(
                "column {col} out of range ({} columns)",
                self.num_vectors
            )));
        }
        Ok(col * n + lid)
    }

    pub fn get(&self, lid: LocalId, col: usize) -> Result<V, RemapError> {
        Ok(self.values[self.slot(lid, col)?])
    }

    pub fn replace_local_value(&mut self, lid: LocalId, col: usize, value: V) -> Result<(), RemapError> {
        let at = self.slot(lid, col)?;
        self.values[at] = value;
        Ok(())
    }

    pub fn column(&self, col: usize) -> Result<&[V], RemapError> {
        if col >= self.num_vectors {
            return Err(RemapError::InvalidArgument(format!(
                "column {col} out of range ({} columns)",
                self.num_vectors
            )));
        }
        let n = self.local_len();
        Ok(&self.values[col * n..(col + 1) * n])
    }

    pub fn put_scalar(&mut self, value: V) {
        self.values.fill(value);
    }

    /// `self = alpha * other + beta * self`, over compatible partitions.
    pub fn update(&mut self, alpha: V, other: &Self, beta: V) -> Result<(), RemapError> {
        if !self.partition.is_compatible(&other.partition) {
            return Err(RemapError::IncompatiblePartitions {
                left: self.partition.global_count(),
                right: other.partition.global_count(),
            });
        }
        if self.num_vectors != other.num_vectors {
            return Err(RemapError::SizeMismatch {
                what: "number of vectors",
                expected: self.num_vectors,
                got: other.num_vectors,
            });
        }
        for (mine, &theirs) in self.values.iter_mut().zip(&other.values) {
            *mine = alpha * theirs + beta * *mine;
        }
        Ok(())
    }

    fn check_lids(&self, lids: &[LocalId]) -> Result<(), RemapError> {
        let n = self.local_len();
        match lids.iter().find(|&&lid| lid >= n) {
            Some(&lid) => Err(RemapError::LocalIndexOutOfRange { lid, len: n }),
            None => Ok(()),
        }
    }
}

impl<V: Scalar> Transferable for MultiVector<V> {
    type Packet = V;

    fn partition(&self) -> &Arc<IndexPartition> {
        &self.partition
    }

    fn local_len(&self) -> usize {
        MultiVector::local_len(self)
    }

    fn packet_layout(&self) -> PacketLayout {
        PacketLayout::Constant(self.num_vectors)
    }

    fn check_sizes(&self, source: &Self) -> Result<(), RemapError> {
        if self.num_vectors != source.num_vectors {
            return Err(RemapError::SizeMismatch {
                what: "number of vectors",
                expected: self.num_vectors,
                got: source.num_vectors,
            });
        }
        Ok(())
    }

    fn supports_combine(&self, mode: CombineMode) -> bool {
        mode != CombineMode::Insert
    }

    fn copy_and_permute(
        &mut self,
        source: &Self,
        num_same: usize,
        permute_to: &[LocalId],
        permute_from: &[LocalId],
    ) -> Result<(), RemapError> {
        let (n_dst, n_src) = (self.local_len(), source.local_len());
        if num_same > n_dst.min(n_src) {
            return Err(RemapError::SizeMismatch {
                what: "same-entry prefix",
                expected: n_dst.min(n_src),
                got: num_same,
            });
        }
        self.check_lids(permute_to)?;
        source.check_lids(permute_from)?;
        for col in 0..self.num_vectors {
            let src = &source.values[col * n_src..(col + 1) * n_src];
            let dst = &mut self.values[col * n_dst..(col + 1) * n_dst];
            dst[..num_same].copy_from_slice(&src[..num_same]);
            for (&to, &from) in permute_to.iter().zip(permute_from) {
                dst[to] = src[from];
            }
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
        let (n, k) = (self.local_len(), self.num_vectors);
        exports.clear();
        exports.resize(export_lids.len() * k, V::zero());

        #[cfg(feature = "rayon")]
        exports
            .par_chunks_mut(k)
            .zip(export_lids.par_iter())
            .for_each(|(packet, &lid)| {
                for (col, slot) in packet.iter_mut().enumerate() {
                    *slot = self.values[col * n + lid];
                }
            });
        #[cfg(not(feature = "rayon"))]
        for (packet, &lid) in exports.chunks_mut(k).zip(export_lids) {
            for (col, slot) in packet.iter_mut().enumerate() {
                *slot = self.values[col * n + lid];
            }
        }

        packets_per_lid.fill(k);
        Ok(())
    }

    fn unpack_and_combine(
        &mut self,
        import_lids: &[LocalId],
        imports: &[V],
        _packets_per_lid: &[usize],
        mode: CombineMode,
    ) -> Result<(), RemapError> {
        let fuse = mode.fuse_fn::<V>()?;
        let (n, k) = (self.local_len(), self.num_vectors);
        if imports.len() != import_lids.len() * k {
            return Err(RemapError::SizeMismatch {
                what: "received packets",
                expected: import_lids.len() * k,
                got: imports.len(),
            });
        }
        self.check_lids(import_lids)?;
        // sequential: several packets may land on one entry
        for (packet, &lid) in imports.chunks(k).zip(import_lids) {
            for (col, &incoming) in packet.iter().enumerate() {
                fuse(&mut self.values[col * n + lid], incoming);
            }
        }
        Ok(())
    }
}
