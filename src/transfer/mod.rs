//! Redistribution patterns and the transfer engine that runs them.
//!
//! - [`Import`]/[`Export`]: precomputed correspondence between two partitions.
//! - [`Transferable`]: what a container implements to take part in a transfer.
//! - [`DistObjectExt::do_import`]/[`DistObjectExt::do_export`]: run a pattern
//!   in the right direction under a [`CombineMode`].

pub mod combine;
pub mod config;
pub mod dist_object;
pub mod export;
pub mod import;
pub mod plan;

pub use combine::{AbsMaxCombine, AddCombine, Combine, CombineMode, ReplaceCombine, Scalar};
pub use config::ExchangeConfig;
pub use dist_object::{DistObjectExt, PacketLayout, Transferable, transfer};
pub use export::Export;
pub use import::Import;
pub use plan::{Covered, Direction, TransferLists, TransferPlan};

use std::sync::Arc;

use crate::algs::distributor::Distributor;
use crate::partition::{IndexPartition, LocalId};

/// Common read-only surface of [`Import`] and [`Export`].
pub trait RedistributionPattern {
    fn plan(&self) -> &TransferPlan;

    /// Direction `do_import` runs this pattern in.
    fn import_direction(&self) -> Direction;

    /// Direction `do_export` runs this pattern in.
    fn export_direction(&self) -> Direction {
        self.import_direction().flip()
    }

    fn source_partition(&self) -> &Arc<IndexPartition> {
        self.plan().source()
    }
    fn target_partition(&self) -> &Arc<IndexPartition> {
        self.plan().target()
    }
    fn num_same(&self) -> usize {
        self.plan().num_same()
    }
    fn num_permute(&self) -> usize {
        self.plan().permute_to_lids().len()
    }
    fn num_remote(&self) -> usize {
        self.plan().remote_lids().len()
    }
    fn num_export(&self) -> usize {
        self.plan().export_lids().len()
    }
    fn permute_to_lids(&self) -> &[LocalId] {
        self.plan().permute_to_lids()
    }
    fn permute_from_lids(&self) -> &[LocalId] {
        self.plan().permute_from_lids()
    }
    fn remote_lids(&self) -> &[LocalId] {
        self.plan().remote_lids()
    }
    fn remote_pids(&self) -> &[usize] {
        self.plan().remote_pids()
    }
    fn export_lids(&self) -> &[LocalId] {
        self.plan().export_lids()
    }
    fn export_pids(&self) -> &[usize] {
        self.plan().export_pids()
    }
    fn distributor(&self) -> &Distributor {
        self.plan().distributor()
    }
}
