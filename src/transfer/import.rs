//! Import: a plan built from the receiving side ("which ids do I need, and from whom").

use std::sync::Arc;

use crate::algs::communicator::Communicator;
use crate::partition::{GlobalId, IndexPartition, LocalId};
use crate::remap_error::RemapError;
use crate::transfer::config::ExchangeConfig;
use crate::transfer::export::Export;
use crate::transfer::plan::{Direction, TransferPlan};
use crate::transfer::RedistributionPattern;

/// Redistribution from `source` to `target`, discovered by the target side.
///
/// `do_import` with an Import runs forward; `do_export` runs it in reverse.
#[derive(Clone, Debug)]
pub struct Import {
    plan: TransferPlan,
}

impl Import {
    /// Collective.
    pub fn new<C: Communicator>(
        source: Arc<IndexPartition>,
        target: Arc<IndexPartition>,
        comm: &C,
    ) -> Result<Self, RemapError> {
        Self::with_config(source, target, comm, &ExchangeConfig::default())
    }

    pub fn with_config<C: Communicator>(
        source: Arc<IndexPartition>,
        target: Arc<IndexPartition>,
        comm: &C,
        config: &ExchangeConfig,
    ) -> Result<Self, RemapError> {
        Ok(Self {
            plan: TransferPlan::import(source, target, comm, config)?,
        })
    }

    /// Build from correspondences the caller already knows, skipping discovery.
    ///
    /// `remote_pids[k]` owns `remote_gids[k]`, for every id of `target` that is
    /// not held locally by `source`; `export_lids[k]` is sent to `export_pids[k]`.
    /// The result is identical to [`Import::new`] on the same partitions.
    #[allow(clippy::too_many_arguments)]
    pub fn from_remote_lists<C: Communicator>(
        source: Arc<IndexPartition>,
        target: Arc<IndexPartition>,
        remote_pids: &[usize],
        remote_gids: &[GlobalId],
        export_lids: &[LocalId],
        export_pids: &[usize],
        comm: &C,
    ) -> Result<Self, RemapError> {
        Self::from_remote_lists_with_config(
            source,
            target,
            remote_pids,
            remote_gids,
            export_lids,
            export_pids,
            comm,
            &ExchangeConfig::default(),
        )
    }

    /// [`Import::from_remote_lists`] with explicit tags and error-check settings.
    #[allow(clippy::too_many_arguments)]
    pub fn from_remote_lists_with_config<C: Communicator>(
        source: Arc<IndexPartition>,
        target: Arc<IndexPartition>,
        remote_pids: &[usize],
        remote_gids: &[GlobalId],
        export_lids: &[LocalId],
        export_pids: &[usize],
        comm: &C,
        config: &ExchangeConfig,
    ) -> Result<Self, RemapError> {
        let plan = TransferPlan::import_from_lists(
            source,
            target,
            remote_pids,
            remote_gids,
            export_lids,
            export_pids,
            comm,
            config,
        )?;
        Ok(Self { plan })
    }

    /// The Export from `target` to `source`, sharing this plan's lists and distributor.
    pub fn reverse(&self) -> Export {
        Export::from_plan(self.plan.reversed())
    }

    pub(crate) fn from_plan(plan: TransferPlan) -> Self {
        Self { plan }
    }
}

impl RedistributionPattern for Import {
    fn plan(&self) -> &TransferPlan {
        &self.plan
    }

    fn import_direction(&self) -> Direction {
        Direction::Forward
    }
}
