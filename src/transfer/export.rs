//! Export: a plan built from the sending side ("which of my ids go where").

use std::sync::Arc;

use crate::algs::communicator::Communicator;
use crate::partition::IndexPartition;
use crate::remap_error::RemapError;
use crate::transfer::config::ExchangeConfig;
use crate::transfer::import::Import;
use crate::transfer::plan::{Direction, TransferPlan};
use crate::transfer::RedistributionPattern;

/// Redistribution from `source` to `target`, discovered by the source side.
///
/// `do_export` with an Export runs forward; `do_import` runs it in reverse.
#[derive(Clone, Debug)]
pub struct Export {
    plan: TransferPlan,
}

impl Export {
    /// Collective. Every id held by `source` must be held somewhere in `target`.
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
            plan: TransferPlan::export(source, target, comm, config)?,
        })
    }

    /// The Import from `target` to `source`, sharing this plan's lists and distributor.
    pub fn reverse(&self) -> Import {
        Import::from_plan(self.plan.reversed())
    }

    pub(crate) fn from_plan(plan: TransferPlan) -> Self {
        Self { plan }
    }
}

impl RedistributionPattern for Export {
    fn plan(&self) -> &TransferPlan {
        &self.plan
    }

    fn import_direction(&self) -> Direction {
        Direction::Reverse
    }
}
