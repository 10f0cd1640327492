//! TransferPlan: the classified index correspondence between two partitions.
//!
//! Seen from the receiving side, every target local index is exactly one of:
//! a *same* entry (leading prefix where source and target agree position by
//! position), a *permute* entry (held locally by both, at different
//! positions), or a *remote* entry (held elsewhere and received). On the
//! sending side, *export* entries are source local indices some other rank
//! needs. The plan owns the [`Distributor`] that moves exports to remotes, and
//! lazily the reversed one for transfers in the opposite direction.

use itertools::Itertools;
use once_cell::sync::OnceCell;
use std::sync::Arc;

use crate::algs::collective::agree_if;
use crate::algs::communicator::Communicator;
use crate::algs::distributor::Distributor;
use crate::algs::wire::WireGid;
use crate::debug_invariants::DebugInvariants;
use crate::partition::{GlobalId, IndexPartition, LocalId, RemoteIndex};
use crate::remap_error::RemapError;
use crate::transfer::config::ExchangeConfig;

/// Direction of a transfer relative to how a plan was built.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Exports are sent and remotes received, as built.
    Forward,
    /// Remotes are sent back and exports received.
    Reverse,
}

impl Direction {
    pub fn flip(self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }
}

/// Partition whose every local entry the plan classifies.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Covered {
    /// Built from the receiving side (Import): same + permute + remote.
    Target,
    /// Built from the sending side (Export): same + permute + export.
    Source,
}

#[derive(Clone, Debug)]
pub struct TransferPlan {
    covered: Covered,
    source: Arc<IndexPartition>,
    target: Arc<IndexPartition>,
    num_same: usize,
    permute_to_lids: Vec<LocalId>,
    permute_from_lids: Vec<LocalId>,
    remote_lids: Vec<LocalId>,
    remote_pids: Vec<usize>,
    export_lids: Vec<LocalId>,
    export_pids: Vec<usize>,
    distributor: Distributor,
    reverse_distributor: OnceCell<Distributor>,
}

/// Lists one transfer reads, already oriented for its direction.
#[derive(Clone, Copy, Debug)]
pub struct TransferLists<'a> {
    /// Partition the data is read from.
    pub from: &'a IndexPartition,
    /// Partition the data is written into.
    pub into: &'a IndexPartition,
    pub num_same: usize,
    pub permute_to: &'a [LocalId],
    pub permute_from: &'a [LocalId],
    /// Local indices of `from` that are packed and sent.
    pub send_lids: &'a [LocalId],
    /// Local indices of `into` that receive, in arrival order.
    pub recv_lids: &'a [LocalId],
    pub distributor: &'a Distributor,
}

fn count_same(source: &IndexPartition, target: &IndexPartition) -> usize {
    source
        .global_ids()
        .zip(target.global_ids())
        .take_while(|(s, t)| s == t)
        .count()
}

/// Owner rank of each id, or the first unresolved id and how many there were.
fn resolve_owners(gids: &[GlobalId], owners: &[Option<RemoteIndex>]) -> Result<Vec<usize>, RemapError> {
    let missing = owners.iter().filter(|o| o.is_none()).count();
    match owners.iter().position(Option::is_none) {
        Some(k) => Err(RemapError::UnmappedIdentifier {
            gid: gids[k],
            count: missing,
        }),
        None => Ok(owners.iter().flatten().map(|o| o.rank).collect()),
    }
}

fn apply_order<T: Copy>(values: &[T], order: &[usize]) -> Vec<T> {
    order.iter().map(|&i| values[i]).collect()
}

fn wire_ids(gids: &[GlobalId]) -> Vec<WireGid> {
    gids.iter().map(|&g| WireGid::of(g)).collect()
}

/// Local indices in `partition` of ids received from peers.
fn local_lids_of(partition: &IndexPartition, ids: &[WireGid]) -> Result<Vec<LocalId>, RemapError> {
    ids.iter()
        .map(|w| {
            partition
                .global_to_local(w.get())
                .ok_or(RemapError::UnmappedIdentifier { gid: w.get(), count: 1 })
        })
        .collect()
}

impl TransferPlan {
    /// Discovery construction seen from the receiving (target) side.
    pub(crate) fn import<C: Communicator>(
        source: Arc<IndexPartition>,
        target: Arc<IndexPartition>,
        comm: &C,
        config: &ExchangeConfig,
    ) -> Result<Self, RemapError> {
        let num_same = count_same(&source, &target);
        let mut permute_to_lids = Vec::new();
        let mut permute_from_lids = Vec::new();
        let mut remote_lids = Vec::new();
        let mut remote_gids = Vec::new();
        for lid in num_same..target.local_count() {
            let gid = target.gid_at(lid);
            match source.global_to_local(gid) {
                Some(src) => {
                    permute_to_lids.push(lid);
                    permute_from_lids.push(src);
                }
                None => {
                    remote_lids.push(lid);
                    remote_gids.push(gid);
                }
            }
        }

        let owners = source.owner_and_local_index_with(&remote_gids, comm, config.directory_tags)?;
        let resolved = resolve_owners(&remote_gids, &owners);
        agree_if(
            comm,
            config.collective_error_checks,
            resolved.as_ref().map(|_| ()).map_err(Clone::clone),
        )?;
        let pids = resolved?;

        // group by owner; stable, so each group stays in target order
        let order: Vec<usize> = (0..pids.len()).sorted_by_key(|&k| pids[k]).collect();
        let remote_pids = apply_order(&pids, &order);
        let remote_lids = apply_order(&remote_lids, &order);
        let remote_gids = apply_order(&remote_gids, &order);

        let requests = Distributor::from_sends(&remote_pids, comm, config.tags, false)?;
        let asked = requests.execute(&wire_ids(&remote_gids), 1, comm, config.tags.data)?;
        let export_lids = local_lids_of(&source, &asked)?;
        let export_pids = requests.source_ranks();

        let plan = Self {
            covered: Covered::Target,
            source,
            target,
            num_same,
            permute_to_lids,
            permute_from_lids,
            remote_lids,
            remote_pids,
            export_lids,
            export_pids,
            distributor: requests.reverse(),
            reverse_distributor: OnceCell::with_value(requests),
        };
        plan.log_summary("import");
        plan.debug_assert_invariants();
        Ok(plan)
    }

    /// Discovery construction seen from the sending (source) side.
    pub(crate) fn export<C: Communicator>(
        source: Arc<IndexPartition>,
        target: Arc<IndexPartition>,
        comm: &C,
        config: &ExchangeConfig,
    ) -> Result<Self, RemapError> {
        let num_same = count_same(&source, &target);
        let mut permute_to_lids = Vec::new();
        let mut permute_from_lids = Vec::new();
        let mut export_lids = Vec::new();
        let mut export_gids = Vec::new();
        for lid in num_same..source.local_count() {
            let gid = source.gid_at(lid);
            match target.global_to_local(gid) {
                Some(dst) => {
                    permute_to_lids.push(dst);
                    permute_from_lids.push(lid);
                }
                None => {
                    export_lids.push(lid);
                    export_gids.push(gid);
                }
            }
        }

        let owners = target.owner_and_local_index_with(&export_gids, comm, config.directory_tags)?;
        let resolved = resolve_owners(&export_gids, &owners);
        agree_if(
            comm,
            config.collective_error_checks,
            resolved.as_ref().map(|_| ()).map_err(Clone::clone),
        )?;
        let pids = resolved?;

        let order: Vec<usize> = (0..pids.len()).sorted_by_key(|&k| pids[k]).collect();
        let export_pids = apply_order(&pids, &order);
        let export_lids = apply_order(&export_lids, &order);
        let export_gids = apply_order(&export_gids, &order);

        let distributor = Distributor::from_sends(&export_pids, comm, config.tags, false)?;
        let arriving = distributor.execute(&wire_ids(&export_gids), 1, comm, config.tags.data)?;
        let remote_lids = local_lids_of(&target, &arriving)?;
        let remote_pids = distributor.source_ranks();

        let plan = Self {
            covered: Covered::Source,
            source,
            target,
            num_same,
            permute_to_lids,
            permute_from_lids,
            remote_lids,
            remote_pids,
            export_lids,
            export_pids,
            distributor,
            reverse_distributor: OnceCell::new(),
        };
        plan.log_summary("export");
        plan.debug_assert_invariants();
        Ok(plan)
    }

    /// Import construction from correspondences the caller already knows.
    ///
    /// No discovery traffic: the only communication is the error agreement
    /// (when enabled). Remote entries are ordered by (owner rank, target local
    /// index) and exports grouped stably by destination rank, which is exactly
    /// what discovery produces.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn import_from_lists<C: Communicator>(
        source: Arc<IndexPartition>,
        target: Arc<IndexPartition>,
        remote_pids: &[usize],
        remote_gids: &[GlobalId],
        export_lids: &[LocalId],
        export_pids: &[usize],
        comm: &C,
        config: &ExchangeConfig,
    ) -> Result<Self, RemapError> {
        let built = Self::assemble_from_lists(
            &source,
            &target,
            remote_pids,
            remote_gids,
            export_lids,
            export_pids,
            comm,
        );
        agree_if(
            comm,
            config.collective_error_checks,
            built.as_ref().map(|_| ()).map_err(Clone::clone),
        )?;
        let (num_same, permutes, remotes, exports, distributor) = built?;
        let plan = Self {
            covered: Covered::Target,
            source,
            target,
            num_same,
            permute_to_lids: permutes.0,
            permute_from_lids: permutes.1,
            remote_lids: remotes.0,
            remote_pids: remotes.1,
            export_lids: exports.0,
            export_pids: exports.1,
            distributor,
            reverse_distributor: OnceCell::new(),
        };
        plan.log_summary("import (from lists)");
        plan.debug_assert_invariants();
        Ok(plan)
    }

    #[allow(clippy::type_complexity)]
    fn assemble_from_lists<C: Communicator>(
        source: &IndexPartition,
        target: &IndexPartition,
        remote_pids: &[usize],
        remote_gids: &[GlobalId],
        export_lids: &[LocalId],
        export_pids: &[usize],
        comm: &C,
    ) -> Result<
        (
            usize,
            (Vec<LocalId>, Vec<LocalId>),
            (Vec<LocalId>, Vec<usize>),
            (Vec<LocalId>, Vec<usize>),
            Distributor,
        ),
        RemapError,
    > {
        if remote_pids.len() != remote_gids.len() {
            return Err(RemapError::SizeMismatch {
                what: "remote rank list",
                expected: remote_gids.len(),
                got: remote_pids.len(),
            });
        }
        if export_pids.len() != export_lids.len() {
            return Err(RemapError::SizeMismatch {
                what: "export rank list",
                expected: export_lids.len(),
                got: export_pids.len(),
            });
        }
        if let Some(&lid) = export_lids.iter().find(|&&l| l >= source.local_count()) {
            return Err(RemapError::LocalIndexOutOfRange {
                lid,
                len: source.local_count(),
            });
        }

        let num_same = count_same(source, target);
        let mut permute_to = Vec::new();
        let mut permute_from = Vec::new();
        let mut remote_slots = 0usize;
        for lid in num_same..target.local_count() {
            match source.global_to_local(target.gid_at(lid)) {
                Some(src) => {
                    permute_to.push(lid);
                    permute_from.push(src);
                }
                None => remote_slots += 1,
            }
        }
        if remote_slots != remote_gids.len() {
            return Err(RemapError::SizeMismatch {
                what: "remote id list",
                expected: remote_slots,
                got: remote_gids.len(),
            });
        }

        let mut remotes = Vec::with_capacity(remote_gids.len());
        for (&gid, &pid) in remote_gids.iter().zip(remote_pids) {
            let lid = match target.global_to_local(gid) {
                Some(lid) if lid >= num_same && !source.contains(gid) => lid,
                _ => {
                    return Err(RemapError::InvalidArgument(format!(
                        "global id {gid} is not a remote entry of the target"
                    )));
                }
            };
            remotes.push((pid, lid));
        }
        remotes.sort_unstable();
        if remotes.windows(2).any(|w| w[0].1 == w[1].1) {
            return Err(RemapError::InvalidArgument("remote id listed twice".into()));
        }
        let (remote_pids, remote_lids): (Vec<usize>, Vec<LocalId>) = remotes.into_iter().unzip();

        let order: Vec<usize> = (0..export_pids.len()).sorted_by_key(|&k| export_pids[k]).collect();
        let export_pids = apply_order(export_pids, &order);
        let export_lids = apply_order(export_lids, &order);

        let distributor =
            Distributor::from_sends_and_recvs(&export_pids, &remote_pids, comm.rank(), comm.size())?;
        Ok((
            num_same,
            (permute_to, permute_from),
            (remote_lids, remote_pids),
            (export_lids, export_pids),
            distributor,
        ))
    }

    /// The same correspondence with source and target exchanged.
    pub(crate) fn reversed(&self) -> Self {
        let reverse = self.reverse_distributor().clone();
        let covered = match self.covered {
            Covered::Target => Covered::Source,
            Covered::Source => Covered::Target,
        };
        Self {
            covered,
            source: Arc::clone(&self.target),
            target: Arc::clone(&self.source),
            num_same: self.num_same,
            permute_to_lids: self.permute_from_lids.clone(),
            permute_from_lids: self.permute_to_lids.clone(),
            remote_lids: self.export_lids.clone(),
            remote_pids: self.export_pids.clone(),
            export_lids: self.remote_lids.clone(),
            export_pids: self.remote_pids.clone(),
            distributor: reverse,
            reverse_distributor: OnceCell::with_value(self.distributor.clone()),
        }
    }

    fn log_summary(&self, kind: &str) {
        log::debug!(
            "[plan] {kind} rank {}: same {}, permute {}, remote {}, export {}",
            self.target.rank(),
            self.num_same,
            self.permute_to_lids.len(),
            self.remote_lids.len(),
            self.export_lids.len()
        );
    }

    /// Lists for a transfer in `direction`.
    pub fn lists(&self, direction: Direction) -> TransferLists<'_> {
        match direction {
            Direction::Forward => TransferLists {
                from: &self.source,
                into: &self.target,
                num_same: self.num_same,
                permute_to: &self.permute_to_lids,
                permute_from: &self.permute_from_lids,
                send_lids: &self.export_lids,
                recv_lids: &self.remote_lids,
                distributor: &self.distributor,
            },
            Direction::Reverse => TransferLists {
                from: &self.target,
                into: &self.source,
                num_same: self.num_same,
                permute_to: &self.permute_from_lids,
                permute_from: &self.permute_to_lids,
                send_lids: &self.remote_lids,
                recv_lids: &self.export_lids,
                distributor: self.reverse_distributor(),
            },
        }
    }

    pub fn covered(&self) -> Covered {
        self.covered
    }
    pub fn source(&self) -> &Arc<IndexPartition> {
        &self.source
    }
    pub fn target(&self) -> &Arc<IndexPartition> {
        &self.target
    }
    pub fn num_same(&self) -> usize {
        self.num_same
    }
    pub fn permute_to_lids(&self) -> &[LocalId] {
        &self.permute_to_lids
    }
    pub fn permute_from_lids(&self) -> &[LocalId] {
        &self.permute_from_lids
    }
    pub fn remote_lids(&self) -> &[LocalId] {
        &self.remote_lids
    }
    pub fn remote_pids(&self) -> &[usize] {
        &self.remote_pids
    }
    pub fn export_lids(&self) -> &[LocalId] {
        &self.export_lids
    }
    pub fn export_pids(&self) -> &[usize] {
        &self.export_pids
    }
    pub fn distributor(&self) -> &Distributor {
        &self.distributor
    }
    /// Distributor for reverse-mode transfers, derived on first use.
    pub fn reverse_distributor(&self) -> &Distributor {
        self.reverse_distributor
            .get_or_init(|| self.distributor.reverse())
    }
}

impl DebugInvariants for TransferPlan {
    fn validate_invariants(&self) -> Result<(), RemapError> {
        if self.permute_to_lids.len() != self.permute_from_lids.len() {
            return Err(RemapError::SizeMismatch {
                what: "permute lists",
                expected: self.permute_to_lids.len(),
                got: self.permute_from_lids.len(),
            });
        }
        if self.remote_pids.len() != self.remote_lids.len()
            || self.export_pids.len() != self.export_lids.len()
        {
            return Err(RemapError::InvalidArgument(
                "rank lists disagree with local index lists".into(),
            ));
        }
        let sides = [
            ("export list vs distributor sends", self.distributor.total_send(), self.export_lids.len()),
            ("remote list vs distributor receives", self.distributor.total_recv(), self.remote_lids.len()),
        ];
        for (what, expected, got) in sides {
            if expected != got {
                return Err(RemapError::SizeMismatch { what, expected, got });
            }
        }
        let (what, expected, got) = match self.covered {
            Covered::Target => (
                "classified target entries",
                self.target.local_count(),
                self.num_same + self.permute_to_lids.len() + self.remote_lids.len(),
            ),
            Covered::Source => (
                "classified source entries",
                self.source.local_count(),
                self.num_same + self.permute_from_lids.len() + self.export_lids.len(),
            ),
        };
        if expected != got {
            return Err(RemapError::SizeMismatch { what, expected, got });
        }
        Ok(())
    }
}
