//! IndexPartition: which global ids each process holds, and at which local index.
//!
//! A partition is built collectively and immutable afterwards; plans and
//! containers share it through `Arc`. Every constructor gathers one
//! [`WireRankLayout`] per rank, so the global count, the per-rank counts, and
//! the "distributed contiguous" property are known everywhere without further
//! communication. Owner queries for arbitrary layouts go through a distributed
//! directory, built on first use.

mod directory;

use hashbrown::HashMap;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::algs::collective::{all_ranks, allgather_pod};
use crate::algs::communicator::{Communicator, ExchangeTags};
use crate::algs::wire::WireRankLayout;
use crate::debug_invariants::DebugInvariants;
use crate::remap_error::RemapError;
use crate::transfer::config::ExchangeConfig;
use directory::Directory;

pub type GlobalId = u64;
pub type LocalId = usize;

/// Where a global id lives: owning rank and the owner's local index.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteIndex {
    pub rank: usize,
    pub lid: LocalId,
}

#[derive(Clone, Debug)]
enum LocalIds {
    /// Local index `i` holds `first + i`.
    Range { first: GlobalId, len: usize },
    Listed {
        gids: Vec<GlobalId>,
        lookup: HashMap<GlobalId, LocalId>,
    },
}

/// Distribution of global ids over the ranks of a process group.
#[derive(Clone, Debug)]
pub struct IndexPartition {
    rank: usize,
    num_procs: usize,
    index_base: GlobalId,
    global_count: u64,
    local: LocalIds,
    rank_counts: Vec<usize>,
    /// First id of every rank, when ranks hold consecutive ranges in rank order.
    rank_starts: Option<Vec<GlobalId>>,
    span: Option<(GlobalId, GlobalId)>,
    directory: OnceCell<Directory>,
}

impl IndexPartition {
    /// Each rank holds `local_count` consecutive ids, ranks in ascending order.
    ///
    /// Collective. With `global_count` given, the local counts must sum to it.
    pub fn contiguous<C: Communicator>(
        global_count: Option<u64>,
        local_count: usize,
        index_base: GlobalId,
        comm: &C,
    ) -> Result<Self, RemapError> {
        let own = WireRankLayout::new(local_count, 0, 0, 0, WireRankLayout::LOCALLY_CONTIGUOUS);
        let mut layouts = gather_layouts(comm, own, None)?;
        let mut next = index_base;
        for layout in layouts.iter_mut() {
            let count = layout.count();
            let end = next.checked_add(count as u64).ok_or_else(|| {
                RemapError::InvalidArgument("global id range overflows u64".into())
            })?;
            let max = if count > 0 { end - 1 } else { next };
            *layout = WireRankLayout::new(count, next, next, max, WireRankLayout::LOCALLY_CONTIGUOUS);
            next = end;
        }
        let first = layouts[comm.rank()].first();
        Self::assemble(
            comm,
            index_base,
            global_count,
            LocalIds::Range {
                first,
                len: local_count,
            },
            &layouts,
        )
    }

    /// `global_count` ids split as evenly as possible, lower ranks taking the remainder.
    pub fn uniform<C: Communicator>(
        global_count: u64,
        index_base: GlobalId,
        comm: &C,
    ) -> Result<Self, RemapError> {
        let n = comm.size() as u64;
        let share = global_count / n + u64::from((comm.rank() as u64) < global_count % n);
        let local = usize::try_from(share).map_err(|_| {
            RemapError::InvalidArgument(format!("{share} ids do not fit in one process"))
        })?;
        Self::contiguous(Some(global_count), local, index_base, comm)
    }

    /// Each rank lists the ids it holds; list position is the local index.
    ///
    /// Collective. Ids must be `>= index_base` and unique within a rank; the
    /// same id may appear on several ranks (overlapping partition).
    pub fn from_global_ids<C: Communicator>(
        global_count: Option<u64>,
        gids: Vec<GlobalId>,
        index_base: GlobalId,
        comm: &C,
    ) -> Result<Self, RemapError> {
        let mut lookup = HashMap::with_capacity(gids.len());
        let mut problem = None;
        for (lid, &g) in gids.iter().enumerate() {
            if g < index_base {
                problem = Some(format!("global id {g} is below index base {index_base}"));
                break;
            }
            if lookup.insert(g, lid).is_some() {
                problem = Some(format!("global id {g} listed twice on rank {}", comm.rank()));
                break;
            }
        }
        if let Some(reason) = problem {
            let rejected = gather_layouts(comm, WireRankLayout::invalid(), Some(reason.clone()));
            return Err(rejected.err().unwrap_or(RemapError::InvalidArgument(reason)));
        }

        let ranged = gids.windows(2).all(|w| w[0].checked_add(1) == Some(w[1]));
        let (min, max) = match (gids.iter().min(), gids.iter().max()) {
            (Some(&lo), Some(&hi)) => (lo, hi),
            _ => (0, 0),
        };
        let first = gids.first().copied().unwrap_or(0);
        let flags = if ranged { WireRankLayout::LOCALLY_CONTIGUOUS } else { 0 };
        let own = WireRankLayout::new(gids.len(), first, min, max, flags);
        let layouts = gather_layouts(comm, own, None)?;

        let local = if ranged {
            LocalIds::Range {
                first,
                len: gids.len(),
            }
        } else {
            LocalIds::Listed { gids, lookup }
        };
        Self::assemble(comm, index_base, global_count, local, &layouts)
    }

    fn assemble<C: Communicator>(
        comm: &C,
        index_base: GlobalId,
        declared: Option<u64>,
        local: LocalIds,
        layouts: &[WireRankLayout],
    ) -> Result<Self, RemapError> {
        let rank_counts: Vec<usize> = layouts.iter().map(|l| l.count()).collect();
        let global_count = rank_counts.iter().map(|&c| c as u64).sum::<u64>();
        if let Some(declared) = declared {
            if declared != global_count {
                return Err(RemapError::InvalidArgument(format!(
                    "declared global count {declared} but ranks hold {global_count} ids"
                )));
            }
        }

        let mut next = index_base;
        let mut starts = Vec::with_capacity(layouts.len());
        let mut in_order = true;
        for l in layouts {
            starts.push(next);
            if l.count() > 0 && (!l.is_locally_contiguous() || l.first() != next) {
                in_order = false;
            }
            next = next.saturating_add(l.count() as u64);
        }

        let span = layouts
            .iter()
            .filter(|l| l.count() > 0)
            .fold(None, |acc: Option<(u64, u64)>, l| match acc {
                None => Some((l.min(), l.max())),
                Some((lo, hi)) => Some((lo.min(l.min()), hi.max(l.max()))),
            });

        let partition = Self {
            rank: comm.rank(),
            num_procs: comm.size(),
            index_base,
            global_count,
            local,
            rank_counts,
            rank_starts: in_order.then_some(starts),
            span,
            directory: OnceCell::new(),
        };
        partition.debug_assert_invariants();
        log::debug!(
            "[partition] rank {}: {} local of {} global ids, distributed contiguous = {}",
            partition.rank,
            partition.local_count(),
            partition.global_count,
            partition.is_distributed_contiguous()
        );
        Ok(partition)
    }

    pub fn rank(&self) -> usize {
        self.rank
    }
    pub fn num_procs(&self) -> usize {
        self.num_procs
    }
    pub fn index_base(&self) -> GlobalId {
        self.index_base
    }
    pub fn global_count(&self) -> u64 {
        self.global_count
    }
    pub fn local_count(&self) -> usize {
        match &self.local {
            LocalIds::Range { len, .. } => *len,
            LocalIds::Listed { gids, .. } => gids.len(),
        }
    }
    /// Local counts of every rank.
    pub fn rank_counts(&self) -> &[usize] {
        &self.rank_counts
    }
    pub fn min_global_id(&self) -> Option<GlobalId> {
        self.span.map(|(lo, _)| lo)
    }
    pub fn max_global_id(&self) -> Option<GlobalId> {
        self.span.map(|(_, hi)| hi)
    }

    /// This rank's ids form one consecutive range.
    pub fn is_contiguous(&self) -> bool {
        matches!(self.local, LocalIds::Range { .. }) || self.local_count() <= 1
    }

    /// Every rank holds a consecutive range and the ranges follow rank order
    /// starting at the index base.
    pub fn is_distributed_contiguous(&self) -> bool {
        self.rank_starts.is_some()
    }

    /// Global id at local index `lid`.
    pub fn local_to_global(&self, lid: LocalId) -> Result<GlobalId, RemapError> {
        let len = self.local_count();
        if lid >= len {
            return Err(RemapError::LocalIndexOutOfRange { lid, len });
        }
        Ok(self.gid_at(lid))
    }

    pub(crate) fn gid_at(&self, lid: LocalId) -> GlobalId {
        match &self.local {
            LocalIds::Range { first, .. } => first + lid as u64,
            LocalIds::Listed { gids, .. } => gids[lid],
        }
    }

    /// Local index of `gid`, if this rank holds it.
    pub fn global_to_local(&self, gid: GlobalId) -> Option<LocalId> {
        match &self.local {
            LocalIds::Range { first, len } => {
                (gid >= *first && gid - first < *len as u64).then(|| (gid - first) as usize)
            }
            LocalIds::Listed { lookup, .. } => lookup.get(&gid).copied(),
        }
    }

    pub fn contains(&self, gid: GlobalId) -> bool {
        self.global_to_local(gid).is_some()
    }

    /// This rank's ids in local order.
    pub fn global_ids(&self) -> impl DoubleEndedIterator<Item = GlobalId> + ExactSizeIterator + '_ {
        (0..self.local_count()).map(move |lid| self.gid_at(lid))
    }

    /// Same global count and the same ids on this rank, in the same order.
    /// Not collective.
    pub fn has_local_layout_of(&self, other: &IndexPartition) -> bool {
        std::ptr::eq(self, other)
            || (self.global_count == other.global_count
                && self.local_count() == other.local_count()
                && self.global_ids().eq(other.global_ids()))
    }

    /// Same global count and same per-rank counts.
    pub fn is_compatible(&self, other: &IndexPartition) -> bool {
        self.global_count == other.global_count && self.rank_counts == other.rank_counts
    }

    /// Identical id lists on every rank. Collective.
    pub fn is_same_as<C: Communicator>(&self, other: &IndexPartition, comm: &C) -> Result<bool, RemapError> {
        let here = self.is_compatible(other)
            && self.index_base == other.index_base
            && self.global_ids().eq(other.global_ids());
        all_ranks(comm, here)
    }

    /// Owner rank and owner local index of each id, `None` for ids no rank holds.
    ///
    /// Collective: every rank must call it, possibly with an empty list.
    pub fn owner_and_local_index<C: Communicator>(
        &self,
        gids: &[GlobalId],
        comm: &C,
    ) -> Result<Vec<Option<RemoteIndex>>, RemapError> {
        self.owner_and_local_index_with(gids, comm, ExchangeConfig::default().directory_tags)
    }

    pub fn owner_and_local_index_with<C: Communicator>(
        &self,
        gids: &[GlobalId],
        comm: &C,
        tags: ExchangeTags,
    ) -> Result<Vec<Option<RemoteIndex>>, RemapError> {
        if let Some(starts) = &self.rank_starts {
            return Ok(gids.iter().map(|&g| self.owner_in_ranges(starts, g)).collect());
        }
        let dir = self.directory.get_or_try_init(|| {
            let local_ids: Vec<GlobalId> = self.global_ids().collect();
            Directory::build(&local_ids, self.span, comm, tags)
        })?;
        dir.lookup(gids, comm, tags)
    }

    fn owner_in_ranges(&self, starts: &[GlobalId], gid: GlobalId) -> Option<RemoteIndex> {
        let rank = starts.partition_point(|&s| s <= gid).checked_sub(1)?;
        let offset = gid - starts[rank];
        (offset < self.rank_counts[rank] as u64).then(|| RemoteIndex {
            rank,
            lid: offset as usize,
        })
    }
}

/// Allgather the per-rank layouts; if any rank flagged its input invalid,
/// every rank fails with `InvalidArgument`.
fn gather_layouts<C: Communicator>(
    comm: &C,
    own: WireRankLayout,
    own_problem: Option<String>,
) -> Result<Vec<WireRankLayout>, RemapError> {
    let layouts = allgather_pod(comm, &own)?;
    match layouts.iter().position(|l| l.is_invalid()) {
        None => Ok(layouts),
        Some(bad) => Err(RemapError::InvalidArgument(match own_problem {
            Some(reason) => reason,
            None => format!("rank {bad} rejected its partition input"),
        })),
    }
}

impl DebugInvariants for IndexPartition {
    fn validate_invariants(&self) -> Result<(), RemapError> {
        if self.rank_counts.len() != self.num_procs {
            return Err(RemapError::SizeMismatch {
                what: "per-rank counts",
                expected: self.num_procs,
                got: self.rank_counts.len(),
            });
        }
        if self.rank_counts.get(self.rank) != Some(&self.local_count()) {
            return Err(RemapError::SizeMismatch {
                what: "local count",
                expected: self.rank_counts.get(self.rank).copied().unwrap_or(0),
                got: self.local_count(),
            });
        }
        if let LocalIds::Listed { gids, lookup } = &self.local {
            if gids.len() != lookup.len() {
                return Err(RemapError::InvalidArgument(
                    "id lookup disagrees with id list".into(),
                ));
            }
        }
        Ok(())
    }
}
