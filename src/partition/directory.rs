//! Distributed owner directory for partitions that are not rank-ordered ranges.
//!
//! The span `[global_min, global_max]` is cut into equal blocks, one per rank.
//! Each process registers its ids with the rank holding their block; lookups
//! are routed the same way and answered with `(owner rank, owner local index)`.
//! When an id is held by several ranks the lowest rank is the owner.

use hashbrown::HashMap;
use hashbrown::hash_map::Entry;

use crate::algs::communicator::{Communicator, ExchangeTags};
use crate::algs::distributor::Distributor;
use crate::algs::wire::{WireDirEntry, WireGid, WireOwner};
use crate::partition::{GlobalId, RemoteIndex};
use crate::remap_error::RemapError;

#[derive(Clone, Debug)]
pub(crate) struct Directory {
    span_min: GlobalId,
    block: u64,
    num_procs: usize,
    entries: HashMap<GlobalId, RemoteIndex>,
}

impl Directory {
    fn block_of(span_min: GlobalId, block: u64, num_procs: usize, gid: GlobalId) -> usize {
        (((gid - span_min) / block) as usize).min(num_procs - 1)
    }

    fn rank_of(&self, gid: GlobalId) -> Option<usize> {
        (gid >= self.span_min).then(|| Self::block_of(self.span_min, self.block, self.num_procs, gid))
    }

    /// Collective. `local_ids` are this rank's ids in local order.
    pub(crate) fn build<C: Communicator>(
        local_ids: &[GlobalId],
        span: Option<(GlobalId, GlobalId)>,
        comm: &C,
        tags: ExchangeTags,
    ) -> Result<Self, RemapError> {
        let num_procs = comm.size();
        let (span_min, span_max) = span.unwrap_or((0, 0));
        let width = (span_max - span_min).saturating_add(1);
        let block = width.div_ceil(num_procs as u64).max(1);

        let pids: Vec<usize> = local_ids
            .iter()
            .map(|&g| Self::block_of(span_min, block, num_procs, g))
            .collect();
        let records: Vec<WireDirEntry> = local_ids
            .iter()
            .enumerate()
            .map(|(lid, &g)| WireDirEntry::new(g, lid))
            .collect();

        let registration = Distributor::from_sends(&pids, comm, tags, false)?;
        let received = registration.execute(&records, 1, comm, tags.data)?;

        let mut entries = HashMap::with_capacity(received.len());
        let mut duplicates = 0usize;
        // arrivals are ordered by source rank, so the first holder seen is the lowest
        for (rec, rank) in received.iter().zip(registration.source_ranks()) {
            match entries.entry(rec.gid()) {
                Entry::Vacant(slot) => {
                    slot.insert(RemoteIndex { rank, lid: rec.lid() });
                }
                Entry::Occupied(_) => duplicates += 1,
            }
        }
        if duplicates > 0 {
            log::debug!(
                "[directory] rank {}: {} ids held by more than one rank; lowest rank owns",
                comm.rank(),
                duplicates
            );
        }
        Ok(Self {
            span_min,
            block,
            num_procs,
            entries,
        })
    }

    /// Collective. Answers come back in query order; unknown ids map to `None`.
    pub(crate) fn lookup<C: Communicator>(
        &self,
        gids: &[GlobalId],
        comm: &C,
        tags: ExchangeTags,
    ) -> Result<Vec<Option<RemoteIndex>>, RemapError> {
        let mut asked = Vec::with_capacity(gids.len());
        let mut pids = Vec::with_capacity(gids.len());
        let mut queries = Vec::with_capacity(gids.len());
        for (k, &g) in gids.iter().enumerate() {
            if let Some(p) = self.rank_of(g) {
                asked.push(k);
                pids.push(p);
                queries.push(WireGid::of(g));
            }
        }

        let route = Distributor::from_sends(&pids, comm, tags, false)?;
        let incoming = route.execute(&queries, 1, comm, tags.data)?;
        let answers: Vec<WireOwner> = incoming
            .iter()
            .map(|q| match self.entries.get(&q.get()) {
                Some(owner) => WireOwner::found(owner.rank, owner.lid),
                None => WireOwner::not_found(),
            })
            .collect();
        let replies = route.reverse().execute(&answers, 1, comm, tags.data)?;

        let mut out = vec![None; gids.len()];
        for (&k, reply) in asked.iter().zip(&replies) {
            out[k] = reply.get().map(|(rank, lid)| RemoteIndex { rank, lid });
        }
        Ok(out)
    }
}
