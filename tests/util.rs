#![allow(dead_code)]
use std::sync::Arc;

use index_remap::algs::communicator::{Communicator, RayonComm};
use index_remap::partition::{GlobalId, IndexPartition};

/// Run `f` once per rank of a fresh in-process group, each rank on its own thread.
/// Results come back in rank order.
pub fn run_ranks<R, F>(n: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(&RayonComm) -> R + Sync,
{
    let world = RayonComm::world(n);
    std::thread::scope(|s| {
        let handles: Vec<_> = world
            .iter()
            .map(|comm| {
                let f = &f;
                s.spawn(move || f(comm))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank panicked"))
            .collect()
    })
}

pub fn uniform(global: u64, comm: &RayonComm) -> Arc<IndexPartition> {
    Arc::new(IndexPartition::uniform(global, 0, comm).unwrap())
}

pub fn listed(gids: Vec<GlobalId>, comm: &RayonComm) -> Arc<IndexPartition> {
    Arc::new(IndexPartition::from_global_ids(None, gids, 0, comm).unwrap())
}

/// Ids `[0, n)` dealt round-robin: rank r holds r, r + p, r + 2p, ...
pub fn round_robin(n: u64, comm: &RayonComm) -> Arc<IndexPartition> {
    let p = comm.size() as u64;
    let r = comm.rank() as u64;
    listed((0..n).filter(|g| g % p == r).collect(), comm)
}

/// Rank r holds {r - 1, r, r + 1} clipped to the group, in that order.
pub fn neighbors(comm: &RayonComm) -> Arc<IndexPartition> {
    let r = comm.rank() as u64;
    let last = comm.size() as u64 - 1;
    let mut gids = Vec::new();
    if r > 0 {
        gids.push(r - 1);
    }
    gids.push(r);
    if r < last {
        gids.push(r + 1);
    }
    listed(gids, comm)
}
