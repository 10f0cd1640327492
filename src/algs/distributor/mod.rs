//! Distributor: the per-peer message schedule of one transfer direction.
//!
//! A distributor knows which ranks this process sends to and how many items
//! each message carries (`procs_to`/`lengths_to`), and the mirror information
//! for receives (`procs_from`/`lengths_from`). Both sides are ordered by
//! ascending rank; a self message appears like any other entry and is copied
//! locally when executed.
//!
//! Items handed to [`Distributor::execute`] are in caller order. When the
//! destinations of that order were not already grouped by rank, `indices_to`
//! stores the stable grouping permutation, and the reverse distributor uses
//! the same permutation (as `indices_from`) to restore caller order on arrival.

pub mod data_exchange;
pub mod size_exchange;

use bytemuck::Pod;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::algs::collective::agree_if;
use crate::algs::communicator::{CommTag, Communicator, ExchangeTags};
use crate::algs::wire::cast_slice;
use crate::remap_error::RemapError;

pub use data_exchange::exchange_bytes;
pub use size_exchange::exchange_counts;

/// Message schedule for one direction of a transfer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distributor {
    my_rank: usize,
    procs_to: Vec<usize>,
    lengths_to: Vec<usize>,
    indices_to: Option<Vec<usize>>,
    procs_from: Vec<usize>,
    lengths_from: Vec<usize>,
    indices_from: Option<Vec<usize>>,
}

/// Group destinations by rank: `(procs, lengths, permutation if not already grouped)`.
fn group_by_rank(pids: &[usize]) -> (Vec<usize>, Vec<usize>, Option<Vec<usize>>) {
    let order = if pids.windows(2).all(|w| w[0] <= w[1]) {
        None
    } else {
        let mut idx: Vec<usize> = (0..pids.len()).collect();
        idx.sort_by_key(|&i| pids[i]);
        Some(idx)
    };
    let grouped: Cow<[usize]> = match &order {
        None => Cow::Borrowed(pids),
        Some(idx) => Cow::Owned(idx.iter().map(|&i| pids[i]).collect()),
    };
    let mut procs = Vec::new();
    let mut lengths = Vec::new();
    for (proc, run) in &grouped.iter().chunk_by(|p| **p) {
        procs.push(proc);
        lengths.push(run.count());
    }
    (procs, lengths, order)
}

fn check_ranks(pids: &[usize], num_procs: usize) -> Result<(), RemapError> {
    match pids.iter().find(|&&p| p >= num_procs) {
        Some(&bad) => Err(RemapError::InvalidArgument(format!(
            "rank {bad} outside process group of size {num_procs}"
        ))),
        None => Ok(()),
    }
}

/// Positions of items in grouped (wire) order.
fn wire_order(indices: &Option<Vec<usize>>, n: usize) -> Cow<'_, [usize]> {
    match indices {
        Some(order) => Cow::Borrowed(order),
        None => Cow::Owned((0..n).collect()),
    }
}

impl Distributor {
    /// Build from the destination rank of every outgoing item (any order).
    ///
    /// Collective: the receive side is discovered with an all-to-all count
    /// exchange on `tags.sizes`. With `collective_checks`, a bad rank on any
    /// process fails the call on all of them.
    pub fn from_sends<C: Communicator>(
        export_pids: &[usize],
        comm: &C,
        tags: ExchangeTags,
        collective_checks: bool,
    ) -> Result<Self, RemapError> {
        let n = comm.size();
        agree_if(comm, collective_checks, check_ranks(export_pids, n))?;

        let (procs_to, lengths_to, indices_to) = group_by_rank(export_pids);
        let mut send_counts = vec![0usize; n];
        for (&p, &len) in procs_to.iter().zip(&lengths_to) {
            send_counts[p] = len;
        }
        let recv_counts = exchange_counts(&send_counts, comm, tags.sizes)?;
        let (procs_from, lengths_from): (Vec<usize>, Vec<usize>) = recv_counts
            .iter()
            .enumerate()
            .filter(|(_, c)| **c > 0)
            .map(|(p, &c)| (p, c))
            .unzip();

        let plan = Self {
            my_rank: comm.rank(),
            procs_to,
            lengths_to,
            indices_to,
            procs_from,
            lengths_from,
            indices_from: None,
        };
        log::debug!(
            "[distributor] rank {}: {} sends ({} items), {} receives ({} items)",
            plan.my_rank,
            plan.num_sends(),
            plan.total_send(),
            plan.num_receives(),
            plan.total_recv()
        );
        Ok(plan)
    }

    /// Build from both sides at once; no communication.
    ///
    /// `remote_pids` must be sorted ascending: receives are laid out in rank order.
    pub fn from_sends_and_recvs(
        export_pids: &[usize],
        remote_pids: &[usize],
        my_rank: usize,
        num_procs: usize,
    ) -> Result<Self, RemapError> {
        check_ranks(export_pids, num_procs)?;
        check_ranks(remote_pids, num_procs)?;
        if !remote_pids.windows(2).all(|w| w[0] <= w[1]) {
            return Err(RemapError::InvalidArgument(
                "receive ranks must be sorted ascending".into(),
            ));
        }
        let (procs_to, lengths_to, indices_to) = group_by_rank(export_pids);
        let (procs_from, lengths_from, _) = group_by_rank(remote_pids);
        Ok(Self {
            my_rank,
            procs_to,
            lengths_to,
            indices_to,
            procs_from,
            lengths_from,
            indices_from: None,
        })
    }

    /// The schedule of the opposite direction: sends become receives.
    pub fn reverse(&self) -> Self {
        Self {
            my_rank: self.my_rank,
            procs_to: self.procs_from.clone(),
            lengths_to: self.lengths_from.clone(),
            indices_to: self.indices_from.clone(),
            procs_from: self.procs_to.clone(),
            lengths_from: self.lengths_to.clone(),
            indices_from: self.indices_to.clone(),
        }
    }

    pub fn procs_to(&self) -> &[usize] {
        &self.procs_to
    }
    pub fn lengths_to(&self) -> &[usize] {
        &self.lengths_to
    }
    pub fn procs_from(&self) -> &[usize] {
        &self.procs_from
    }
    pub fn lengths_from(&self) -> &[usize] {
        &self.lengths_from
    }
    pub fn num_sends(&self) -> usize {
        self.procs_to.len()
    }
    pub fn num_receives(&self) -> usize {
        self.procs_from.len()
    }
    pub fn total_send(&self) -> usize {
        self.lengths_to.iter().sum()
    }
    pub fn total_recv(&self) -> usize {
        self.lengths_from.iter().sum()
    }
    pub fn has_self_message(&self) -> bool {
        self.procs_to.contains(&self.my_rank)
    }

    /// Source rank of every received item, in arrival order.
    pub fn source_ranks(&self) -> Vec<usize> {
        let mut ranks = vec![0; self.total_recv()];
        let order = wire_order(&self.indices_from, ranks.len());
        let grouped = self
            .procs_from
            .iter()
            .zip(&self.lengths_from)
            .flat_map(|(&p, &len)| std::iter::repeat_n(p, len));
        for (&slot, p) in order.iter().zip(grouped) {
            ranks[slot] = p;
        }
        ranks
    }

    /// Send `packets_per_item` packets for every outgoing item and return what
    /// arrives, in receive order.
    pub fn execute<T: Pod, C: Communicator>(
        &self,
        exports: &[T],
        packets_per_item: usize,
        comm: &C,
        tag: CommTag,
    ) -> Result<Vec<T>, RemapError> {
        let k = packets_per_item;
        if exports.len() != self.total_send() * k {
            return Err(RemapError::SizeMismatch {
                what: "distributor send buffer",
                expected: self.total_send() * k,
                got: exports.len(),
            });
        }
        let grouped: Cow<[T]> = match &self.indices_to {
            None => Cow::Borrowed(exports),
            Some(order) => Cow::Owned(
                order
                    .iter()
                    .flat_map(|&i| exports[i * k..(i + 1) * k].iter().copied())
                    .collect(),
            ),
        };
        let width = std::mem::size_of::<T>() * k;
        let bytes = cast_slice(&grouped[..]);

        let mut sends = Vec::with_capacity(self.procs_to.len());
        let mut offset = 0;
        for (&p, &len) in self.procs_to.iter().zip(&self.lengths_to) {
            sends.push((p, &bytes[offset..offset + len * width]));
            offset += len * width;
        }
        let recvs: Vec<(usize, usize)> = self
            .procs_from
            .iter()
            .zip(&self.lengths_from)
            .map(|(&p, &len)| (p, len * width))
            .collect();

        let chunks = exchange_bytes(&sends, &recvs, comm, tag)?;
        let mut arrived = vec![T::zeroed(); self.total_recv() * k];
        let dst: &mut [u8] = bytemuck::cast_slice_mut(&mut arrived);
        let mut offset = 0;
        for chunk in chunks {
            dst[offset..offset + chunk.len()].copy_from_slice(&chunk);
            offset += chunk.len();
        }

        Ok(match &self.indices_from {
            None => arrived,
            Some(order) => {
                let mut out = vec![T::zeroed(); arrived.len()];
                for (pos, &slot) in order.iter().enumerate() {
                    out[slot * k..(slot + 1) * k].copy_from_slice(&arrived[pos * k..(pos + 1) * k]);
                }
                out
            }
        })
    }

    /// Like [`execute`](Self::execute) with a per-item packet count.
    ///
    /// `import_packets` must already hold the counts the peers will send
    /// (obtained by executing the counts themselves first).
    pub fn execute_variable<T: Pod, C: Communicator>(
        &self,
        exports: &[T],
        export_packets: &[usize],
        import_packets: &[usize],
        comm: &C,
        tag: CommTag,
    ) -> Result<Vec<T>, RemapError> {
        if export_packets.len() != self.total_send() {
            return Err(RemapError::SizeMismatch {
                what: "export packet counts",
                expected: self.total_send(),
                got: export_packets.len(),
            });
        }
        if import_packets.len() != self.total_recv() {
            return Err(RemapError::SizeMismatch {
                what: "import packet counts",
                expected: self.total_recv(),
                got: import_packets.len(),
            });
        }
        let total_out: usize = export_packets.iter().sum();
        if exports.len() != total_out {
            return Err(RemapError::SizeMismatch {
                what: "distributor send buffer",
                expected: total_out,
                got: exports.len(),
            });
        }
        let export_offsets = offsets(export_packets);
        let import_offsets = offsets(import_packets);

        let send_order = wire_order(&self.indices_to, export_packets.len());
        let mut grouped = Vec::with_capacity(total_out);
        for &i in send_order.iter() {
            grouped.extend_from_slice(&exports[export_offsets[i]..export_offsets[i] + export_packets[i]]);
        }
        let width = std::mem::size_of::<T>();
        let bytes = cast_slice(&grouped);

        let mut sends = Vec::with_capacity(self.procs_to.len());
        let (mut item, mut offset) = (0, 0);
        for (&p, &len) in self.procs_to.iter().zip(&self.lengths_to) {
            let packets: usize = send_order[item..item + len].iter().map(|&i| export_packets[i]).sum();
            sends.push((p, &bytes[offset..offset + packets * width]));
            item += len;
            offset += packets * width;
        }

        let recv_order = wire_order(&self.indices_from, import_packets.len());
        let mut recvs = Vec::with_capacity(self.procs_from.len());
        let mut item = 0;
        for (&p, &len) in self.procs_from.iter().zip(&self.lengths_from) {
            let packets: usize = recv_order[item..item + len].iter().map(|&i| import_packets[i]).sum();
            recvs.push((p, packets * width));
            item += len;
        }

        let chunks = exchange_bytes(&sends, &recvs, comm, tag)?;
        let total_in: usize = import_packets.iter().sum();
        let mut arrived = vec![T::zeroed(); total_in];
        let dst: &mut [u8] = bytemuck::cast_slice_mut(&mut arrived);
        let mut offset = 0;
        for chunk in chunks {
            dst[offset..offset + chunk.len()].copy_from_slice(&chunk);
            offset += chunk.len();
        }

        if self.indices_from.is_none() {
            return Ok(arrived);
        }
        let mut out = vec![T::zeroed(); total_in];
        let mut pos = 0;
        for &slot in recv_order.iter() {
            let n = import_packets[slot];
            let at = import_offsets[slot];
            out[at..at + n].copy_from_slice(&arrived[pos..pos + n]);
            pos += n;
        }
        Ok(out)
    }
}

fn offsets(counts: &[usize]) -> Vec<usize> {
    counts
        .iter()
        .scan(0usize, |acc, &c| {
            let start = *acc;
            *acc += c;
            Some(start)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, RayonComm};

    fn tags() -> ExchangeTags {
        ExchangeTags::from_base(CommTag::new(0x300))
    }

    #[test]
    fn grouping_is_stable() {
        let (procs, lengths, order) = group_by_rank(&[2, 0, 2, 1, 0]);
        assert_eq!(procs, vec![0, 1, 2]);
        assert_eq!(lengths, vec![2, 1, 2]);
        assert_eq!(order, Some(vec![1, 4, 3, 0, 2]));
        assert_eq!(group_by_rank(&[0, 0, 1]).2, None);
    }

    #[test]
    fn serial_self_message() {
        let d = Distributor::from_sends(&[0, 0, 0], &NoComm, tags(), true).unwrap();
        assert!(d.has_self_message());
        assert_eq!(d.total_recv(), 3);
        let got = d.execute(&[5u32, 6, 7], 1, &NoComm, CommTag::new(9)).unwrap();
        assert_eq!(got, vec![5, 6, 7]);
    }

    #[test]
    fn rank_out_of_range_is_rejected() {
        let err = Distributor::from_sends(&[1], &NoComm, tags(), true).unwrap_err();
        assert!(matches!(err, RemapError::InvalidArgument(_)));
    }

    #[test]
    fn receives_must_be_sorted() {
        let err = Distributor::from_sends_and_recvs(&[], &[1, 0], 0, 2).unwrap_err();
        assert!(matches!(err, RemapError::InvalidArgument(_)));
    }

    #[test]
    fn reverse_twice_is_identity() {
        let d = Distributor::from_sends_and_recvs(&[1, 0, 1], &[0, 1, 1], 0, 2).unwrap();
        assert_eq!(d.reverse().reverse(), d);
        assert_eq!(d.reverse().total_send(), d.total_recv());
    }

    #[test]
    fn unsorted_sends_round_trip_through_reverse() {
        // every rank sends item i to rank (i + r) % 3 and expects it back in place
        let world = RayonComm::world(3);
        let results: Vec<Vec<u64>> = std::thread::scope(|s| {
            let hs: Vec<_> = world
                .iter()
                .map(|comm| {
                    s.spawn(move || {
                        let r = comm.rank();
                        let pids: Vec<usize> = (0..5).map(|i| (i + r) % 3).collect();
                        let items: Vec<u64> = (0..5).map(|i| (r * 100 + i) as u64).collect();
                        let fwd = Distributor::from_sends(&pids, comm, tags(), true).unwrap();
                        let there = fwd.execute(&items, 1, comm, CommTag::new(0x310)).unwrap();
                        let echoed: Vec<u64> = there.iter().map(|v| v + 1).collect();
                        fwd.reverse().execute(&echoed, 1, comm, CommTag::new(0x311)).unwrap()
                    })
                })
                .collect();
            hs.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for (r, back) in results.iter().enumerate() {
            let want: Vec<u64> = (0..5).map(|i| (r * 100 + i) as u64 + 1).collect();
            assert_eq!(back, &want);
        }
    }

    #[test]
    fn variable_packets_keep_item_boundaries() {
        let world = RayonComm::world(2);
        let results: Vec<Vec<u32>> = std::thread::scope(|s| {
            let hs: Vec<_> = world
                .iter()
                .map(|comm| {
                    s.spawn(move || {
                        let other = 1 - comm.rank();
                        // item 0 goes to the peer, item 1 stays home
                        let pids = [other, comm.rank()];
                        let counts = [2usize, 1];
                        let payload = [10u32, 11, 12];
                        let d = Distributor::from_sends(&pids, comm, tags(), false).unwrap();
                        let wire: Vec<u64> = counts.iter().map(|&c| c as u64).collect();
                        let incoming: Vec<usize> = d
                            .execute(&wire, 1, comm, CommTag::new(0x320))
                            .unwrap()
                            .into_iter()
                            .map(|c| c as usize)
                            .collect();
                        d.execute_variable(&payload, &counts, &incoming, comm, CommTag::new(0x321))
                            .unwrap()
                    })
                })
                .collect();
            hs.into_iter().map(|h| h.join().unwrap()).collect()
        });
        // rank 0 receives its own item first, then rank 1's
        assert_eq!(results[0], vec![12, 10, 11]);
        assert_eq!(results[1], vec![10, 11, 12]);
    }
}
