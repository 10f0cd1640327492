//! Stage 1 of plan discovery: every rank tells every other rank how many items
//! it is about to send it.
//!
//! Every receive and send handle is drained before returning, even when a
//! message comes back malformed.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{WireCount, cast_slice, decode_vec};
use crate::remap_error::RemapError;

/// All-to-all count exchange. `send_counts[p]` is what this rank sends to `p`;
/// the result holds what each rank sends here. The self entry is copied locally.
pub fn exchange_counts<C: Communicator>(
    send_counts: &[usize],
    comm: &C,
    tag: CommTag,
) -> Result<Vec<usize>, RemapError> {
    let n = comm.size();
    let me = comm.rank();
    if send_counts.len() != n {
        return Err(RemapError::SizeMismatch {
            what: "per-rank send counts",
            expected: n,
            got: send_counts.len(),
        });
    }
    let width = std::mem::size_of::<WireCount>();

    // 1) post all receives
    let mut pending_recvs = Vec::with_capacity(n.saturating_sub(1));
    for peer in (0..n).filter(|&p| p != me) {
        let mut cnt = [0u8; 8];
        let h = comm.irecv(peer, tag.as_u16(), &mut cnt);
        pending_recvs.push((peer, h));
    }

    // 2) post all sends, keeping the encoded counts alive until completion
    let wire: Vec<WireCount> = send_counts.iter().map(|&c| WireCount::new(c)).collect();
    let mut pending_sends = Vec::with_capacity(n.saturating_sub(1));
    for peer in (0..n).filter(|&p| p != me) {
        pending_sends.push(comm.isend(
            peer,
            tag.as_u16(),
            cast_slice(std::slice::from_ref(&wire[peer])),
        ));
    }

    // 3) wait for all receives without returning early
    let mut counts_in = vec![0usize; n];
    counts_in[me] = send_counts[me];
    let mut maybe_err = None;
    for (peer, h) in pending_recvs {
        match h.wait() {
            Some(data) if data.len() == width => {
                if let Some(cnt) = decode_vec::<WireCount>(&data) {
                    counts_in[peer] = cnt[0].get();
                }
            }
            Some(data) if maybe_err.is_none() => {
                maybe_err = Some(RemapError::BufferSizeMismatch {
                    neighbor: peer,
                    expected: width,
                    got: data.len(),
                });
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(RemapError::CommunicationFailure {
                    neighbor: peer,
                    reason: format!("failed to receive count from rank {peer}"),
                });
            }
            _ => {} // already failing; just drain
        }
    }

    // 4) always drain the sends
    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(counts_in),
    }
}
