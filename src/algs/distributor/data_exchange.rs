//! Stage 2: move the payload bytes, one message per peer.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::remap_error::RemapError;

/// Post every receive, then every send, then wait on all of them.
///
/// `sends` pairs a destination with its bytes; `recvs` pairs a source with the
/// exact byte length expected from it. The self message (if any) is copied
/// without touching the transport. Results follow the order of `recvs`.
pub fn exchange_bytes<C: Communicator>(
    sends: &[(usize, &[u8])],
    recvs: &[(usize, usize)],
    comm: &C,
    tag: CommTag,
) -> Result<Vec<Vec<u8>>, RemapError> {
    let me = comm.rank();

    let mut pending = Vec::with_capacity(recvs.len());
    for &(peer, len) in recvs {
        if peer == me {
            pending.push(None);
            continue;
        }
        let mut scratch = vec![0u8; len];
        pending.push(Some(comm.irecv(peer, tag.as_u16(), &mut scratch)));
    }

    let mut loopback: Option<&[u8]> = None;
    let mut pending_sends = Vec::with_capacity(sends.len());
    for &(peer, bytes) in sends {
        if peer == me {
            loopback = Some(bytes);
            continue;
        }
        log::trace!(
            "[exchange] rank {me} -> {peer}: {} bytes (tag {:#x})",
            bytes.len(),
            tag.as_u16()
        );
        pending_sends.push(comm.isend(peer, tag.as_u16(), bytes));
    }

    let mut received = Vec::with_capacity(recvs.len());
    let mut maybe_err = None;
    for (&(peer, len), handle) in recvs.iter().zip(pending) {
        let got = match handle {
            None => loopback.map(<[u8]>::to_vec),
            Some(h) => h.wait(),
        };
        match got {
            Some(data) if data.len() == len => received.push(data),
            Some(data) => {
                maybe_err.get_or_insert(RemapError::BufferSizeMismatch {
                    neighbor: peer,
                    expected: len,
                    got: data.len(),
                });
                received.push(Vec::new());
            }
            None => {
                maybe_err.get_or_insert(RemapError::CommunicationFailure {
                    neighbor: peer,
                    reason: format!("no data received from rank {peer}"),
                });
                received.push(Vec::new());
            }
        }
    }

    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(received),
    }
}
