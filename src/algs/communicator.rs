//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! All handles are **waitable** but non-blocking: the exchange routines call
//! `.wait()` on every handle they post, error paths included, before they trust
//! or release a buffer.
//!
//! Messages between one (source, destination, tag) triple are delivered in the
//! order they were sent. The collective routines of this crate rely on that to
//! reuse the same tags across consecutive operations.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::remap_error::RemapError;

/// A message tag. Each exchange owns a tag pair so concurrent epochs never collide.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Tag `by` slots after this one (wrapping).
    pub const fn offset(self, by: u16) -> Self {
        Self(self.0.wrapping_add(by))
    }
}

/// Tags for a two-phase "sizes then data" exchange.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeTags {
    pub sizes: CommTag,
    pub data: CommTag,
}

impl ExchangeTags {
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            sizes: base,
            data: base.offset(1),
        }
    }
}

/// Reserved for the point-to-point fallback of [`Communicator::allgather`].
pub const ALLGATHER_TAG: CommTag = CommTag::new(0xFFF0);

/// Non-blocking communication interface plus the two collectives the engine needs.
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;

    /// Post a receive; `buf.len()` is the expected message size and the payload
    /// is handed back by [`Wait::wait`].
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Rank of this process within the group.
    fn rank(&self) -> usize;

    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// True for the serial stand-in.
    fn is_no_comm(&self) -> bool {
        false
    }

    /// Gather `send` from every rank into `recv` (rank-major, equal chunk sizes).
    fn allgather(&self, send: &[u8], recv: &mut [u8]) -> Result<(), RemapError> {
        let n = self.size();
        let me = self.rank();
        let chunk = send.len();
        if recv.len() != chunk * n {
            return Err(RemapError::SizeMismatch {
                what: "allgather receive buffer",
                expected: chunk * n,
                got: recv.len(),
            });
        }
        recv[me * chunk..(me + 1) * chunk].copy_from_slice(send);

        let tag = ALLGATHER_TAG.as_u16();
        let mut pending = Vec::with_capacity(n.saturating_sub(1));
        for peer in (0..n).filter(|&p| p != me) {
            let mut scratch = vec![0u8; chunk];
            pending.push((peer, self.irecv(peer, tag, &mut scratch)));
        }
        let sends: Vec<_> = (0..n)
            .filter(|&p| p != me)
            .map(|peer| self.isend(peer, tag, send))
            .collect();

        let mut maybe_err = None;
        for (peer, h) in pending {
            match h.wait() {
                Some(data) if data.len() == chunk => {
                    recv[peer * chunk..(peer + 1) * chunk].copy_from_slice(&data);
                }
                Some(data) => {
                    maybe_err.get_or_insert(RemapError::BufferSizeMismatch {
                        neighbor: peer,
                        expected: chunk,
                        got: data.len(),
                    });
                }
                None => {
                    maybe_err.get_or_insert(RemapError::CommunicationFailure {
                        neighbor: peer,
                        reason: "allgather receive returned no data".into(),
                    });
                }
            }
        }
        for s in sends {
            let _ = s.wait();
        }
        maybe_err.map_or(Ok(()), Err)
    }

    /// Block until every rank has entered the barrier.
    fn barrier(&self) -> Result<(), RemapError> {
        let mut sink = vec![0u8; self.size()];
        self.allgather(&[1], &mut sink)
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Single-process group for serial runs: rank 0 of 1, no peers to talk to.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn is_no_comm(&self) -> bool {
        true
    }
}

// --- RayonComm: intra-process, one thread per rank ---
type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Debug, Default)]
struct Mailbox {
    queues: DashMap<Key, VecDeque<Bytes>>,
}

impl Mailbox {
    fn push(&self, key: Key, msg: Bytes) {
        self.queues.entry(key).or_default().push_back(msg);
    }

    fn pop(&self, key: &Key) -> Option<Bytes> {
        self.queues.get_mut(key).and_then(|mut q| q.pop_front())
    }
}

/// Receive handle of [`RayonComm`]; `wait` spins (yielding) until the message lands.
pub struct LocalHandle {
    key: Key,
    mailbox: Arc<Mailbox>,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        loop {
            if let Some(bytes) = self.mailbox.pop(&self.key) {
                return Some(bytes.to_vec());
            }
            std::thread::yield_now();
        }
    }
}

/// In-process process group: every rank is a thread sharing one mailbox.
///
/// Each call to [`RayonComm::world`] creates an isolated group, so independent
/// tests never see each other's messages.
#[derive(Clone, Debug)]
pub struct RayonComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
}

impl RayonComm {
    /// One communicator per rank of a fresh group of `size` ranks.
    pub fn world(size: usize) -> Vec<Self> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        self.mailbox
            .push((self.rank, peer, tag), Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> Self::RecvHandle {
        LocalHandle {
            key: (peer, self.rank, tag),
            mailbox: Arc::clone(&self.mailbox),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use crate::remap_error::RemapError;
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;
    use std::sync::Arc;

    /// Bytes attached for buffered sends, so every `isend` completes locally.
    pub const DEFAULT_BSEND_BYTES: usize = 64 << 20;

    struct MpiShared {
        world: SimpleCommunicator,
        _universe: Universe,
    }

    // SAFETY: MPI runs at the default (funneled) threading level; a group must
    // be driven from the thread that initialized it. The bounds only let the
    // handle live inside `Send + Sync` plan objects.
    unsafe impl Send for MpiShared {}
    unsafe impl Sync for MpiShared {}

    #[derive(Clone)]
    pub struct MpiComm {
        shared: Arc<MpiShared>,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        pub fn new() -> Result<Self, RemapError> {
            Self::with_buffer_size(DEFAULT_BSEND_BYTES)
        }

        pub fn with_buffer_size(bytes: usize) -> Result<Self, RemapError> {
            let mut universe =
                mpi::initialize().ok_or_else(|| RemapError::CommunicationFailure {
                    neighbor: 0,
                    reason: "MPI is unavailable or already initialized".into(),
                })?;
            universe.set_buffer_size(bytes);
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                shared: Arc::new(MpiShared {
                    world,
                    _universe: universe,
                }),
                rank,
                size,
            })
        }
    }

    pub struct MpiRecv {
        shared: Arc<MpiShared>,
        peer: i32,
        tag: i32,
    }

    impl Wait for MpiRecv {
        fn wait(self) -> Option<Vec<u8>> {
            let (data, _status) = self
                .shared
                .world
                .process_at_rank(self.peer)
                .receive_vec_with_tag::<u8>(self.tag);
            Some(data)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = ();
        type RecvHandle = MpiRecv;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
            self.shared
                .world
                .process_at_rank(peer as i32)
                .buffered_send_with_tag(buf, tag as i32);
        }

        fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> MpiRecv {
            MpiRecv {
                shared: Arc::clone(&self.shared),
                peer: peer as i32,
                tag: tag as i32,
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn allgather(&self, send: &[u8], recv: &mut [u8]) -> Result<(), RemapError> {
            if recv.len() != send.len() * self.size {
                return Err(RemapError::SizeMismatch {
                    what: "allgather receive buffer",
                    expected: send.len() * self.size,
                    got: recv.len(),
                });
            }
            self.shared.world.all_gather_into(send, recv);
            Ok(())
        }

        fn barrier(&self) -> Result<(), RemapError> {
            self.shared.world.barrier();
            Ok(())
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
