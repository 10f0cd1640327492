//! RemapError: unified error type for index-remap public APIs.
//!
//! None of these conditions are recovered locally. Collective operations agree
//! on failure before moving payload, so every process of the group returns an
//! error from the same call (see [`crate::algs::collective::agree`]).

use thiserror::Error;

use crate::transfer::combine::CombineMode;

/// Unified error type for partition, plan, and transfer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemapError {
    /// Malformed partition or plan construction input.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// A local ordinal outside `[0, local_count)` was used.
    #[error("Local index {lid} out of range (local count {len})")]
    LocalIndexOutOfRange { lid: usize, len: usize },
    /// The target references global ids absent from the whole source partition.
    #[error("Global id {gid} has no owner ({count} unmapped id(s) in total)")]
    UnmappedIdentifier { gid: u64, count: usize },
    /// A container or buffer disagrees with the counts a pattern expects.
    #[error("Size mismatch for {what}: expected {expected}, got {got}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    /// Operation needs partitions with the same global size and distribution.
    #[error("Partitions are not compatible (global counts {left} vs {right})")]
    IncompatiblePartitions { left: u64, right: u64 },
    /// An object's local ids differ from the layout the pattern was built for.
    #[error("The {what} object is not laid out on the pattern's {what} partition")]
    LayoutMismatch { what: &'static str },
    /// The container cannot merge incoming values with this combine mode.
    #[error("Combine mode {0:?} is not supported by this container")]
    UnsupportedCombineMode(CombineMode),
    /// A constant-packet object packed a different number of packets.
    #[error("Variable-size packets not supported: expected {expected} packets, packed {got}")]
    VariablePacketsUnsupported { expected: usize, got: usize },
    /// Transport-level failure while talking to `neighbor`.
    #[error("Communication failure with rank {neighbor}: {reason}")]
    CommunicationFailure { neighbor: usize, reason: String },
    /// A message from `neighbor` had an unexpected byte length.
    #[error("Buffer size mismatch from rank {neighbor}: expected {expected} bytes, got {got}")]
    BufferSizeMismatch {
        neighbor: usize,
        expected: usize,
        got: usize,
    },
    /// Another process of the group raised an error in the same collective call.
    #[error("Collective aborted: rank {rank} reported an error")]
    PeerFailure { rank: usize },
}
