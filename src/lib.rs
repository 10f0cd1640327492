#![cfg_attr(docsrs, feature(doc_cfg))]
//! # index-remap
//!
//! index-remap moves distributed arrays between layouts. An
//! [`IndexPartition`](partition::IndexPartition) says which global ids each
//! process holds; an [`Import`](transfer::Import) or [`Export`](transfer::Export)
//! precomputes, once, how the entries of one partition map onto another; and
//! any container implementing [`Transferable`](transfer::Transferable) can then
//! be moved along that pattern as often as needed, merging what it receives
//! under a [`CombineMode`](transfer::CombineMode).
//!
//! ## Features
//! - Partitions from contiguous ranges or explicit id lists, with batched owner lookup
//! - Import/Export patterns with local fast paths (same, permute) and reverse-mode reuse
//! - A four-phase transfer engine: copy and permute, pack, exchange, unpack and combine
//! - Fixed-size and variable-size packets (`MultiVector`, `RaggedArray`)
//! - Pluggable communication backends: serial (`NoComm`), threads (`RayonComm`), MPI
//!
//! ## Execution model
//!
//! Everything that communicates is collective: every process of the group
//! must make the same calls in the same order. Errors raised on one process
//! are agreed on before payload moves, so the whole group fails together
//! (see [`ExchangeConfig::collective_error_checks`](transfer::ExchangeConfig)).
//!
//! ```toml
//! [dependencies]
//! index-remap = "0.3"
//! # Optional features:
//! # features = ["mpi-support", "rayon"]
//! ```

pub mod algs;
pub mod data;
pub mod debug_invariants;
pub mod partition;
pub mod remap_error;
pub mod transfer;

pub use debug_invariants::DebugInvariants;
pub use remap_error::RemapError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{CommTag, Communicator, ExchangeTags, NoComm, RayonComm};
    pub use crate::data::{MultiVector, RaggedArray};
    pub use crate::partition::{GlobalId, IndexPartition, LocalId, RemoteIndex};
    pub use crate::remap_error::RemapError;
    pub use crate::transfer::{
        CombineMode, DistObjectExt, ExchangeConfig, Export, Import, RedistributionPattern, Scalar,
        Transferable,
    };
}
