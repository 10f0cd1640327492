//! Reference containers that take part in transfers.

pub mod multi_vector;
pub mod ragged;

pub use multi_vector::MultiVector;
pub use ragged::RaggedArray;
