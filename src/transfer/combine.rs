//! Combine modes: how an incoming value merges with the one already stored.

use num_traits::Signed;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::remap_error::RemapError;

/// Merge rule applied to received packets.
///
/// Only the received (remote) part of a transfer is combined. Entries copied
/// locally (same and permuted ids) always overwrite.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombineMode {
    /// Overwrite with the incoming value.
    Replace,
    /// Sum into the stored value.
    Add,
    /// Keep whichever of the two has the larger magnitude (stored value on ties).
    AbsMax,
    /// Append to a growable entry; only meaningful for variable-size containers.
    Insert,
}

/// Scalar values a [`MultiVector`](crate::data::MultiVector) can carry.
pub trait Scalar: bytemuck::Pod + Signed + PartialOrd + Send + Sync + Debug + 'static {
    /// Absolute value used by [`CombineMode::AbsMax`].
    fn magnitude(self) -> Self;
}

impl<T> Scalar for T
where
    T: bytemuck::Pod + Signed + PartialOrd + Send + Sync + Debug + 'static,
{
    #[inline]
    fn magnitude(self) -> Self {
        self.abs()
    }
}

/// One merge rule, as a zero-sized type usable in monomorphized inner loops.
pub trait Combine<V> {
    fn fuse(local: &mut V, incoming: V);
}

#[derive(Copy, Clone, Debug)]
pub struct ReplaceCombine;

impl<V> Combine<V> for ReplaceCombine {
    #[inline]
    fn fuse(local: &mut V, incoming: V) {
        *local = incoming;
    }
}

#[derive(Copy, Clone, Debug)]
pub struct AddCombine;

impl<V: Scalar> Combine<V> for AddCombine {
    #[inline]
    fn fuse(local: &mut V, incoming: V) {
        *local = *local + incoming;
    }
}

#[derive(Copy, Clone, Debug)]
pub struct AbsMaxCombine;

impl<V: Scalar> Combine<V> for AbsMaxCombine {
    #[inline]
    fn fuse(local: &mut V, incoming: V) {
        if incoming.magnitude() > local.magnitude() {
            *local = incoming;
        }
    }
}

impl CombineMode {
    /// Element-wise merge function for reducing modes.
    ///
    /// `Insert` has no element-wise meaning and is rejected.
    pub fn fuse_fn<V: Scalar>(self) -> Result<fn(&mut V, V), RemapError> {
        let fuse: fn(&mut V, V) = match self {
            CombineMode::Replace => <ReplaceCombine as Combine<V>>::fuse,
            CombineMode::Add => <AddCombine as Combine<V>>::fuse,
            CombineMode::AbsMax => <AbsMaxCombine as Combine<V>>::fuse,
            CombineMode::Insert => return Err(RemapError::UnsupportedCombineMode(self)),
        };
        Ok(fuse)
    }
}
