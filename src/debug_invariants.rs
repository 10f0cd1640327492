//! Structural self-checks for partitions and transfer plans.

use crate::remap_error::RemapError;

/// Validation hook for immutable, collectively-built structures.
pub trait DebugInvariants {
    /// Validate invariants and return the first violation found.
    fn validate_invariants(&self) -> Result<(), RemapError>;

    /// Panic on a violated invariant when checks are compiled in.
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "invariant violated");
    }
}

/// Run a fallible check and panic on error when invariant checking is enabled
/// (debug builds, or the `check-invariants`/`strict-invariants` features).
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "strict-invariants", feature = "check-invariants"))]
        if let Err(e) = $expr {
            panic!(concat!("[invariants] ", $($ctx)*, ": {}"), e);
        }
    };
}
