//! Invariant checking for the forest and its shared entities.

use crate::mesh_error::{InvariantKind, MeshError};

/// Structures whose consistency can be checked after mutation.
pub trait DebugInvariants {
    /// Panic on the first violation in debug builds or when invariant checking is enabled.
    fn debug_assert_invariants(&self);
    /// Validate all invariants and return the first violation found.
    fn validate_invariants(&self) -> Result<(), MeshError>;
}

/// Runs a fallible check and panics with its error when invariant checking is enabled.
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "strict-invariants", feature = "check-invariants"))]
        if let Err(e) = $expr {
            panic!(concat!("[invariants] ", $($ctx)*, ": {}"), e);
        }
    };
}

/// `Ok(())` when `cond` holds, otherwise an [`InvariantViolated`](MeshError::InvariantViolated)
/// built lazily from `context`.
#[inline]
pub(crate) fn ensure<F>(cond: bool, kind: InvariantKind, context: F) -> Result<(), MeshError>
where
    F: FnOnce() -> String,
{
    if cond {
        Ok(())
    } else {
        Err(MeshError::invariant(kind, context()))
    }
}
