//! Error types for the tree store.

use crate::types::Path;
use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A pending operation is incompatible with the ancestor state it is
    /// layered on (e.g. a write under a deleted ancestor). Reported at
    /// commit validation; the transaction must be retried from a fresh base.
    #[error("structural conflict at {path}: {reason}")]
    StructuralConflict { path: Path, reason: String },

    /// Another transaction committed an overlapping change after this
    /// transaction's base snapshot was taken.
    #[error("conflicting modification at {path}")]
    ConflictingModification { path: Path },

    /// A commit phase was invoked out of order. Programming error.
    #[error("protocol violation: expected cohort state {expected}, was {actual}")]
    ProtocolViolation {
        expected: &'static str,
        actual: &'static str,
    },

    /// A foreign candidate could not be replayed.
    #[error("candidate apply failure: {0}")]
    ApplyFailure(String),

    /// Mutation attempted on a sealed modification.
    #[error("modification is already sealed")]
    AlreadySealed,

    /// Commit requested for a modification that was never sealed.
    #[error("modification is not sealed")]
    NotSealed,

    /// The store suffered a failure while applying a committed candidate and
    /// can no longer accept commits. Requires external recovery.
    #[error("store has failed and requires recovery")]
    StoreFailed,
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
