//! Error types for the config store boundary.

use thiserror::Error;

/// Result type alias for config store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur at the config store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sequential violation for {entity}: expected sequence {expected}, got {got}")]
    SequentialViolation {
        entity: String,
        expected: u64,
        got: u64,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("version {entity}:{sequence} is referenced by {count} deployment(s)")]
    VersionReferenced {
        entity: String,
        sequence: u64,
        count: usize,
    },

    #[error("version {entity}:{sequence} is not valid for activation ({state})")]
    NotActivatable {
        entity: String,
        sequence: u64,
        state: String,
    },

    #[error("storage error: {0}")]
    Storage(String),
}
