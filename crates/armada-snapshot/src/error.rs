//! Error types for snapshot generation.

use thiserror::Error;

/// Result type alias for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Errors that can occur while generating a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("template {0:?} is not resolvable")]
    TemplateMissing(String),

    #[error("template chain contains a cycle through {0:?}")]
    TemplateCycle(String),

    #[error("endpoint resolution failed for service {service:?}: {reason}")]
    Discovery { service: String, reason: String },

    #[error("service {0:?} is unknown to discovery")]
    UnknownService(String),
}
