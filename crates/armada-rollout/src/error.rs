//! Rollout error types.

use thiserror::Error;

use crate::plan::PlanStatus;

/// Result type alias for rollout operations.
pub type RolloutResult<T> = Result<T, RolloutError>;

/// Errors that can occur during deployment orchestration.
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("illegal plan transition: {from:?} -> {to:?}")]
    IllegalTransition { from: PlanStatus, to: PlanStatus },

    #[error("version {entity}:{sequence} has not passed validation")]
    VersionNotValid { entity: String, sequence: u64 },

    #[error("no target instances selected")]
    NoTargets,

    #[error("config store error: {0}")]
    Store(#[from] armada_types::StoreError),
}
