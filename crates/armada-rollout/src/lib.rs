//! armada-rollout — deployment orchestration across proxy fleets.
//!
//! Drives a configuration version across a selected set of physical
//! instances in ordered waves, observing ACK/NACK feedback from the ADS
//! layer and rolling back on failure thresholds.
//!
//! # Components
//!
//! - **`strategy`** — deployment strategies (all-at-once, rolling, canary)
//!   and the wave partition function
//! - **`plan`** — `DeploymentPlan` / `Wave` with closed status enums and
//!   explicit transitions
//! - **`orchestrator`** — the wave loop: push, bounded ACK wait,
//!   threshold/timeout abort, parallel non-waved rollback

pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod strategy;

pub use error::{RolloutError, RolloutResult};
pub use orchestrator::{Orchestrator, OrchestratorConfig, TargetSelector};
pub use plan::{
    AbortReason, DeploymentPlan, FailureReport, PlanStatus, RollbackOutcome, RollbackTarget, Wave,
    WaveStatus,
};
pub use strategy::{CanaryConfig, DeployStrategy, RollingConfig, partition};
