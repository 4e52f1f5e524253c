//! Deployment plans and waves.
//!
//! Statuses are closed sum types with explicit transition functions, so
//! illegal transitions (`Successful → InProgress` and the like) are
//! rejected rather than silently recorded.

use serde::{Deserialize, Serialize};

use armada_types::{EntityId, InstanceId, epoch_secs};

use crate::error::{RolloutError, RolloutResult};
use crate::strategy::{DeployStrategy, partition};

/// Overall status of a deployment plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    InProgress,
    Successful,
    Failed,
    RolledBack,
}

impl PlanStatus {
    /// Legal transitions of the plan state machine.
    fn can_transition(self, to: PlanStatus) -> bool {
        matches!(
            (self, to),
            (PlanStatus::Pending, PlanStatus::InProgress)
                | (PlanStatus::InProgress, PlanStatus::Successful)
                | (PlanStatus::InProgress, PlanStatus::Failed)
                | (PlanStatus::Failed, PlanStatus::RolledBack)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PlanStatus::Successful | PlanStatus::Failed | PlanStatus::RolledBack
        )
    }
}

/// Status of a single wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

/// One batch of target instances updated together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wave {
    pub index: u32,
    pub targets: Vec<InstanceId>,
    pub status: WaveStatus,
    pub acked: Vec<InstanceId>,
    pub nacked: Vec<InstanceId>,
}

impl Wave {
    fn new(index: u32, targets: Vec<InstanceId>) -> Self {
        Self {
            index,
            targets,
            status: WaveStatus::Pending,
            acked: Vec::new(),
            nacked: Vec::new(),
        }
    }

    /// NACK ratio over the wave's full target count.
    pub fn nack_ratio(&self) -> f64 {
        if self.targets.is_empty() {
            return 0.0;
        }
        self.nacked.len() as f64 / self.targets.len() as f64
    }
}

/// Version a failed plan falls back to, captured at plan creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackTarget {
    pub sequence: u64,
    pub content_hash: String,
}

/// Why a plan aborted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AbortReason {
    /// The wave's NACK ratio exceeded the configured threshold.
    NackThreshold { ratio: f64, threshold: f64 },
    /// The wave timed out before every instance responded.
    Timeout,
    /// An operator cancelled the plan.
    Cancelled,
    /// A snapshot push could not be generated.
    PushFailed { detail: String },
    /// All waves ran but some instances never acknowledged the version.
    Incomplete { missing: usize },
}

/// How the rollback attempt ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RollbackOutcome {
    Completed,
    Failed { detail: String },
    NotAttempted,
}

/// Failure detail for a failed or rolled-back plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Index of the wave the abort happened in.
    pub wave: u32,
    pub reason: AbortReason,
    pub rollback: RollbackOutcome,
}

/// An ordered-wave deployment of one configuration version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub id: String,
    pub entity_id: EntityId,
    pub strategy: DeployStrategy,
    /// Version being deployed.
    pub target_sequence: u64,
    pub target_hash: String,
    /// Version to fall back to, captured when the plan was created.
    pub rollback: Option<RollbackTarget>,
    pub waves: Vec<Wave>,
    pub status: PlanStatus,
    pub failure: Option<FailureReport>,
    pub created_at: u64,
}

impl DeploymentPlan {
    pub fn new(
        id: &str,
        entity_id: &str,
        strategy: DeployStrategy,
        target_sequence: u64,
        target_hash: &str,
        rollback: Option<RollbackTarget>,
        targets: &[InstanceId],
    ) -> Self {
        let waves = partition(&strategy, targets)
            .into_iter()
            .enumerate()
            .map(|(i, targets)| Wave::new(i as u32, targets))
            .collect();

        Self {
            id: id.to_string(),
            entity_id: entity_id.to_string(),
            strategy,
            target_sequence,
            target_hash: target_hash.to_string(),
            rollback,
            waves,
            status: PlanStatus::Pending,
            failure: None,
            created_at: epoch_secs(),
        }
    }

    /// Move the plan to a new status, rejecting illegal transitions.
    pub fn transition(&mut self, to: PlanStatus) -> RolloutResult<()> {
        if !self.status.can_transition(to) {
            return Err(RolloutError::IllegalTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Every instance targeted by this plan, in wave order.
    pub fn all_targets(&self) -> Vec<InstanceId> {
        self.waves.iter().flat_map(|w| w.targets.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::RollingConfig;

    fn plan(targets: usize) -> DeploymentPlan {
        let targets: Vec<InstanceId> = (1..=targets).map(|i| format!("i{i}")).collect();
        DeploymentPlan::new(
            "plan-1",
            "e1",
            DeployStrategy::Rolling(RollingConfig {
                wave_size: 1,
                pause_secs: 0,
            }),
            2,
            "hash-v2",
            Some(RollbackTarget {
                sequence: 1,
                content_hash: "hash-v1".to_string(),
            }),
            &targets,
        )
    }

    #[test]
    fn new_plan_partitions_targets() {
        let plan = plan(3);
        assert_eq!(plan.status, PlanStatus::Pending);
        assert_eq!(plan.waves.len(), 3);
        assert_eq!(plan.waves[0].index, 0);
        assert_eq!(plan.all_targets().len(), 3);
    }

    #[test]
    fn legal_transition_chain() {
        let mut plan = plan(1);
        plan.transition(PlanStatus::InProgress).unwrap();
        plan.transition(PlanStatus::Failed).unwrap();
        plan.transition(PlanStatus::RolledBack).unwrap();
        assert!(plan.status.is_terminal());
    }

    #[test]
    fn successful_cannot_restart() {
        let mut plan = plan(1);
        plan.transition(PlanStatus::InProgress).unwrap();
        plan.transition(PlanStatus::Successful).unwrap();

        let err = plan.transition(PlanStatus::InProgress).unwrap_err();
        assert!(matches!(err, RolloutError::IllegalTransition { .. }));
    }

    #[test]
    fn pending_cannot_jump_to_successful() {
        let mut plan = plan(1);
        assert!(plan.transition(PlanStatus::Successful).is_err());
    }

    #[test]
    fn successful_cannot_roll_back() {
        let mut plan = plan(1);
        plan.transition(PlanStatus::InProgress).unwrap();
        plan.transition(PlanStatus::Successful).unwrap();
        assert!(plan.transition(PlanStatus::RolledBack).is_err());
    }

    #[test]
    fn nack_ratio() {
        let mut wave = Wave::new(0, vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(wave.nack_ratio(), 0.0);
        wave.nacked.push("a".into());
        assert!((wave.nack_ratio() - 1.0 / 3.0).abs() < 1e-9);
    }
}
