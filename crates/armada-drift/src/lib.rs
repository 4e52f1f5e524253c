//! armada-drift — drift detection between desired and observed state.
//!
//! Compares a logical entity's desired version hash against the
//! last-acknowledged hash of each physical instance backing it. This is a
//! pure read-side computation: it flags discrepancies and never mutates
//! instance state — remediation is a separate operator decision.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use armada_types::{DesiredPointer, EntityId, InstanceId, InstanceStatus, ProxyInstance};

/// Drift state of one instance relative to the desired version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DriftState {
    /// The instance's last-acknowledged hash equals the desired hash.
    InSync,
    /// Hashes differ while the instance is reachable.
    DriftDetected {
        desired_hash: String,
        observed_hash: String,
    },
    /// The instance has never acknowledged any version, or has not been
    /// heard from within the staleness window.
    Unknown { reason: UnknownReason },
}

/// Why an instance's drift state cannot be determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownReason {
    NeverAcknowledged,
    NotHeardFrom,
}

/// Drift state of one backing instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftRecord {
    pub instance_id: InstanceId,
    pub state: DriftState,
}

/// Drift report for a logical entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftReport {
    pub entity_id: EntityId,
    pub desired_sequence: u64,
    pub records: Vec<DriftRecord>,
}

impl DriftReport {
    /// True when every backing instance is in sync.
    pub fn is_clean(&self) -> bool {
        self.records
            .iter()
            .all(|r| r.state == DriftState::InSync)
    }
}

/// Computes drift reports. Holds only tunables; state lives elsewhere.
#[derive(Debug, Clone)]
pub struct DriftDetector {
    /// Instances silent for longer than this are reported unknown.
    staleness_window: Duration,
}

impl Default for DriftDetector {
    fn default() -> Self {
        Self {
            staleness_window: Duration::from_secs(300),
        }
    }
}

impl DriftDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_staleness_window(mut self, window: Duration) -> Self {
        self.staleness_window = window;
        self
    }

    /// Compare the desired pointer against each backing instance.
    pub fn detect(
        &self,
        desired: &DesiredPointer,
        instances: &[ProxyInstance],
        now: u64,
    ) -> DriftReport {
        let window = self.staleness_window.as_secs();

        let records = instances
            .iter()
            .map(|instance| {
                let state = self.instance_state(desired, instance, now, window);
                DriftRecord {
                    instance_id: instance.id.clone(),
                    state,
                }
            })
            .collect::<Vec<_>>();

        let drifted = records
            .iter()
            .filter(|r| matches!(r.state, DriftState::DriftDetected { .. }))
            .count();
        if drifted > 0 {
            debug!(
                entity = %desired.entity_id,
                drifted,
                total = records.len(),
                "drift detected"
            );
        }

        DriftReport {
            entity_id: desired.entity_id.clone(),
            desired_sequence: desired.sequence,
            records,
        }
    }

    fn instance_state(
        &self,
        desired: &DesiredPointer,
        instance: &ProxyInstance,
        now: u64,
        window: u64,
    ) -> DriftState {
        if instance.status != InstanceStatus::Connected || instance.is_stale(now, window) {
            return DriftState::Unknown {
                reason: UnknownReason::NotHeardFrom,
            };
        }

        match &instance.last_acked_hash {
            None => DriftState::Unknown {
                reason: UnknownReason::NeverAcknowledged,
            },
            Some(observed) if *observed == desired.content_hash => DriftState::InSync,
            Some(observed) => DriftState::DriftDetected {
                desired_hash: desired.content_hash.clone(),
                observed_hash: observed.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armada_types::Locality;

    fn desired() -> DesiredPointer {
        DesiredPointer {
            entity_id: "e1".to_string(),
            sequence: 2,
            content_hash: "hash-v2".to_string(),
        }
    }

    fn instance(id: &str, acked: Option<&str>, last_seen: u64) -> ProxyInstance {
        ProxyInstance {
            id: id.to_string(),
            entity_id: "e1".to_string(),
            node_id: "n1".to_string(),
            locality: Locality::default(),
            status: InstanceStatus::Connected,
            last_acked_hash: acked.map(String::from),
            last_seen,
        }
    }

    #[test]
    fn in_sync_when_hashes_match() {
        let detector = DriftDetector::new();
        let report = detector.detect(&desired(), &[instance("i1", Some("hash-v2"), 1000)], 1010);

        assert_eq!(report.records[0].state, DriftState::InSync);
        assert!(report.is_clean());
    }

    #[test]
    fn drift_when_hashes_differ() {
        let detector = DriftDetector::new();
        let report = detector.detect(&desired(), &[instance("i1", Some("hash-v1"), 1000)], 1010);

        assert_eq!(
            report.records[0].state,
            DriftState::DriftDetected {
                desired_hash: "hash-v2".to_string(),
                observed_hash: "hash-v1".to_string(),
            }
        );
        assert!(!report.is_clean());
    }

    #[test]
    fn unknown_when_never_acked() {
        let detector = DriftDetector::new();
        let report = detector.detect(&desired(), &[instance("i1", None, 1000)], 1010);

        assert_eq!(
            report.records[0].state,
            DriftState::Unknown {
                reason: UnknownReason::NeverAcknowledged
            }
        );
    }

    #[test]
    fn unknown_when_outside_staleness_window() {
        let detector = DriftDetector::new().with_staleness_window(Duration::from_secs(60));
        // Acked the right hash, but silent for 100s.
        let report = detector.detect(&desired(), &[instance("i1", Some("hash-v2"), 1000)], 1100);

        assert_eq!(
            report.records[0].state,
            DriftState::Unknown {
                reason: UnknownReason::NotHeardFrom
            }
        );
    }

    #[test]
    fn unknown_when_disconnected() {
        let detector = DriftDetector::new();
        let mut inst = instance("i1", Some("hash-v2"), 1000);
        inst.status = InstanceStatus::Stale;

        let report = detector.detect(&desired(), &[inst], 1010);
        assert_eq!(
            report.records[0].state,
            DriftState::Unknown {
                reason: UnknownReason::NotHeardFrom
            }
        );
    }

    #[test]
    fn mixed_fleet_reports_per_instance() {
        let detector = DriftDetector::new();
        let report = detector.detect(
            &desired(),
            &[
                instance("i1", Some("hash-v2"), 1000),
                instance("i2", Some("hash-v1"), 1000),
                instance("i3", None, 1000),
            ],
            1010,
        );

        assert_eq!(report.records.len(), 3);
        assert_eq!(report.records[0].state, DriftState::InSync);
        assert!(matches!(
            report.records[1].state,
            DriftState::DriftDetected { .. }
        ));
        assert!(matches!(report.records[2].state, DriftState::Unknown { .. }));
        assert_eq!(report.desired_sequence, 2);
    }
}
