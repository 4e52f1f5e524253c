//! Stream registry — the instance table and ACK/NACK fan-out.
//!
//! Maps physical instance ids to their observed state. No global lock
//! over streams: each stream task only touches its own entry, and
//! readers (drift queries, rollout waits) take cheap snapshots of the
//! table. ACK/NACK outcomes are published on a broadcast channel for the
//! deployment orchestrator.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use armada_types::{
    EntityId, InstanceId, InstanceStatus, Locality, NodeId, ProxyInstance, epoch_secs,
};

/// Registry tunables.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Disconnected instances older than this are marked terminated.
    pub terminate_after: Duration,
    /// Capacity of the ACK event channel.
    pub ack_channel_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            terminate_after: Duration::from_secs(300),
            ack_channel_capacity: 256,
        }
    }
}

/// Outcome of a pushed snapshot on one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    Acked,
    Nacked { detail: String },
}

/// Instance-level acknowledgement event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckEvent {
    pub instance_id: InstanceId,
    pub entity_id: EntityId,
    /// Content hash of the configuration version the snapshot came from.
    pub source_hash: String,
    pub outcome: AckOutcome,
}

/// Tracks connected proxy instances and their observed versions.
pub struct StreamRegistry {
    instances: RwLock<HashMap<InstanceId, ProxyInstance>>,
    acks: broadcast::Sender<AckEvent>,
    config: RegistryConfig,
}

impl StreamRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        let (acks, _) = broadcast::channel(config.ack_channel_capacity);
        Self {
            instances: RwLock::new(HashMap::new()),
            acks,
            config,
        }
    }

    /// Register an instance when its stream presents identity.
    ///
    /// Reconnects within the grace period revive the existing record,
    /// keeping its observed state.
    pub fn register(
        &self,
        instance_id: &str,
        entity_id: &str,
        node_id: &NodeId,
        locality: Locality,
    ) -> ProxyInstance {
        let mut instances = self.instances.write().expect("instance table lock");
        let now = epoch_secs();

        let instance = instances
            .entry(instance_id.to_string())
            .and_modify(|existing| {
                existing.status = InstanceStatus::Connected;
                existing.last_seen = now;
            })
            .or_insert_with(|| ProxyInstance {
                id: instance_id.to_string(),
                entity_id: entity_id.to_string(),
                node_id: node_id.clone(),
                locality,
                status: InstanceStatus::Connected,
                last_acked_hash: None,
                last_seen: now,
            });

        info!(instance = %instance_id, entity = %entity_id, "instance registered");
        instance.clone()
    }

    /// Record stream activity.
    pub fn touch(&self, instance_id: &str) {
        let mut instances = self.instances.write().expect("instance table lock");
        if let Some(instance) = instances.get_mut(instance_id) {
            instance.last_seen = epoch_secs();
        }
    }

    /// Record a complete ACK for an instance and publish the event.
    pub fn record_ack(&self, instance_id: &str, source_hash: &str) {
        let entity_id = {
            let mut instances = self.instances.write().expect("instance table lock");
            match instances.get_mut(instance_id) {
                Some(instance) => {
                    instance.last_acked_hash = Some(source_hash.to_string());
                    instance.last_seen = epoch_secs();
                    instance.entity_id.clone()
                }
                None => {
                    warn!(instance = %instance_id, "ack from unknown instance");
                    return;
                }
            }
        };

        debug!(instance = %instance_id, hash = %source_hash, "instance acked");
        let _ = self.acks.send(AckEvent {
            instance_id: instance_id.to_string(),
            entity_id,
            source_hash: source_hash.to_string(),
            outcome: AckOutcome::Acked,
        });
    }

    /// Record a NACK for an instance and publish the event.
    ///
    /// The instance's last-acked hash is left untouched — a rejection
    /// tells us what the proxy refused, not what it runs.
    pub fn record_nack(&self, instance_id: &str, source_hash: &str, detail: &str) {
        let entity_id = {
            let mut instances = self.instances.write().expect("instance table lock");
            match instances.get_mut(instance_id) {
                Some(instance) => {
                    instance.last_seen = epoch_secs();
                    instance.entity_id.clone()
                }
                None => {
                    warn!(instance = %instance_id, "nack from unknown instance");
                    return;
                }
            }
        };

        warn!(instance = %instance_id, hash = %source_hash, detail, "instance nacked");
        let _ = self.acks.send(AckEvent {
            instance_id: instance_id.to_string(),
            entity_id,
            source_hash: source_hash.to_string(),
            outcome: AckOutcome::Nacked {
                detail: detail.to_string(),
            },
        });
    }

    /// Subscribe to instance-level ACK/NACK events.
    pub fn subscribe_acks(&self) -> broadcast::Receiver<AckEvent> {
        self.acks.subscribe()
    }

    /// Mark an instance's stream as gone; termination happens after the
    /// grace period via [`reap_terminated`].
    ///
    /// [`reap_terminated`]: StreamRegistry::reap_terminated
    pub fn mark_disconnected(&self, instance_id: &str) {
        let mut instances = self.instances.write().expect("instance table lock");
        if let Some(instance) = instances.get_mut(instance_id) {
            instance.status = InstanceStatus::Stale;
            info!(instance = %instance_id, "instance disconnected");
        }
    }

    /// Mark instances terminated whose streams have been gone past the
    /// grace period. Returns the affected ids.
    pub fn reap_terminated(&self) -> Vec<InstanceId> {
        let now = epoch_secs();
        let grace = self.config.terminate_after.as_secs();
        let mut instances = self.instances.write().expect("instance table lock");
        let mut reaped = Vec::new();

        for (id, instance) in instances.iter_mut() {
            if instance.status == InstanceStatus::Stale && instance.is_stale(now, grace) {
                instance.status = InstanceStatus::Terminated;
                warn!(instance = %id, "instance terminated");
                reaped.push(id.clone());
            }
        }
        reaped
    }

    /// Remove terminated instances from the table entirely.
    pub fn remove_terminated(&self) -> Vec<InstanceId> {
        let mut instances = self.instances.write().expect("instance table lock");
        let gone: Vec<InstanceId> = instances
            .iter()
            .filter(|(_, i)| i.status == InstanceStatus::Terminated)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &gone {
            instances.remove(id);
        }
        gone
    }

    pub fn get(&self, instance_id: &str) -> Option<ProxyInstance> {
        let instances = self.instances.read().expect("instance table lock");
        instances.get(instance_id).cloned()
    }

    /// All known instances.
    pub fn instances(&self) -> Vec<ProxyInstance> {
        let instances = self.instances.read().expect("instance table lock");
        let mut all: Vec<ProxyInstance> = instances.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Non-terminated instances backing a logical entity.
    pub fn instances_for_entity(&self, entity_id: &str) -> Vec<ProxyInstance> {
        let instances = self.instances.read().expect("instance table lock");
        let mut backing: Vec<ProxyInstance> = instances
            .values()
            .filter(|i| i.entity_id == entity_id && i.status != InstanceStatus::Terminated)
            .cloned()
            .collect();
        backing.sort_by(|a, b| a.id.cmp(&b.id));
        backing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StreamRegistry {
        StreamRegistry::new(RegistryConfig::default())
    }

    fn register(reg: &StreamRegistry, id: &str, entity: &str) -> ProxyInstance {
        reg.register(id, entity, &"node-1".to_string(), Locality::default())
    }

    #[test]
    fn register_creates_instance() {
        let reg = registry();
        let instance = register(&reg, "i1", "e1");
        assert_eq!(instance.status, InstanceStatus::Connected);
        assert!(instance.last_acked_hash.is_none());
        assert_eq!(reg.instances().len(), 1);
    }

    #[test]
    fn reconnect_revives_observed_state() {
        let reg = registry();
        register(&reg, "i1", "e1");
        reg.record_ack("i1", "hash-1");
        reg.mark_disconnected("i1");

        let revived = register(&reg, "i1", "e1");
        assert_eq!(revived.status, InstanceStatus::Connected);
        assert_eq!(revived.last_acked_hash.as_deref(), Some("hash-1"));
    }

    #[test]
    fn ack_updates_hash_and_publishes() {
        let reg = registry();
        register(&reg, "i1", "e1");
        let mut events = reg.subscribe_acks();

        reg.record_ack("i1", "hash-2");

        let instance = reg.get("i1").unwrap();
        assert_eq!(instance.last_acked_hash.as_deref(), Some("hash-2"));

        let event = events.try_recv().unwrap();
        assert_eq!(event.instance_id, "i1");
        assert_eq!(event.outcome, AckOutcome::Acked);
    }

    #[test]
    fn nack_leaves_acked_hash_untouched() {
        let reg = registry();
        register(&reg, "i1", "e1");
        reg.record_ack("i1", "hash-1");
        let mut events = reg.subscribe_acks();

        reg.record_nack("i1", "hash-2", "invalid listener");

        let instance = reg.get("i1").unwrap();
        assert_eq!(instance.last_acked_hash.as_deref(), Some("hash-1"));

        let event = events.try_recv().unwrap();
        assert!(matches!(event.outcome, AckOutcome::Nacked { .. }));
        assert_eq!(event.source_hash, "hash-2");
    }

    #[test]
    fn ack_from_unknown_instance_is_dropped() {
        let reg = registry();
        let mut events = reg.subscribe_acks();
        reg.record_ack("ghost", "hash");
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn disconnected_instance_reaped_after_grace() {
        let reg = StreamRegistry::new(RegistryConfig {
            terminate_after: Duration::from_secs(0),
            ..Default::default()
        });
        register(&reg, "i1", "e1");
        reg.mark_disconnected("i1");

        // Force the last_seen into the past.
        {
            let mut instances = reg.instances.write().unwrap();
            instances.get_mut("i1").unwrap().last_seen = 1000;
        }

        let reaped = reg.reap_terminated();
        assert_eq!(reaped, vec!["i1".to_string()]);
        assert_eq!(reg.get("i1").unwrap().status, InstanceStatus::Terminated);

        let removed = reg.remove_terminated();
        assert_eq!(removed, vec!["i1".to_string()]);
        assert!(reg.get("i1").is_none());
    }

    #[test]
    fn connected_instance_not_reaped() {
        let reg = StreamRegistry::new(RegistryConfig {
            terminate_after: Duration::from_secs(0),
            ..Default::default()
        });
        register(&reg, "i1", "e1");
        assert!(reg.reap_terminated().is_empty());
    }

    #[test]
    fn instances_for_entity_filters_and_sorts() {
        let reg = registry();
        register(&reg, "i2", "e1");
        register(&reg, "i1", "e1");
        register(&reg, "other", "e2");

        let backing = reg.instances_for_entity("e1");
        let ids: Vec<&str> = backing.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["i1", "i2"]);
    }
}
