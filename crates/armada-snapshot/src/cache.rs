//! Snapshot cache — instance-keyed store with watch semantics.
//!
//! One slot per physical instance. Each slot is a single-value watch
//! channel: an update replaces the value atomically and wakes every
//! watcher, and a lagging watcher only ever observes the latest value.
//! Updates never block on watcher consumption.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tracing::debug;

use armada_types::InstanceId;

use crate::resources::Snapshot;

type Slot = watch::Sender<Option<Arc<Snapshot>>>;

/// Concurrent map from instance id to its current snapshot.
pub struct SnapshotCache {
    slots: RwLock<HashMap<InstanceId, Slot>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Current snapshot for an instance, if one has ever been generated.
    pub fn get(&self, instance_id: &str) -> Option<Arc<Snapshot>> {
        let slots = self.slots.read().expect("snapshot cache lock");
        slots
            .get(instance_id)
            .and_then(|slot| slot.borrow().clone())
    }

    /// Replace an instance's snapshot and notify all watchers.
    ///
    /// Returns the shared handle to the stored snapshot.
    pub fn update(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let instance_id = snapshot.instance_id.clone();
        let snapshot = Arc::new(snapshot);

        let mut slots = self.slots.write().expect("snapshot cache lock");
        let slot = slots
            .entry(instance_id.clone())
            .or_insert_with(|| watch::channel(None).0);
        slot.send_replace(Some(snapshot.clone()));

        debug!(
            instance = %instance_id,
            checksum = %snapshot.checksum,
            generation = snapshot.generation,
            "snapshot cached"
        );
        snapshot
    }

    /// Subscribe to an instance's snapshot changes.
    ///
    /// The receiver starts at the current value (or `None` if nothing has
    /// been generated yet) and observes every subsequent replacement,
    /// latest-wins.
    pub fn watch(&self, instance_id: &str) -> watch::Receiver<Option<Arc<Snapshot>>> {
        let mut slots = self.slots.write().expect("snapshot cache lock");
        slots
            .entry(instance_id.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    /// Drop an instance's slot entirely (instance terminated).
    pub fn remove(&self, instance_id: &str) {
        let mut slots = self.slots.write().expect("snapshot cache lock");
        if let Some(slot) = slots.remove(instance_id) {
            // Watchers still holding a receiver observe the clear.
            slot.send_replace(None);
        }
    }

    /// Instances currently holding a snapshot.
    pub fn instance_ids(&self) -> Vec<InstanceId> {
        let slots = self.slots.read().expect("snapshot cache lock");
        slots
            .iter()
            .filter(|(_, slot)| slot.borrow().is_some())
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}
