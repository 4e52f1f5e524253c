//! Config store boundary.
//!
//! The storage engine is an external collaborator; the control plane only
//! depends on the narrow [`ConfigStore`] interface. [`MemoryStore`] is the
//! in-process implementation used by the daemon and tests.
//!
//! Invariants enforced here:
//! - version sequences per entity are contiguous starting at 1
//! - only `valid` versions can become the desired version
//! - a version referenced by a deployment cannot be deleted

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::hash::content_hash;
use crate::types::{
    ConfigSpec, ConfigVersion, DesiredPointer, EntityId, ValidationState, VersionMeta,
};

/// Narrow interface to configuration storage.
pub trait ConfigStore: Send + Sync {
    /// Create the next version for an entity from a spec.
    ///
    /// Assigns the next contiguous sequence number and links the parent.
    fn create_version(
        &self,
        entity_id: &str,
        spec: ConfigSpec,
        validation: ValidationState,
    ) -> StoreResult<ConfigVersion>;

    /// Load a full version by entity and sequence.
    fn load_version(&self, entity_id: &str, sequence: u64) -> StoreResult<ConfigVersion>;

    /// List version summaries for an entity, in sequence order.
    fn list_versions(&self, entity_id: &str) -> StoreResult<Vec<VersionMeta>>;

    /// Point the entity's desired pointer at a version.
    ///
    /// Fails unless the version exists and has passed validation.
    fn set_desired(&self, entity_id: &str, sequence: u64) -> StoreResult<DesiredPointer>;

    /// Current desired pointer for an entity, if one has been set.
    fn desired(&self, entity_id: &str) -> StoreResult<Option<DesiredPointer>>;

    /// Update a version's validation status (pending → valid/invalid).
    fn mark_validation(
        &self,
        entity_id: &str,
        sequence: u64,
        state: ValidationState,
    ) -> StoreResult<()>;

    /// Take a deployment reference on a version, pinning it against deletion.
    fn retain_version(&self, entity_id: &str, sequence: u64) -> StoreResult<()>;

    /// Release a deployment reference taken with [`retain_version`].
    ///
    /// [`retain_version`]: ConfigStore::retain_version
    fn release_version(&self, entity_id: &str, sequence: u64) -> StoreResult<()>;

    /// Delete the latest version of an entity.
    ///
    /// Refused while any deployment references it or the desired pointer
    /// targets it. Only the latest version may go, keeping sequences
    /// contiguous.
    fn delete_version(&self, entity_id: &str, sequence: u64) -> StoreResult<()>;
}

#[derive(Default)]
struct Inner {
    /// Versions per entity; index `i` holds sequence `i + 1`.
    versions: HashMap<EntityId, Vec<ConfigVersion>>,
    desired: HashMap<EntityId, DesiredPointer>,
    /// Deployment reference counts per (entity, sequence).
    refs: HashMap<(EntityId, u64), usize>,
}

/// In-memory [`ConfigStore`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-built version, enforcing sequence contiguity.
    pub fn put_version(&self, version: ConfigVersion) -> StoreResult<()> {
        let mut inner = self.inner.write().expect("store lock");
        let chain = inner.versions.entry(version.entity_id.clone()).or_default();
        let expected = chain.len() as u64 + 1;
        if version.sequence != expected {
            return Err(StoreError::SequentialViolation {
                entity: version.entity_id.clone(),
                expected,
                got: version.sequence,
            });
        }
        debug!(entity = %version.entity_id, sequence = version.sequence, "version stored");
        chain.push(version);
        Ok(())
    }
}

impl ConfigStore for MemoryStore {
    fn create_version(
        &self,
        entity_id: &str,
        spec: ConfigSpec,
        validation: ValidationState,
    ) -> StoreResult<ConfigVersion> {
        let hash = content_hash(&spec);
        let mut inner = self.inner.write().expect("store lock");
        let chain = inner.versions.entry(entity_id.to_string()).or_default();

        let sequence = chain.len() as u64 + 1;
        let version = ConfigVersion {
            entity_id: entity_id.to_string(),
            sequence,
            spec,
            content_hash: hash,
            validation,
            parent: chain.last().map(|v| v.sequence),
            created_at: crate::epoch_secs(),
        };
        chain.push(version.clone());

        info!(entity = %entity_id, sequence, hash = %version.content_hash, "version created");
        Ok(version)
    }

    fn load_version(&self, entity_id: &str, sequence: u64) -> StoreResult<ConfigVersion> {
        let inner = self.inner.read().expect("store lock");
        inner
            .versions
            .get(entity_id)
            .and_then(|chain| chain.get((sequence as usize).checked_sub(1)?))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{entity_id}:{sequence}")))
    }

    fn list_versions(&self, entity_id: &str) -> StoreResult<Vec<VersionMeta>> {
        let inner = self.inner.read().expect("store lock");
        let chain = inner
            .versions
            .get(entity_id)
            .ok_or_else(|| StoreError::NotFound(entity_id.to_string()))?;

        Ok(chain
            .iter()
            .map(|v| VersionMeta {
                sequence: v.sequence,
                content_hash: v.content_hash.clone(),
                validation: v.validation,
                created_at: v.created_at,
            })
            .collect())
    }

    fn set_desired(&self, entity_id: &str, sequence: u64) -> StoreResult<DesiredPointer> {
        let mut inner = self.inner.write().expect("store lock");
        let version = inner
            .versions
            .get(entity_id)
            .and_then(|chain| chain.get((sequence as usize).checked_sub(1)?))
            .ok_or_else(|| StoreError::NotFound(format!("{entity_id}:{sequence}")))?;

        if version.validation != ValidationState::Valid {
            return Err(StoreError::NotActivatable {
                entity: entity_id.to_string(),
                sequence,
                state: format!("{:?}", version.validation).to_lowercase(),
            });
        }

        let pointer = DesiredPointer {
            entity_id: entity_id.to_string(),
            sequence,
            content_hash: version.content_hash.clone(),
        };
        inner.desired.insert(entity_id.to_string(), pointer.clone());

        info!(entity = %entity_id, sequence, "desired pointer moved");
        Ok(pointer)
    }

    fn desired(&self, entity_id: &str) -> StoreResult<Option<DesiredPointer>> {
        let inner = self.inner.read().expect("store lock");
        Ok(inner.desired.get(entity_id).cloned())
    }

    fn mark_validation(
        &self,
        entity_id: &str,
        sequence: u64,
        state: ValidationState,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().expect("store lock");
        let version = inner
            .versions
            .get_mut(entity_id)
            .and_then(|chain| chain.get_mut((sequence as usize).checked_sub(1)?))
            .ok_or_else(|| StoreError::NotFound(format!("{entity_id}:{sequence}")))?;

        version.validation = state;
        Ok(())
    }

    fn retain_version(&self, entity_id: &str, sequence: u64) -> StoreResult<()> {
        let mut inner = self.inner.write().expect("store lock");
        let exists = inner
            .versions
            .get(entity_id)
            .is_some_and(|chain| (sequence as usize) <= chain.len() && sequence >= 1);
        if !exists {
            return Err(StoreError::NotFound(format!("{entity_id}:{sequence}")));
        }
        *inner
            .refs
            .entry((entity_id.to_string(), sequence))
            .or_insert(0) += 1;
        Ok(())
    }

    fn release_version(&self, entity_id: &str, sequence: u64) -> StoreResult<()> {
        let mut inner = self.inner.write().expect("store lock");
        let key = (entity_id.to_string(), sequence);
        if let Some(count) = inner.refs.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                inner.refs.remove(&key);
            }
        }
        Ok(())
    }

    fn delete_version(&self, entity_id: &str, sequence: u64) -> StoreResult<()> {
        let mut inner = self.inner.write().expect("store lock");

        let key = (entity_id.to_string(), sequence);
        if let Some(&count) = inner.refs.get(&key) {
            return Err(StoreError::VersionReferenced {
                entity: entity_id.to_string(),
                sequence,
                count,
            });
        }
        if inner
            .desired
            .get(entity_id)
            .is_some_and(|d| d.sequence == sequence)
        {
            return Err(StoreError::VersionReferenced {
                entity: entity_id.to_string(),
                sequence,
                count: 1,
            });
        }

        let chain = inner
            .versions
            .get_mut(entity_id)
            .ok_or_else(|| StoreError::NotFound(entity_id.to_string()))?;
        match chain.last() {
            Some(last) if last.sequence == sequence => {
                chain.pop();
                debug!(entity = %entity_id, sequence, "version deleted");
                Ok(())
            }
            Some(_) => Err(StoreError::Storage(format!(
                "only the latest version of {entity_id} can be deleted"
            ))),
            None => Err(StoreError::NotFound(format!("{entity_id}:{sequence}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_version(entity: &str) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .create_version(entity, ConfigSpec::default(), ValidationState::Valid)
            .unwrap();
        store
    }

    #[test]
    fn sequences_are_contiguous_from_one() {
        let store = MemoryStore::new();
        let v1 = store
            .create_version("e", ConfigSpec::default(), ValidationState::Valid)
            .unwrap();
        let v2 = store
            .create_version("e", ConfigSpec::default(), ValidationState::Valid)
            .unwrap();

        assert_eq!(v1.sequence, 1);
        assert_eq!(v2.sequence, 2);
        assert_eq!(v2.parent, Some(1));
    }

    #[test]
    fn non_contiguous_insert_fails() {
        let store = store_with_version("e");
        let version = ConfigVersion {
            entity_id: "e".to_string(),
            sequence: 5,
            spec: ConfigSpec::default(),
            content_hash: "x".to_string(),
            validation: ValidationState::Valid,
            parent: None,
            created_at: 0,
        };

        let err = store.put_version(version).unwrap_err();
        assert!(matches!(
            err,
            StoreError::SequentialViolation {
                expected: 2,
                got: 5,
                ..
            }
        ));
    }

    #[test]
    fn set_desired_requires_valid_version() {
        let store = MemoryStore::new();
        store
            .create_version("e", ConfigSpec::default(), ValidationState::Pending)
            .unwrap();

        let err = store.set_desired("e", 1).unwrap_err();
        assert!(matches!(err, StoreError::NotActivatable { .. }));

        store
            .mark_validation("e", 1, ValidationState::Valid)
            .unwrap();
        let pointer = store.set_desired("e", 1).unwrap();
        assert_eq!(pointer.sequence, 1);
    }

    #[test]
    fn desired_pointer_carries_hash() {
        let store = store_with_version("e");
        let v = store.load_version("e", 1).unwrap();
        let pointer = store.set_desired("e", 1).unwrap();
        assert_eq!(pointer.content_hash, v.content_hash);
    }

    #[test]
    fn referenced_version_cannot_be_deleted() {
        let store = store_with_version("e");
        store.retain_version("e", 1).unwrap();

        let err = store.delete_version("e", 1).unwrap_err();
        assert!(matches!(err, StoreError::VersionReferenced { .. }));

        store.release_version("e", 1).unwrap();
        store.delete_version("e", 1).unwrap();
        assert!(store.load_version("e", 1).is_err());
    }

    #[test]
    fn desired_version_cannot_be_deleted() {
        let store = store_with_version("e");
        store.set_desired("e", 1).unwrap();

        let err = store.delete_version("e", 1).unwrap_err();
        assert!(matches!(err, StoreError::VersionReferenced { .. }));
    }

    #[test]
    fn only_latest_version_deletable() {
        let store = store_with_version("e");
        store
            .create_version("e", ConfigSpec::default(), ValidationState::Valid)
            .unwrap();

        assert!(store.delete_version("e", 1).is_err());
        store.delete_version("e", 2).unwrap();
        assert_eq!(store.list_versions("e").unwrap().len(), 1);
    }

    #[test]
    fn list_versions_in_order() {
        let store = MemoryStore::new();
        for _ in 0..3 {
            store
                .create_version("e", ConfigSpec::default(), ValidationState::Valid)
                .unwrap();
        }

        let metas = store.list_versions("e").unwrap();
        let sequences: Vec<u64> = metas.iter().map(|m| m.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn load_missing_version() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.load_version("missing", 1),
            Err(StoreError::NotFound(_))
        ));
    }
}
