//! armada-types — shared domain types for the Armada control plane.
//!
//! Defines the configuration data model (entities, immutable versions,
//! desired pointers), the dual proxy identity (logical entity vs physical
//! instance), canonical content hashing, and the `ConfigStore` boundary
//! trait with an in-memory implementation.
//!
//! # Identity model
//!
//! A `ConfigEntity` is a stable logical configuration target. A
//! `ProxyInstance` is one connected proxy process backing an entity;
//! several instances can back the same entity, and instances come and go
//! with their gRPC streams while the entity persists.

pub mod error;
pub mod hash;
pub mod store;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use hash::content_hash;
pub use store::{ConfigStore, MemoryStore};
pub use types::*;

/// Current unix time in seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
