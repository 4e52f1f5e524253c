//! armada-snapshot — per-instance xDS snapshot generation and caching.
//!
//! Turns an active configuration version plus live service-discovery state
//! into a complete, self-consistent set of xDS resources for one physical
//! proxy instance, and holds the latest snapshot per instance in a
//! watch-based cache.
//!
//! # Components
//!
//! - **`resources`** — rendered xDS resource types and the `Snapshot` bundle
//! - **`resolve`** — template-inheritance resolution to a materialized spec
//! - **`discovery`** — the service-discovery boundary: trait, static
//!   resolver, TTL cache, debounced endpoint-event batching
//! - **`generator`** — deterministic snapshot builder with per-instance
//!   supersession
//! - **`cache`** — concurrent instance → snapshot store with per-key
//!   latest-wins watch channels

pub mod cache;
pub mod discovery;
pub mod error;
pub mod generator;
pub mod resolve;
pub mod resources;

pub use cache::SnapshotCache;
pub use discovery::{CachingResolver, EndpointEvent, ServiceDiscovery, StaticResolver};
pub use error::{SnapshotError, SnapshotResult};
pub use generator::SnapshotGenerator;
pub use resources::{Endpoint, ResourceType, Snapshot};
