//! Service discovery boundary.
//!
//! Endpoint resolution is an external collaborator. This module carries
//! the [`ServiceDiscovery`] trait, a static in-process resolver used by
//! the daemon and tests, a TTL read-through cache, and the debounced
//! endpoint-event batcher that coalesces churn into single regenerations.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};

use crate::error::{SnapshotError, SnapshotResult};
use crate::resources::Endpoint;

/// Default TTL for cached resolutions.
pub const DEFAULT_RESOLVE_TTL: Duration = Duration::from_secs(5);

/// Default window for coalescing endpoint-change events.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Resolves service references to concrete endpoint lists.
#[async_trait]
pub trait ServiceDiscovery: Send + Sync {
    async fn resolve(&self, service: &str) -> SnapshotResult<Vec<Endpoint>>;
}

#[async_trait]
impl<T: ServiceDiscovery + ?Sized> ServiceDiscovery for std::sync::Arc<T> {
    async fn resolve(&self, service: &str) -> SnapshotResult<Vec<Endpoint>> {
        (**self).resolve(service).await
    }
}

/// An endpoint-change notification from the discovery collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointEvent {
    pub service: String,
}

// ── Static resolver ───────────────────────────────────────────────

/// In-process resolver over a fixed table, with a push channel for
/// endpoint-change events.
pub struct StaticResolver {
    table: RwLock<HashMap<String, Vec<Endpoint>>>,
    events: broadcast::Sender<EndpointEvent>,
    /// Simulates a fully-unavailable discovery backend.
    unavailable: RwLock<bool>,
}

impl StaticResolver {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            table: RwLock::new(HashMap::new()),
            events,
            unavailable: RwLock::new(false),
        }
    }

    /// Replace a service's endpoints and publish a change event.
    pub fn set_endpoints(&self, service: &str, endpoints: Vec<Endpoint>) {
        self.table
            .write()
            .expect("discovery table lock")
            .insert(service.to_string(), endpoints);
        // Nobody listening is fine; events are best-effort.
        let _ = self.events.send(EndpointEvent {
            service: service.to_string(),
        });
    }

    /// Subscribe to endpoint-change events.
    pub fn subscribe(&self) -> broadcast::Receiver<EndpointEvent> {
        self.events.subscribe()
    }

    /// Toggle backend availability (for failure-path behavior).
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().expect("discovery flag lock") = unavailable;
    }

    /// Services currently present in the table.
    pub fn services(&self) -> Vec<String> {
        self.table
            .read()
            .expect("discovery table lock")
            .keys()
            .cloned()
            .collect()
    }
}

impl Default for StaticResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceDiscovery for StaticResolver {
    async fn resolve(&self, service: &str) -> SnapshotResult<Vec<Endpoint>> {
        if *self.unavailable.read().expect("discovery flag lock") {
            return Err(SnapshotError::Discovery {
                service: service.to_string(),
                reason: "discovery backend unavailable".to_string(),
            });
        }
        self.table
            .read()
            .expect("discovery table lock")
            .get(service)
            .cloned()
            .ok_or_else(|| SnapshotError::UnknownService(service.to_string()))
    }
}

// ── TTL cache ─────────────────────────────────────────────────────

/// Read-through cache in front of another resolver.
///
/// Hits within the TTL are served from the cache; a change event should
/// [`invalidate`] the affected service so the next resolution is fresh.
///
/// [`invalidate`]: CachingResolver::invalidate
pub struct CachingResolver<D> {
    inner: D,
    ttl: Duration,
    cache: Mutex<HashMap<String, (Instant, Vec<Endpoint>)>>,
}

impl<D: ServiceDiscovery> CachingResolver<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            ttl: DEFAULT_RESOLVE_TTL,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Drop the cached entry for a service.
    pub fn invalidate(&self, service: &str) {
        self.cache
            .lock()
            .expect("resolve cache lock")
            .remove(service);
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

#[async_trait]
impl<D: ServiceDiscovery> ServiceDiscovery for CachingResolver<D> {
    async fn resolve(&self, service: &str) -> SnapshotResult<Vec<Endpoint>> {
        {
            let cache = self.cache.lock().expect("resolve cache lock");
            if let Some((at, endpoints)) = cache.get(service) {
                if at.elapsed() < self.ttl {
                    return Ok(endpoints.clone());
                }
            }
        }

        let endpoints = self.inner.resolve(service).await?;
        self.cache
            .lock()
            .expect("resolve cache lock")
            .insert(service.to_string(), (Instant::now(), endpoints.clone()));
        Ok(endpoints)
    }
}

// ── Debounced event batching ──────────────────────────────────────

/// Coalesce endpoint-change events into batches.
///
/// The first event opens a window; everything arriving within it is
/// deduplicated into one batch, delivered on `batches` when the window
/// closes. Runs until the event channel closes or `shutdown` flips.
pub async fn run_debouncer(
    mut events: broadcast::Receiver<EndpointEvent>,
    window: Duration,
    mut shutdown: watch::Receiver<bool>,
    batches: mpsc::Sender<Vec<String>>,
) {
    loop {
        // Wait for the first event of a batch.
        let first = tokio::select! {
            event = events.recv() => event,
            _ = shutdown.changed() => break,
        };

        let mut pending: HashSet<String> = HashSet::new();
        match first {
            Ok(event) => {
                pending.insert(event.service);
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "endpoint event stream lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }

        // Drain everything that arrives within the window.
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                event = events.recv() => match event {
                    Ok(event) => {
                        pending.insert(event.service);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "endpoint event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.changed() => return,
            }
        }

        let mut batch: Vec<String> = pending.into_iter().collect();
        batch.sort();
        debug!(services = batch.len(), "endpoint changes coalesced");
        if batches.send(batch).await.is_err() {
            break;
        }
    }
}
