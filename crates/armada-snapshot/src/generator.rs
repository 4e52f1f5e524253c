//! Snapshot generator — resolves a configuration version into a complete
//! per-instance resource bundle.
//!
//! Generation is deterministic: resources are emitted in dependency order
//! (clusters → endpoints → listeners → routes → secrets), every list is
//! name-sorted, and the checksum is canonical. Generation for different
//! instances proceeds in parallel; generation for the same instance is
//! serialized by a supersession counter — when a newer generation starts,
//! the older in-flight result is discarded on completion.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use armada_types::{ConfigSpec, ConfigVersion, EndpointSource, ProxyInstance, epoch_secs};

use crate::cache::SnapshotCache;
use crate::discovery::ServiceDiscovery;
use crate::error::{SnapshotError, SnapshotResult};
use crate::resolve::resolve_spec;
use crate::resources::{
    Cluster, Endpoint, Listener, LoadAssignment, RouteConfig, RouteMatch, Secret, Snapshot,
    TlsContext, VirtualHost,
};

/// Tunables for snapshot generation.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Resolution attempts per service before giving up.
    pub resolve_attempts: u32,
    /// Base backoff between attempts; doubles per retry.
    pub resolve_backoff: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            resolve_attempts: 3,
            resolve_backoff: Duration::from_millis(50),
        }
    }
}

/// Builds snapshots for physical instances.
pub struct SnapshotGenerator {
    discovery: Arc<dyn ServiceDiscovery>,
    config: GeneratorConfig,
    /// Supersession counter per instance.
    generations: Mutex<HashMap<String, u64>>,
}

impl SnapshotGenerator {
    pub fn new(discovery: Arc<dyn ServiceDiscovery>) -> Self {
        Self {
            discovery,
            config: GeneratorConfig::default(),
            generations: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_config(mut self, config: GeneratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Generate a snapshot for one instance from a configuration version.
    ///
    /// Pure apart from discovery reads; carries no generation counter
    /// (that is assigned when the result is installed into the cache).
    pub async fn generate(
        &self,
        instance: &ProxyInstance,
        version: &ConfigVersion,
        templates: &HashMap<String, ConfigSpec>,
    ) -> SnapshotResult<Snapshot> {
        let spec = resolve_spec(&version.spec, templates)?;

        // Clusters and their endpoint sets, name-sorted.
        let mut clusters: Vec<Cluster> = Vec::with_capacity(spec.clusters.len());
        let mut endpoints: Vec<LoadAssignment> = Vec::with_capacity(spec.clusters.len());

        let mut cluster_specs: Vec<_> = spec.clusters.iter().collect();
        cluster_specs.sort_by(|a, b| a.name.cmp(&b.name));

        for cluster in cluster_specs {
            clusters.push(Cluster {
                name: cluster.name.clone(),
                lb_policy: cluster.lb_policy,
                connect_timeout_ms: cluster.connect_timeout_ms,
            });

            let mut resolved = match &cluster.endpoints {
                EndpointSource::Static { endpoints } => endpoints
                    .iter()
                    .map(|e| Endpoint {
                        address: e.address.clone(),
                        port: e.port,
                        weight: e.weight,
                        locality: Default::default(),
                    })
                    .collect(),
                EndpointSource::Service { service } => self.resolve_with_retry(service).await?,
            };
            resolved.sort_by(|a, b| (&a.address, a.port).cmp(&(&b.address, b.port)));

            endpoints.push(LoadAssignment {
                cluster_name: cluster.name.clone(),
                endpoints: resolved,
            });
        }

        let mut listeners: Vec<Listener> = spec
            .listeners
            .iter()
            .map(|l| Listener {
                name: l.name.clone(),
                address: l.address.clone(),
                port: l.port,
                route_config: l.route_config.clone(),
                tls: l.tls.as_ref().map(|t| TlsContext {
                    cert_name: t.cert_name.clone(),
                    require_client_cert: t.require_client_cert,
                }),
            })
            .collect();
        listeners.sort_by(|a, b| a.name.cmp(&b.name));

        let mut routes: Vec<RouteConfig> = spec
            .routes
            .iter()
            .map(|r| RouteConfig {
                name: r.name.clone(),
                virtual_hosts: r
                    .virtual_hosts
                    .iter()
                    .map(|v| VirtualHost {
                        name: v.name.clone(),
                        domains: v.domains.clone(),
                        routes: v
                            .rules
                            .iter()
                            .map(|rule| RouteMatch {
                                prefix: rule.prefix.clone(),
                                cluster: rule.cluster.clone(),
                                timeout_ms: rule.timeout_ms,
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();
        routes.sort_by(|a, b| a.name.cmp(&b.name));

        // Declared secrets plus listener certificates, deduplicated.
        let secret_names: BTreeSet<String> = spec
            .secrets
            .iter()
            .map(|s| s.name.clone())
            .chain(
                spec.listeners
                    .iter()
                    .filter_map(|l| l.tls.as_ref().map(|t| t.cert_name.clone())),
            )
            .collect();
        let secrets: Vec<Secret> = secret_names
            .into_iter()
            .map(|name| Secret { name })
            .collect();

        let mut snapshot = Snapshot {
            instance_id: instance.id.clone(),
            entity_id: version.entity_id.clone(),
            sequence: version.sequence,
            source_hash: version.content_hash.clone(),
            clusters,
            endpoints,
            listeners,
            routes,
            secrets,
            type_hashes: BTreeMap::new(),
            checksum: String::new(),
            generation: 0,
            generated_at: 0,
        };
        snapshot.seal();

        debug!(
            instance = %instance.id,
            entity = %version.entity_id,
            sequence = version.sequence,
            checksum = %snapshot.checksum,
            "snapshot generated"
        );
        Ok(snapshot)
    }

    /// Generate and install into the cache, honoring supersession.
    ///
    /// Returns `Ok(None)` when a newer generation started for the same
    /// instance while this one was in flight (the result is discarded).
    /// On error the cache is left untouched so the prior known-good
    /// snapshot keeps being served.
    pub async fn generate_into(
        &self,
        cache: &SnapshotCache,
        instance: &ProxyInstance,
        version: &ConfigVersion,
        templates: &HashMap<String, ConfigSpec>,
    ) -> SnapshotResult<Option<Arc<Snapshot>>> {
        let token = {
            let mut generations = self.generations.lock().expect("generation lock");
            let counter = generations.entry(instance.id.clone()).or_insert(0);
            *counter += 1;
            *counter
        };

        match self.generate(instance, version, templates).await {
            Ok(mut snapshot) => {
                let current = {
                    let generations = self.generations.lock().expect("generation lock");
                    generations.get(&instance.id).copied().unwrap_or(0)
                };
                if current != token {
                    debug!(
                        instance = %instance.id,
                        token,
                        current,
                        "generation superseded, result discarded"
                    );
                    return Ok(None);
                }

                snapshot.generation = token;
                snapshot.generated_at = epoch_secs();
                Ok(Some(cache.update(snapshot)))
            }
            Err(e) => {
                warn!(
                    instance = %instance.id,
                    entity = %version.entity_id,
                    sequence = version.sequence,
                    error = %e,
                    "snapshot generation failed, prior snapshot retained"
                );
                Err(e)
            }
        }
    }

    async fn resolve_with_retry(&self, service: &str) -> SnapshotResult<Vec<Endpoint>> {
        let mut backoff = self.config.resolve_backoff;
        let mut last_err = None;

        for attempt in 0..self.config.resolve_attempts {
            match self.discovery.resolve(service).await {
                Ok(endpoints) => return Ok(endpoints),
                // Unknown services are not transient; fail immediately.
                Err(e @ SnapshotError::UnknownService(_)) => return Err(e),
                Err(e) => {
                    if attempt + 1 < self.config.resolve_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| SnapshotError::UnknownService(service.to_string())))
    }
}
