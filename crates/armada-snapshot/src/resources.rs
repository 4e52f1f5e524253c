//! Rendered xDS resources and the per-instance snapshot bundle.
//!
//! These are the post-render types pushed to proxies: concrete endpoint
//! lists, materialized listeners and routes. Resources serialize to JSON
//! bytes for the wire payload. Secret material itself never passes through
//! the control plane; only references are rendered and the proxy fetches
//! material from the opaque secret provider.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use armada_types::{EntityId, InstanceId, LbPolicy, Locality, content_hash};

// ── Resource types ────────────────────────────────────────────────

/// The xDS resource types served over the aggregated stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Cluster,
    Endpoint,
    Listener,
    Route,
    Secret,
}

impl ResourceType {
    /// Delivery order for aggregated pushes. Clusters and endpoints must
    /// be deliverable before the listeners and routes that reference them.
    pub const DELIVERY_ORDER: [ResourceType; 5] = [
        ResourceType::Cluster,
        ResourceType::Endpoint,
        ResourceType::Listener,
        ResourceType::Route,
        ResourceType::Secret,
    ];

    pub const fn type_url(&self) -> &'static str {
        match self {
            ResourceType::Cluster => "type.googleapis.com/envoy.config.cluster.v3.Cluster",
            ResourceType::Endpoint => {
                "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment"
            }
            ResourceType::Listener => "type.googleapis.com/envoy.config.listener.v3.Listener",
            ResourceType::Route => "type.googleapis.com/envoy.config.route.v3.RouteConfiguration",
            ResourceType::Secret => {
                "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.Secret"
            }
        }
    }

    pub fn from_type_url(url: &str) -> Option<ResourceType> {
        ResourceType::DELIVERY_ORDER
            .into_iter()
            .find(|rt| rt.type_url() == url)
    }
}

// ── Rendered resources ────────────────────────────────────────────

/// An upstream cluster. Endpoints are always delivered separately as a
/// [`LoadAssignment`], EDS-style, even when the source was static.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cluster {
    pub name: String,
    pub lb_policy: LbPolicy,
    pub connect_timeout_ms: u64,
}

/// Endpoint set for one cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadAssignment {
    pub cluster_name: String,
    pub endpoints: Vec<Endpoint>,
}

/// A single upstream endpoint with its locality.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
    pub weight: u32,
    #[serde(default)]
    pub locality: Locality,
}

/// A rendered listener.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listener {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub route_config: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsContext>,
}

/// Rendered TLS settings referencing a secret by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TlsContext {
    pub cert_name: String,
    pub require_client_cert: bool,
}

/// A rendered route configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteConfig {
    pub name: String,
    pub virtual_hosts: Vec<VirtualHost>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VirtualHost {
    pub name: String,
    pub domains: Vec<String>,
    pub routes: Vec<RouteMatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteMatch {
    pub prefix: String,
    pub cluster: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// A secret reference; the proxy fetches material out of band.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Secret {
    pub name: String,
}

// ── Snapshot ──────────────────────────────────────────────────────

/// The complete, versioned xDS resource bundle for one physical instance.
///
/// Deterministic: the same (configuration version, endpoint set) pair
/// always yields byte-identical resources and checksum. `generation` and
/// `generated_at` are bookkeeping and excluded from the checksum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub instance_id: InstanceId,
    pub entity_id: EntityId,
    /// Sequence of the source configuration version.
    pub sequence: u64,
    /// Content hash of the source configuration version.
    pub source_hash: String,
    pub clusters: Vec<Cluster>,
    pub endpoints: Vec<LoadAssignment>,
    pub listeners: Vec<Listener>,
    pub routes: Vec<RouteConfig>,
    pub secrets: Vec<Secret>,
    /// Canonical hash per resource type, for change detection.
    pub type_hashes: BTreeMap<ResourceType, String>,
    /// Canonical hash over the full resource set.
    pub checksum: String,
    /// Per-instance supersession counter.
    pub generation: u64,
    /// Unix timestamp (seconds) of generation.
    pub generated_at: u64,
}

impl Snapshot {
    /// Compute and install the per-type hashes and the overall checksum.
    pub fn seal(&mut self) {
        let mut hashes = BTreeMap::new();
        hashes.insert(ResourceType::Cluster, content_hash(&self.clusters));
        hashes.insert(ResourceType::Endpoint, content_hash(&self.endpoints));
        hashes.insert(ResourceType::Listener, content_hash(&self.listeners));
        hashes.insert(ResourceType::Route, content_hash(&self.routes));
        hashes.insert(ResourceType::Secret, content_hash(&self.secrets));

        self.checksum = content_hash(&hashes);
        self.type_hashes = hashes;
    }

    /// Hash of one resource type's content.
    pub fn type_hash(&self, rt: ResourceType) -> Option<&str> {
        self.type_hashes.get(&rt).map(String::as_str)
    }

    /// Serialize the resources of one type as (name, payload) pairs in
    /// name order.
    pub fn encode_resources(&self, rt: ResourceType) -> Vec<(String, Vec<u8>)> {
        fn encode<T: Serialize>(name: &str, value: &T) -> (String, Vec<u8>) {
            (
                name.to_string(),
                serde_json::to_vec(value).unwrap_or_default(),
            )
        }

        match rt {
            ResourceType::Cluster => self
                .clusters
                .iter()
                .map(|c| encode(&c.name, c))
                .collect(),
            ResourceType::Endpoint => self
                .endpoints
                .iter()
                .map(|e| encode(&e.cluster_name, e))
                .collect(),
            ResourceType::Listener => self
                .listeners
                .iter()
                .map(|l| encode(&l.name, l))
                .collect(),
            ResourceType::Route => self.routes.iter().map(|r| encode(&r.name, r)).collect(),
            ResourceType::Secret => self.secrets.iter().map(|s| encode(&s.name, s)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> Snapshot {
        let mut snapshot = Snapshot {
            instance_id: "i1".to_string(),
            entity_id: "e1".to_string(),
            sequence: 1,
            source_hash: "abc".to_string(),
            clusters: vec![Cluster {
                name: "backend".to_string(),
                lb_policy: LbPolicy::RoundRobin,
                connect_timeout_ms: 250,
            }],
            endpoints: vec![LoadAssignment {
                cluster_name: "backend".to_string(),
                endpoints: vec![Endpoint {
                    address: "10.0.0.1".to_string(),
                    port: 9000,
                    weight: 1,
                    locality: Locality::default(),
                }],
            }],
            listeners: vec![],
            routes: vec![],
            secrets: vec![],
            type_hashes: BTreeMap::new(),
            checksum: String::new(),
            generation: 0,
            generated_at: 0,
        };
        snapshot.seal();
        snapshot
    }

    #[test]
    fn seal_fills_all_type_hashes() {
        let snapshot = sample_snapshot();
        for rt in ResourceType::DELIVERY_ORDER {
            assert!(snapshot.type_hash(rt).is_some());
        }
        assert!(!snapshot.checksum.is_empty());
    }

    #[test]
    fn checksum_ignores_bookkeeping_fields() {
        let a = sample_snapshot();
        let mut b = sample_snapshot();
        b.generation = 42;
        b.generated_at = 99_999;
        b.seal();
        assert_eq!(a.checksum, b.checksum);
    }

    #[test]
    fn checksum_tracks_resource_changes() {
        let a = sample_snapshot();
        let mut b = sample_snapshot();
        b.endpoints[0].endpoints[0].port = 9001;
        b.seal();
        assert_ne!(a.checksum, b.checksum);
        assert_ne!(
            a.type_hash(ResourceType::Endpoint),
            b.type_hash(ResourceType::Endpoint)
        );
        assert_eq!(
            a.type_hash(ResourceType::Cluster),
            b.type_hash(ResourceType::Cluster)
        );
    }

    #[test]
    fn delivery_order_starts_with_clusters() {
        assert_eq!(ResourceType::DELIVERY_ORDER[0], ResourceType::Cluster);
        assert_eq!(ResourceType::DELIVERY_ORDER[1], ResourceType::Endpoint);
    }

    #[test]
    fn type_url_roundtrip() {
        for rt in ResourceType::DELIVERY_ORDER {
            assert_eq!(ResourceType::from_type_url(rt.type_url()), Some(rt));
        }
        assert_eq!(ResourceType::from_type_url("nope"), None);
    }

    #[test]
    fn encode_resources_in_name_order() {
        let snapshot = sample_snapshot();
        let encoded = snapshot.encode_resources(ResourceType::Cluster);
        assert_eq!(encoded.len(), 1);
        assert_eq!(encoded[0].0, "backend");
        assert!(!encoded[0].1.is_empty());
    }
}
