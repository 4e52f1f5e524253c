//! Domain types for the Armada control plane.
//!
//! These types model the configuration lifecycle: tenant-scoped entities,
//! their immutable version sequences, the desired-version pointer, and the
//! physical proxy instances that report back over xDS. All types are
//! JSON-serializable for storage and API responses.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for a logical configuration entity (tenant-scoped).
pub type EntityId = String;

/// Unique identifier for a physical proxy instance (one gRPC stream).
pub type InstanceId = String;

/// Unique identifier for the node a proxy instance runs on.
pub type NodeId = String;

/// Tenant identifier for quota and scoping decisions.
pub type TenantId = String;

// ── Entity ────────────────────────────────────────────────────────

/// A named, tenant-scoped logical configuration target.
///
/// Maps 1:1 to a logical proxy identity. Owns a monotonically increasing
/// sequence of [`ConfigVersion`]s.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigEntity {
    pub id: EntityId,
    pub tenant_id: TenantId,
    pub name: String,
    /// Unix timestamp (seconds) when this entity was created.
    pub created_at: u64,
}

// ── Configuration spec (pre-render) ───────────────────────────────

/// The pre-render resource snapshot carried by a configuration version.
///
/// A spec may name a `template`; resolution walks the template chain
/// root-first, same-named child resources shadow template resources and
/// new ones append.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSpec {
    /// Optional template this spec inherits from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default)]
    pub listeners: Vec<ListenerSpec>,
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
    #[serde(default)]
    pub clusters: Vec<ClusterSpec>,
    #[serde(default)]
    pub secrets: Vec<SecretRef>,
}

/// A listener definition: where the proxy accepts traffic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListenerSpec {
    pub name: String,
    pub address: String,
    pub port: u16,
    /// Name of the route configuration served from this listener.
    pub route_config: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSpec>,
}

/// TLS settings for a listener. Certificate material itself lives behind
/// the opaque secret provider; only the reference is carried here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TlsSpec {
    /// Name of the server certificate secret.
    pub cert_name: String,
    #[serde(default)]
    pub require_client_cert: bool,
}

/// A route configuration: virtual hosts and their routing rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteSpec {
    pub name: String,
    pub virtual_hosts: Vec<VirtualHostSpec>,
}

/// A virtual host within a route configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VirtualHostSpec {
    pub name: String,
    pub domains: Vec<String>,
    pub rules: Vec<RouteRule>,
}

/// A single routing rule: path prefix to upstream cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteRule {
    pub prefix: String,
    pub cluster: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// An upstream cluster definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterSpec {
    pub name: String,
    /// How the cluster's endpoints are obtained.
    pub endpoints: EndpointSource,
    #[serde(default)]
    pub lb_policy: LbPolicy,
    pub connect_timeout_ms: u64,
}

/// Where a cluster's endpoints come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EndpointSource {
    /// Fixed endpoint list embedded in the spec.
    Static { endpoints: Vec<EndpointSpec> },
    /// Resolved through the service-discovery collaborator.
    Service { service: String },
}

/// A single static endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointSpec {
    pub address: String,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// Load-balancing policy for a cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LbPolicy {
    #[default]
    RoundRobin,
    LeastRequest,
    Random,
}

/// Reference to a secret held by the external secret provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecretRef {
    pub name: String,
}

// ── Versions ──────────────────────────────────────────────────────

/// Validation status of a configuration version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    Pending,
    Valid,
    Invalid,
}

/// An immutable configuration version.
///
/// Sequence numbers are contiguous per entity starting at 1; enforcement
/// lives at the store boundary. Once created, only the validation status
/// may change (pending → valid/invalid).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigVersion {
    pub entity_id: EntityId,
    pub sequence: u64,
    pub spec: ConfigSpec,
    /// Canonical hash over the spec (stable under key reordering).
    pub content_hash: String,
    pub validation: ValidationState,
    /// Sequence of the version this one was derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<u64>,
    /// Unix timestamp (seconds) when this version was created.
    pub created_at: u64,
}

impl ConfigVersion {
    /// Build the composite key for version lookups.
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.entity_id, self.sequence)
    }
}

/// Summary of a version, as returned by listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionMeta {
    pub sequence: u64,
    pub content_hash: String,
    pub validation: ValidationState,
    pub created_at: u64,
}

/// Per-entity pointer to the version that should be running.
///
/// Mutated only by an explicit activate or rollback operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesiredPointer {
    pub entity_id: EntityId,
    pub sequence: u64,
    pub content_hash: String,
}

// ── Proxy instances ───────────────────────────────────────────────

/// Physical location of a proxy instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Locality {
    pub region: String,
    pub zone: String,
}

/// Lifecycle status of a physical proxy instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Connected,
    Stale,
    Terminated,
}

/// A physical proxy instance: one connected gRPC stream.
///
/// Created when a stream first registers, marked terminated when the
/// stream closes and does not reconnect within the grace period. Distinct
/// from the logical [`ConfigEntity`] it backs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProxyInstance {
    pub id: InstanceId,
    pub entity_id: EntityId,
    pub node_id: NodeId,
    pub locality: Locality,
    pub status: InstanceStatus,
    /// Content hash of the last configuration version this instance ACKed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_acked_hash: Option<String>,
    /// Unix timestamp (seconds) of the last activity on the stream.
    pub last_seen: u64,
}

impl ProxyInstance {
    /// True if the instance has not been heard from within `window` seconds.
    pub fn is_stale(&self, now: u64, window: u64) -> bool {
        now.saturating_sub(self.last_seen) > window
    }
}

// ── Validation context inputs ─────────────────────────────────────

/// Per-tenant resource quota.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotaLimits {
    pub max_listeners: usize,
    pub max_routes: usize,
    pub max_clusters: usize,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            max_listeners: 64,
            max_routes: 256,
            max_clusters: 256,
        }
    }
}

/// Read-only context a validation run executes against.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    pub tenant_id: TenantId,
    pub quota: QuotaLimits,
    /// Secrets resolvable through the secret provider.
    pub known_secrets: Vec<String>,
    /// Certificate expiry (unix seconds) by secret name, where known.
    pub cert_expiry: HashMap<String, u64>,
    /// Services resolvable through service discovery.
    pub known_services: Vec<String>,
    /// Listener address:port pairs claimed by other active entities
    /// within the same node scope.
    pub claimed_addresses: Vec<(String, u16)>,
    /// Templates resolvable by name.
    pub templates: HashMap<String, ConfigSpec>,
    /// Current unix time (seconds).
    pub now: u64,
}
