//! Per-stream session state machine.
//!
//! Tracks the protocol state of one connected proxy: which resource types
//! it subscribed to, the last version and nonce sent per type, and the
//! last version acknowledged per type. The session owns no I/O — the
//! stream task feeds it inbound requests and snapshots and sends whatever
//! responses it produces.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use armada_snapshot::{ResourceType, Snapshot};
use armada_types::{EntityId, InstanceId};

use crate::proto;

/// Idle thresholds for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle time before the session is considered stale.
    pub stale_after: Duration,
    /// Idle time before the stream is torn down and the instance marked
    /// terminated.
    pub terminate_after: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(120),
            terminate_after: Duration::from_secs(300),
        }
    }
}

/// Protocol state of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticated,
    Active,
    Stale,
    Disconnected,
}

/// Per-resource-type bookkeeping.
#[derive(Debug, Default)]
struct TypeState {
    subscribed: bool,
    /// Requested resource names; empty means wildcard.
    resource_names: Vec<String>,
    last_sent_version: Option<String>,
    last_sent_nonce: Option<String>,
    last_acked_version: Option<String>,
}

/// What an inbound request amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// A (re)subscription for a type; the current snapshot should be
    /// offered.
    Subscribed(ResourceType),
    /// An ACK. `complete` carries the snapshot source hash once every
    /// subscribed type has acknowledged the current snapshot.
    Acked { complete: Option<String> },
    /// A NACK with the proxy's error detail.
    Nacked {
        source_hash: Option<String>,
        detail: String,
    },
    /// Unknown type or stale nonce; no action.
    Ignored,
}

/// State machine for one connected stream.
pub struct Session {
    instance_id: InstanceId,
    entity_id: EntityId,
    config: SessionConfig,
    state: SessionState,
    types: HashMap<ResourceType, TypeState>,
    nonce_counter: u64,
    /// Source hash of the snapshot the current pushes belong to.
    current_source: Option<String>,
    last_activity: Instant,
}

impl Session {
    pub fn new(instance_id: &str, entity_id: &str, config: SessionConfig) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            entity_id: entity_id.to_string(),
            config,
            state: SessionState::Connecting,
            types: HashMap::new(),
            nonce_counter: 0,
            current_source: None,
            last_activity: Instant::now(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move past `Connecting` once the stream has presented its identity.
    pub fn authenticate(&mut self) {
        if self.state == SessionState::Connecting {
            self.state = SessionState::Authenticated;
        }
    }

    /// Process one inbound discovery request.
    pub fn on_request(&mut self, req: &proto::DiscoveryRequest) -> Disposition {
        self.last_activity = Instant::now();
        if self.state == SessionState::Stale {
            debug!(instance = %self.instance_id, "stale session reactivated");
            self.state = SessionState::Active;
        }

        let Some(rt) = ResourceType::from_type_url(&req.type_url) else {
            warn!(instance = %self.instance_id, type_url = %req.type_url, "unknown type url");
            return Disposition::Ignored;
        };

        let ts = self.types.entry(rt).or_default();
        ts.subscribed = true;
        ts.resource_names = req.resource_names.clone();

        if req.response_nonce.is_empty() {
            return Disposition::Subscribed(rt);
        }

        // A nonce that isn't the one last sent for this type belongs to a
        // superseded response; ignore it.
        if ts.last_sent_nonce.as_deref() != Some(req.response_nonce.as_str()) {
            return Disposition::Ignored;
        }

        if req.error_detail.is_empty() {
            ts.last_acked_version = ts.last_sent_version.clone();
            let complete = if self.all_types_acked() {
                self.current_source.clone()
            } else {
                None
            };
            Disposition::Acked { complete }
        } else {
            Disposition::Nacked {
                source_hash: self.current_source.clone(),
                detail: req.error_detail.clone(),
            }
        }
    }

    /// Build the responses a new snapshot warrants.
    ///
    /// Only subscribed types are pushed, only when their content changed
    /// from what was last acknowledged, in delivery order (clusters and
    /// endpoints before the listeners and routes that reference them).
    pub fn build_responses(&mut self, snapshot: &Snapshot) -> Vec<proto::DiscoveryResponse> {
        self.current_source = Some(snapshot.source_hash.clone());
        let mut out = Vec::new();

        for rt in ResourceType::DELIVERY_ORDER {
            let Some(ts) = self.types.get_mut(&rt) else {
                continue;
            };
            if !ts.subscribed {
                continue;
            }
            let Some(hash) = snapshot.type_hash(rt) else {
                continue;
            };
            // Unchanged since the last ACK, or already in flight.
            if ts.last_acked_version.as_deref() == Some(hash)
                || ts.last_sent_version.as_deref() == Some(hash)
            {
                continue;
            }

            self.nonce_counter += 1;
            let nonce = format!("{}-{}", snapshot.instance_id, self.nonce_counter);

            let resources: Vec<proto::Resource> = snapshot
                .encode_resources(rt)
                .into_iter()
                .filter(|(name, _)| {
                    ts.resource_names.is_empty() || ts.resource_names.contains(name)
                })
                .map(|(name, payload)| proto::Resource { name, payload })
                .collect();

            ts.last_sent_version = Some(hash.to_string());
            ts.last_sent_nonce = Some(nonce.clone());

            out.push(proto::DiscoveryResponse {
                version_info: hash.to_string(),
                resources,
                type_url: rt.type_url().to_string(),
                nonce,
            });
        }

        if !out.is_empty() {
            self.state = SessionState::Active;
            debug!(
                instance = %self.instance_id,
                responses = out.len(),
                source = %snapshot.source_hash,
                "responses built"
            );
        }
        out
    }

    /// Evaluate idle transitions. Returns the state after the check.
    pub fn tick(&mut self, now: Instant) -> SessionState {
        let idle = now.duration_since(self.last_activity);
        self.state = match self.state {
            SessionState::Active | SessionState::Authenticated | SessionState::Stale
                if idle >= self.config.terminate_after =>
            {
                SessionState::Disconnected
            }
            SessionState::Active | SessionState::Authenticated
                if idle >= self.config.stale_after =>
            {
                SessionState::Stale
            }
            state => state,
        };
        self.state
    }

    pub fn mark_disconnected(&mut self) {
        self.state = SessionState::Disconnected;
    }

    fn all_types_acked(&self) -> bool {
        self.current_source.is_some()
            && self.types.values().all(|ts| {
                !ts.subscribed
                    || ts.last_sent_version.is_none()
                    || ts.last_acked_version == ts.last_sent_version
            })
    }
}
