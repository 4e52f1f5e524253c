//! ADS gRPC server — one task per connected stream.
//!
//! The spawned task owns the write side of its stream exclusively.
//! Inbound requests and snapshot-cache updates both funnel through its
//! `select!` loop, so responses are never interleaved by concurrent
//! writers. A periodic tick drives the idle state machine; a stream idle
//! past the teardown threshold is closed and its instance marked
//! disconnected.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, warn};

use armada_snapshot::{Snapshot, SnapshotCache};
use armada_types::Locality;

use crate::proto;
use crate::proto::aggregated_discovery_server::{AggregatedDiscovery, AggregatedDiscoveryServer};
use crate::registry::StreamRegistry;
use crate::session::{Disposition, Session, SessionConfig, SessionState};
use crate::{XdsError, XdsResult};

/// gRPC implementation of the aggregated discovery service.
pub struct AdsServer {
    registry: Arc<StreamRegistry>,
    cache: Arc<SnapshotCache>,
    session_config: SessionConfig,
}

impl AdsServer {
    pub fn new(registry: Arc<StreamRegistry>, cache: Arc<SnapshotCache>) -> Self {
        Self {
            registry,
            cache,
            session_config: SessionConfig::default(),
        }
    }

    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Get the tonic service for mounting on a gRPC server.
    pub fn into_service(self) -> AggregatedDiscoveryServer<Self> {
        AggregatedDiscoveryServer::new(self)
    }
}

#[tonic::async_trait]
impl AggregatedDiscovery for AdsServer {
    type StreamAggregatedResourcesStream =
        ReceiverStream<Result<proto::DiscoveryResponse, Status>>;

    async fn stream_aggregated_resources(
        &self,
        request: Request<Streaming<proto::DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        let inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(16);

        let registry = self.registry.clone();
        let cache = self.cache.clone();
        let config = self.session_config.clone();

        tokio::spawn(async move {
            if let Err(e) = run_stream(inbound, tx, registry, cache, config).await {
                debug!(error = %e, "stream task ended");
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

type ResponseTx = mpsc::Sender<Result<proto::DiscoveryResponse, Status>>;

/// The single task owning one stream.
async fn run_stream(
    mut inbound: Streaming<proto::DiscoveryRequest>,
    tx: ResponseTx,
    registry: Arc<StreamRegistry>,
    cache: Arc<SnapshotCache>,
    config: SessionConfig,
) -> XdsResult<()> {
    // The first request must present the node identity.
    let first = match inbound.message().await {
        Ok(Some(req)) => req,
        _ => return Err(XdsError::NoRegistration),
    };
    let Some(node) = first.node.clone() else {
        return Err(XdsError::NoRegistration);
    };

    let locality = node
        .locality
        .map(|l| Locality {
            region: l.region,
            zone: l.zone,
        })
        .unwrap_or_default();
    let instance = registry.register(&node.id, &node.cluster, &node.id, locality);

    let mut session = Session::new(&instance.id, &instance.entity_id, config.clone());
    session.authenticate();
    info!(instance = %instance.id, entity = %instance.entity_id, "stream opened");

    let mut snap_rx = cache.watch(&instance.id);
    handle_request(&mut session, &first, &registry, &cache, &tx).await?;

    let tick = (config.stale_after / 4).max(Duration::from_millis(100));
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            msg = inbound.message() => match msg {
                Ok(Some(req)) => {
                    handle_request(&mut session, &req, &registry, &cache, &tx).await?;
                }
                Ok(None) => {
                    debug!(instance = %instance.id, "client closed stream");
                    break;
                }
                Err(status) => {
                    debug!(instance = %instance.id, error = %status, "stream error");
                    break;
                }
            },
            changed = snap_rx.changed() => {
                if changed.is_err() {
                    // Cache slot dropped; nothing more will arrive.
                    continue;
                }
                let snapshot = snap_rx.borrow_and_update().clone();
                if let Some(snapshot) = snapshot {
                    send_responses(&mut session, &snapshot, &tx).await?;
                }
            }
            _ = ticker.tick() => {
                if session.tick(Instant::now()) == SessionState::Disconnected {
                    warn!(instance = %instance.id, "stream torn down for inactivity");
                    break;
                }
            }
        }
    }

    registry.mark_disconnected(session.instance_id());
    Ok(())
}

async fn handle_request(
    session: &mut Session,
    req: &proto::DiscoveryRequest,
    registry: &StreamRegistry,
    cache: &SnapshotCache,
    tx: &ResponseTx,
) -> XdsResult<()> {
    registry.touch(session.instance_id());

    match session.on_request(req) {
        Disposition::Subscribed(rt) => {
            debug!(
                instance = %session.instance_id(),
                type_url = rt.type_url(),
                "subscription"
            );
            if let Some(snapshot) = cache.get(session.instance_id()) {
                send_responses(session, &snapshot, tx).await?;
            }
        }
        Disposition::Acked { complete } => {
            if let Some(source_hash) = complete {
                registry.record_ack(session.instance_id(), &source_hash);
            }
        }
        Disposition::Nacked {
            source_hash,
            detail,
        } => {
            registry.record_nack(
                session.instance_id(),
                source_hash.as_deref().unwrap_or_default(),
                &detail,
            );
        }
        Disposition::Ignored => {}
    }
    Ok(())
}

async fn send_responses(
    session: &mut Session,
    snapshot: &Snapshot,
    tx: &ResponseTx,
) -> XdsResult<()> {
    for response in session.build_responses(snapshot) {
        if tx.send(Ok(response)).await.is_err() {
            return Err(XdsError::StreamClosed);
        }
    }
    Ok(())
}
