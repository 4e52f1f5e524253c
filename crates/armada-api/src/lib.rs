//! armada-api — REST management surface.
//!
//! Thin axum handlers over the core operations: create and validate
//! configuration versions, start deployments and rollbacks, query
//! deployment and drift status. Handlers marshal arguments and invoke
//! the core; none of them carry logic of their own.

pub mod deploy_handlers;
pub mod handlers;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use tokio::sync::watch;

use armada_drift::DriftDetector;
use armada_rollout::{DeploymentPlan, Orchestrator};
use armada_types::{ConfigStore, ValidationContext};
use armada_xds::StreamRegistry;

/// A running (or finished) deployment held by the API.
pub struct PlanSlot {
    pub plan: Arc<RwLock<DeploymentPlan>>,
    /// Cancellation signal observed at wave boundaries.
    pub cancel: watch::Sender<bool>,
}

/// Deployment plans by plan id.
pub type PlanStore = Arc<RwLock<HashMap<String, Arc<PlanSlot>>>>;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn ConfigStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub registry: Arc<StreamRegistry>,
    pub drift: DriftDetector,
    /// Base validation context maintained by the daemon (known services,
    /// secrets, templates, quota). Handlers stamp the current time in.
    pub validation: Arc<RwLock<ValidationContext>>,
    pub plans: PlanStore,
}

/// Standard response envelope.
#[derive(serde::Serialize)]
pub struct ApiResponse<T: serde::Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> axum::Json<Self> {
        axum::Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub(crate) fn api_error(message: &str, status: StatusCode) -> axum::response::Response {
    (
        status,
        axum::Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(serde_json::Value::String(message.to_string())),
        }),
    )
        .into_response()
}

pub(crate) fn api_error_value(
    error: serde_json::Value,
    status: StatusCode,
) -> axum::response::Response {
    (
        status,
        axum::Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(error),
        }),
    )
        .into_response()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use armada_rollout::OrchestratorConfig;
    use armada_snapshot::resources::Endpoint;
    use armada_snapshot::{SnapshotCache, SnapshotGenerator, StaticResolver};
    use armada_types::{Locality, MemoryStore};
    use armada_xds::RegistryConfig;
    use std::time::Duration;

    /// Full in-process state with a resolvable `backend.prod` service.
    pub fn test_state() -> ApiState {
        let resolver = StaticResolver::new();
        resolver.set_endpoints(
            "backend.prod",
            vec![Endpoint {
                address: "10.0.0.1".to_string(),
                port: 9000,
                weight: 1,
                locality: Locality::default(),
            }],
        );

        let store: Arc<dyn ConfigStore> = Arc::new(MemoryStore::new());
        let generator = Arc::new(SnapshotGenerator::new(Arc::new(resolver)));
        let cache = Arc::new(SnapshotCache::new());
        let registry = Arc::new(StreamRegistry::new(RegistryConfig::default()));

        let orchestrator = Arc::new(
            Orchestrator::new(store.clone(), generator, cache, registry.clone()).with_config(
                OrchestratorConfig {
                    wave_timeout: Duration::from_millis(500),
                    rollback_timeout: Duration::from_millis(500),
                    ..Default::default()
                },
            ),
        );

        let validation = ValidationContext {
            known_services: vec!["backend.prod".to_string()],
            ..Default::default()
        };

        ApiState {
            store,
            orchestrator,
            registry,
            drift: DriftDetector::new(),
            validation: Arc::new(RwLock::new(validation)),
            plans: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

/// Build the management router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/api/v1/entities/{entity}/versions",
            post(handlers::create_version).get(handlers::list_versions),
        )
        .route("/api/v1/entities/{entity}/drift", get(handlers::drift_report))
        .route(
            "/api/v1/entities/{entity}/deploy",
            post(deploy_handlers::start_deployment),
        )
        .route(
            "/api/v1/entities/{entity}/rollback",
            post(deploy_handlers::start_rollback),
        )
        .route("/api/v1/deployments", get(deploy_handlers::list_deployments))
        .route(
            "/api/v1/deployments/{plan}",
            get(deploy_handlers::get_deployment),
        )
        .route(
            "/api/v1/deployments/{plan}/cancel",
            post(deploy_handlers::cancel_deployment),
        )
        .route("/api/v1/instances", get(handlers::list_instances))
        .with_state(state)
}
