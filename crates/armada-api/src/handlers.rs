//! Handlers for configuration versions, drift, and instances.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::info;

use armada_types::{ConfigSpec, ConfigStore, ValidationState, epoch_secs};

use crate::{ApiResponse, ApiState, api_error, api_error_value};

#[derive(serde::Deserialize)]
pub struct CreateVersionRequest {
    pub spec: ConfigSpec,
}

#[derive(serde::Serialize)]
pub struct VersionCreated {
    pub sequence: u64,
    pub content_hash: String,
}

/// POST /api/v1/entities/{entity}/versions
///
/// Validates the proposed spec; rejected specs never create a version.
pub async fn create_version(
    State(state): State<ApiState>,
    Path(entity): Path<String>,
    Json(req): Json<CreateVersionRequest>,
) -> impl IntoResponse {
    let ctx = {
        let mut ctx = state.validation.read().expect("validation context lock").clone();
        ctx.now = epoch_secs();
        ctx
    };

    if let Err(report) = armada_validate::validate(&req.spec, &ctx) {
        let body = serde_json::to_value(&report)
            .unwrap_or_else(|_| serde_json::Value::String(report.summary()));
        return api_error_value(body, StatusCode::UNPROCESSABLE_ENTITY);
    }

    match state
        .store
        .create_version(&entity, req.spec, ValidationState::Valid)
    {
        Ok(version) => {
            info!(entity = %entity, sequence = version.sequence, "version accepted");
            (
                StatusCode::CREATED,
                ApiResponse::ok(VersionCreated {
                    sequence: version.sequence,
                    content_hash: version.content_hash,
                }),
            )
                .into_response()
        }
        Err(e) => api_error(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// GET /api/v1/entities/{entity}/versions
pub async fn list_versions(
    State(state): State<ApiState>,
    Path(entity): Path<String>,
) -> impl IntoResponse {
    match state.store.list_versions(&entity) {
        Ok(versions) => ApiResponse::ok(versions).into_response(),
        Err(e) => api_error(&e.to_string(), StatusCode::NOT_FOUND),
    }
}

/// GET /api/v1/entities/{entity}/drift
pub async fn drift_report(
    State(state): State<ApiState>,
    Path(entity): Path<String>,
) -> impl IntoResponse {
    let desired = match state.store.desired(&entity) {
        Ok(Some(desired)) => desired,
        Ok(None) => return api_error("entity has no desired version", StatusCode::NOT_FOUND),
        Err(e) => return api_error(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
    };

    let instances = state.registry.instances_for_entity(&entity);
    let report = state.drift.detect(&desired, &instances, epoch_secs());
    ApiResponse::ok(report).into_response()
}

/// GET /api/v1/instances
pub async fn list_instances(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.registry.instances()).into_response()
}
