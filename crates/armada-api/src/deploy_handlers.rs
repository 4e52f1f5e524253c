//! Handlers for starting, inspecting, and cancelling deployments.

use std::sync::{Arc, RwLock};

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tokio::sync::watch;
use tracing::{error, info};

use armada_rollout::{DeployStrategy, DeploymentPlan, TargetSelector};

use crate::{ApiResponse, ApiState, PlanSlot, api_error};

#[derive(serde::Deserialize)]
pub struct DeployRequest {
    pub sequence: u64,
    #[serde(default)]
    pub strategy: DeployStrategy,
    /// Explicit instance targets; defaults to every connected instance
    /// backing the entity.
    #[serde(default)]
    pub targets: Option<Vec<String>>,
}

#[derive(serde::Deserialize)]
pub struct RollbackRequest {
    pub sequence: u64,
}

/// Serializable plan snapshot for API responses.
#[derive(serde::Serialize)]
pub struct PlanView {
    pub id: String,
    pub entity_id: String,
    pub status: armada_rollout::PlanStatus,
    pub target_sequence: u64,
    pub waves: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<armada_rollout::FailureReport>,
}

impl From<&DeploymentPlan> for PlanView {
    fn from(plan: &DeploymentPlan) -> Self {
        Self {
            id: plan.id.clone(),
            entity_id: plan.entity_id.clone(),
            status: plan.status,
            target_sequence: plan.target_sequence,
            waves: plan.waves.len(),
            failure: plan.failure.clone(),
        }
    }
}

fn has_active_plan(state: &ApiState, entity: &str) -> bool {
    let plans = state.plans.read().expect("plan store lock");
    plans.values().any(|slot| {
        let plan = slot.plan.read().expect("plan lock");
        plan.entity_id == entity && !plan.status.is_terminal()
    })
}

fn launch(state: &ApiState, plan: DeploymentPlan) -> PlanView {
    let view = PlanView::from(&plan);
    let plan_id = plan.id.clone();

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let slot = Arc::new(PlanSlot {
        plan: Arc::new(RwLock::new(plan)),
        cancel: cancel_tx,
    });

    {
        let mut plans = state.plans.write().expect("plan store lock");
        plans.insert(plan_id.clone(), slot.clone());
    }

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        // Execute on a local copy; the slot sees the terminal state.
        // Status queries meanwhile report the plan as non-terminal.
        let mut plan = slot.plan.read().expect("plan lock").clone();
        let result = orchestrator.execute(&mut plan, cancel_rx).await;
        if let Err(e) = &result {
            error!(plan = %plan.id, error = %e, "deployment execution error");
        }
        *slot.plan.write().expect("plan lock") = plan;
    });

    view
}

/// POST /api/v1/entities/{entity}/deploy
pub async fn start_deployment(
    State(state): State<ApiState>,
    Path(entity): Path<String>,
    Json(req): Json<DeployRequest>,
) -> impl IntoResponse {
    if has_active_plan(&state, &entity) {
        return api_error("deployment already in progress", StatusCode::CONFLICT);
    }

    let selector = match req.targets {
        Some(list) => TargetSelector::Instances(list),
        None => TargetSelector::Entity,
    };

    match state
        .orchestrator
        .plan(&entity, req.sequence, req.strategy, selector)
    {
        Ok(plan) => {
            info!(entity = %entity, plan = %plan.id, "deployment requested");
            (StatusCode::CREATED, ApiResponse::ok(launch(&state, plan))).into_response()
        }
        Err(e) => api_error(&e.to_string(), StatusCode::BAD_REQUEST),
    }
}

/// POST /api/v1/entities/{entity}/rollback
///
/// An operator-initiated rollback is a deployment of the chosen version
/// to the whole fleet at once.
pub async fn start_rollback(
    State(state): State<ApiState>,
    Path(entity): Path<String>,
    Json(req): Json<RollbackRequest>,
) -> impl IntoResponse {
    if has_active_plan(&state, &entity) {
        return api_error("deployment already in progress", StatusCode::CONFLICT);
    }

    match state.orchestrator.plan(
        &entity,
        req.sequence,
        DeployStrategy::AllAtOnce,
        TargetSelector::Entity,
    ) {
        Ok(plan) => {
            info!(entity = %entity, sequence = req.sequence, "rollback requested");
            (StatusCode::CREATED, ApiResponse::ok(launch(&state, plan))).into_response()
        }
        Err(e) => api_error(&e.to_string(), StatusCode::BAD_REQUEST),
    }
}

/// GET /api/v1/deployments
pub async fn list_deployments(State(state): State<ApiState>) -> impl IntoResponse {
    let plans = state.plans.read().expect("plan store lock");
    let mut views: Vec<PlanView> = plans
        .values()
        .map(|slot| PlanView::from(&*slot.plan.read().expect("plan lock")))
        .collect();
    views.sort_by(|a, b| a.id.cmp(&b.id));
    ApiResponse::ok(views).into_response()
}

/// GET /api/v1/deployments/{plan}
pub async fn get_deployment(
    State(state): State<ApiState>,
    Path(plan_id): Path<String>,
) -> impl IntoResponse {
    let plans = state.plans.read().expect("plan store lock");
    match plans.get(&plan_id) {
        Some(slot) => {
            let plan = slot.plan.read().expect("plan lock");
            ApiResponse::ok(PlanView::from(&*plan)).into_response()
        }
        None => api_error("deployment not found", StatusCode::NOT_FOUND),
    }
}

/// POST /api/v1/deployments/{plan}/cancel
///
/// Takes effect at the next wave boundary; a rollback already in
/// progress runs to completion.
pub async fn cancel_deployment(
    State(state): State<ApiState>,
    Path(plan_id): Path<String>,
) -> impl IntoResponse {
    let plans = state.plans.read().expect("plan store lock");
    match plans.get(&plan_id) {
        Some(slot) => {
            let _ = slot.cancel.send(true);
            info!(plan = %plan_id, "cancellation requested");
            ApiResponse::ok(PlanView::from(&*slot.plan.read().expect("plan lock")))
                .into_response()
        }
        None => api_error("deployment not found", StatusCode::NOT_FOUND),
    }
}
