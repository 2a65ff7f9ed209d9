//! API router

pub mod deployments;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: state.version.clone(),
    })
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/deployments",
            get(deployments::list_deployments).post(deployments::create_deployment),
        )
        .route("/deployments/evolve", post(deployments::evolve_deployment))
        .route("/deployments/redeploy", post(deployments::redeploy_deployment))
        .route("/deployments/latest", get(deployments::get_latest_deployment))
        .route("/deployments/active", get(deployments::get_active_deployment))
        .route("/deployments/:id", get(deployments::get_deployment))
        .route("/deployments/:id/logs", get(deployments::get_deployment_logs))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
