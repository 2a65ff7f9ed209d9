//! Deployment handlers

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use gram_core::deployments::{
    CreateDeploymentForm, Deployment, DeploymentLogs, DeploymentPage, EvolveForm, RedeployForm,
};
use serde::{Deserialize, Serialize};

use crate::auth::Authenticated;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CursorQuery {
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Body of the latest/active lookups
#[derive(Debug, Serialize, Deserialize)]
pub struct DeploymentLookup {
    pub deployment: Option<Deployment>,
}

pub async fn create_deployment(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
    payload: Result<Json<CreateDeploymentForm>, JsonRejection>,
) -> ApiResult<Json<Deployment>> {
    let Json(form) = payload?;
    let deployment = state.deployments.create_deployment(&auth, form).await?;
    Ok(Json(deployment))
}

pub async fn evolve_deployment(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
    payload: Result<Json<EvolveForm>, JsonRejection>,
) -> ApiResult<Json<Deployment>> {
    let Json(form) = payload?;
    let deployment = state.deployments.evolve(&auth, form).await?;
    Ok(Json(deployment))
}

pub async fn redeploy_deployment(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
    payload: Result<Json<RedeployForm>, JsonRejection>,
) -> ApiResult<Json<Deployment>> {
    let Json(form) = payload?;
    let deployment = state.deployments.redeploy(&auth, form).await?;
    Ok(Json(deployment))
}

pub async fn get_deployment(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Json<Deployment>> {
    let deployment = state.deployments.get_deployment(&auth, &id).await?;
    Ok(Json(deployment))
}

pub async fn get_latest_deployment(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
) -> ApiResult<Json<DeploymentLookup>> {
    let deployment = state.deployments.get_latest_deployment(&auth).await?;
    Ok(Json(DeploymentLookup { deployment }))
}

pub async fn get_active_deployment(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
) -> ApiResult<Json<DeploymentLookup>> {
    let deployment = state.deployments.get_active_deployment(&auth).await?;
    Ok(Json(DeploymentLookup { deployment }))
}

pub async fn list_deployments(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
    query: Result<Query<CursorQuery>, QueryRejection>,
) -> ApiResult<Json<DeploymentPage>> {
    let Query(query) = query?;
    let page = state
        .deployments
        .list_deployments(&auth, query.cursor.as_deref())
        .await?;
    Ok(Json(page))
}

pub async fn get_deployment_logs(
    State(state): State<AppState>,
    Authenticated(auth): Authenticated,
    Path(id): Path<String>,
    query: Result<Query<CursorQuery>, QueryRejection>,
) -> ApiResult<Json<DeploymentLogs>> {
    let Query(query) = query?;
    let logs = state
        .deployments
        .get_deployment_logs(&auth, &id, query.cursor.as_deref())
        .await?;
    Ok(Json(logs))
}
