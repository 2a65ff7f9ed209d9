//! Read projections of deployments returned to API clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::store::{DeploymentEvent, DeploymentMetadata, DeploymentRecord, Transaction};
use crate::types::DeploymentStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentOpenApiAsset {
    pub id: Uuid,
    pub asset_id: Uuid,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentFunctions {
    pub id: Uuid,
    pub asset_id: Uuid,
    pub name: String,
    pub slug: String,
    pub runtime: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPackage {
    pub id: Uuid,
    pub package_id: Uuid,
    pub name: String,
    pub version: String,
}

/// Full view of one deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub organization_id: String,
    pub project_id: Uuid,
    pub user_id: String,
    pub idempotency_key: String,
    pub cloned_from: Option<Uuid>,
    pub status: DeploymentStatus,
    #[serde(flatten)]
    pub metadata: DeploymentMetadata,
    pub openapiv3_assets: Vec<DeploymentOpenApiAsset>,
    pub functions_assets: Vec<DeploymentFunctions>,
    pub packages: Vec<DeploymentPackage>,
    pub openapiv3_tool_count: usize,
    pub functions_tool_count: usize,
}

/// List entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSummary {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub user_id: String,
    pub status: DeploymentStatus,
    pub openapiv3_asset_count: usize,
    pub openapiv3_tool_count: usize,
    pub functions_asset_count: usize,
    pub functions_tool_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPage {
    pub items: Vec<DeploymentSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentLogs {
    pub status: DeploymentStatus,
    pub events: Vec<DeploymentEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

pub(crate) async fn status_of(
    tx: &dyn Transaction,
    deployment_id: Uuid,
) -> Result<DeploymentStatus, ServiceError> {
    tx.latest_event(deployment_id)
        .await?
        .map(|event| event.status)
        .ok_or_else(|| ServiceError::invariant(format!("deployment {deployment_id} has no events")))
}

pub(crate) async fn deployment_view(
    tx: &dyn Transaction,
    record: DeploymentRecord,
) -> Result<Deployment, ServiceError> {
    let status = status_of(tx, record.id).await?;

    let openapiv3_assets = tx
        .list_openapi_attachments(record.id)
        .await?
        .into_iter()
        .map(|a| DeploymentOpenApiAsset {
            id: a.id,
            asset_id: a.asset_id,
            name: a.name,
            slug: a.slug,
        })
        .collect();

    let functions_assets = tx
        .list_functions_attachments(record.id)
        .await?
        .into_iter()
        .map(|a| DeploymentFunctions {
            id: a.id,
            asset_id: a.asset_id,
            name: a.name,
            slug: a.slug,
            runtime: a.runtime,
        })
        .collect();

    let mut packages = Vec::new();
    for attachment in tx.list_package_attachments(record.id).await? {
        let package = tx.get_package(attachment.package_id).await?.ok_or_else(|| {
            ServiceError::invariant(format!("package {} is missing", attachment.package_id))
        })?;
        let version = tx
            .get_package_version(attachment.version_id)
            .await?
            .ok_or_else(|| {
                ServiceError::invariant(format!(
                    "package version {} is missing",
                    attachment.version_id
                ))
            })?;
        packages.push(DeploymentPackage {
            id: attachment.id,
            package_id: package.id,
            name: package.name,
            version: version.semver.to_string(),
        });
    }

    Ok(Deployment {
        openapiv3_tool_count: tx.count_http_tools(record.id, None).await?,
        functions_tool_count: tx.count_function_tools(record.id, None).await?,
        id: record.id,
        created_at: record.created_at,
        organization_id: record.organization_id,
        project_id: record.project_id,
        user_id: record.user_id,
        idempotency_key: record.idempotency_key,
        cloned_from: record.cloned_from,
        status,
        metadata: record.metadata,
        openapiv3_assets,
        functions_assets,
        packages,
    })
}

pub(crate) async fn deployment_summary(
    tx: &dyn Transaction,
    record: &DeploymentRecord,
) -> Result<DeploymentSummary, ServiceError> {
    Ok(DeploymentSummary {
        id: record.id,
        created_at: record.created_at,
        user_id: record.user_id.clone(),
        status: status_of(tx, record.id).await?,
        openapiv3_asset_count: tx.list_openapi_attachments(record.id).await?.len(),
        openapiv3_tool_count: tx.count_http_tools(record.id, None).await?,
        functions_asset_count: tx.list_functions_attachments(record.id).await?.len(),
        functions_tool_count: tx.count_function_tools(record.id, None).await?,
    })
}
