//! Row types persisted by the deployment store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::packages::Semver;
use crate::types::{ConfirmMode, DeploymentStatus, EventKind};

/// Source-control and external system references carried by a deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_pr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRecord {
    pub id: Uuid,
    /// Store-assigned insertion order, used for "latest" and pagination.
    pub seq: i64,
    pub project_id: Uuid,
    pub organization_id: String,
    pub user_id: String,
    pub idempotency_key: String,
    pub cloned_from: Option<Uuid>,
    pub metadata: DeploymentMetadata,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDeployment {
    pub project_id: Uuid,
    pub organization_id: String,
    pub user_id: String,
    pub idempotency_key: String,
    pub cloned_from: Option<Uuid>,
    pub metadata: DeploymentMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentEvent {
    pub id: Uuid,
    pub seq: i64,
    pub deployment_id: Uuid,
    pub project_id: Uuid,
    pub status: DeploymentStatus,
    pub event: EventKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub deployment_id: Uuid,
    pub project_id: Uuid,
    pub status: DeploymentStatus,
    pub event: EventKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenApiAttachment {
    pub id: Uuid,
    pub deployment_id: Uuid,
    pub asset_id: Uuid,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOpenApiAttachment {
    pub asset_id: Uuid,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionsAttachment {
    pub id: Uuid,
    pub deployment_id: Uuid,
    pub asset_id: Uuid,
    pub name: String,
    pub slug: String,
    pub runtime: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFunctionsAttachment {
    pub asset_id: Uuid,
    pub name: String,
    pub slug: String,
    pub runtime: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageAttachment {
    pub id: Uuid,
    pub deployment_id: Uuid,
    pub package_id: Uuid,
    pub version_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPackageAttachment {
    pub package_id: Uuid,
    pub version_id: Uuid,
}

/// Tool derived from one OpenAPI operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpToolDefinition {
    pub id: Uuid,
    pub deployment_id: Uuid,
    pub project_id: Uuid,
    /// Owning OpenAPI attachment.
    pub openapi_document_id: Uuid,
    pub asset_id: Uuid,
    /// Tool name, at most 60 bytes.
    pub name: String,
    /// `{slug}_{operationId}` before truncation.
    pub untruncated_name: String,
    pub path: String,
    pub method: String,
    pub operation_id: String,
    pub summary: String,
    pub description: String,
    pub tags: Vec<String>,
    pub confirm: ConfirmMode,
    pub confirm_prompt: Option<String>,
    /// Whether an `x-gram` extension shaped this tool.
    pub x_gram: bool,
    /// Values from the operation itself, kept when an extension overrides them.
    pub original_name: Option<String>,
    pub original_summary: Option<String>,
    pub original_description: Option<String>,
    pub schema: Value,
    pub security: Option<Value>,
    pub request_content_type: Option<String>,
    pub server_env_var: String,
    pub default_server_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Security scheme declared under `components.securitySchemes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSecurityScheme {
    pub id: Uuid,
    pub deployment_id: Uuid,
    pub project_id: Uuid,
    pub openapi_document_id: Uuid,
    pub key: String,
    pub scheme_type: String,
    pub name: Option<String>,
    pub in_placement: Option<String>,
    pub scheme: Option<String>,
    pub env_variables: Vec<String>,
    pub oauth_types: Vec<String>,
}

/// Tool declared in a functions archive manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionToolDefinition {
    pub id: Uuid,
    pub deployment_id: Uuid,
    pub project_id: Uuid,
    /// Owning functions attachment.
    pub functions_id: Uuid,
    pub asset_id: Uuid,
    pub name: String,
    pub description: String,
    pub runtime: String,
    pub input_schema: Value,
    pub variables: Value,
    pub meta: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// How processing of one attachment ended; a resumed run skips marked ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentState {
    Processed,
    Failed,
}

/// Resource declared in a functions archive manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResourceDefinition {
    pub id: Uuid,
    pub deployment_id: Uuid,
    pub project_id: Uuid,
    pub functions_id: Uuid,
    pub asset_id: Uuid,
    /// `resources:function:{slug}:{uri}`, see [`crate::naming::resource_urn`].
    pub resource_urn: String,
    pub name: String,
    pub description: String,
    pub uri: String,
    pub title: Option<String>,
    pub mime_type: Option<String>,
    pub runtime: String,
    pub variables: Value,
    pub meta: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: Uuid,
    /// Project that publishes the package.
    pub project_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVersion {
    pub id: Uuid,
    pub package_id: Uuid,
    pub semver: Semver,
    /// Deployment whose tools this version publishes.
    pub deployment_id: Uuid,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
}
