//! Transactional deployment store
//!
//! All reads and writes go through a [`Transaction`] obtained from
//! [`Database::begin`]. Dropping a transaction without committing discards
//! its writes. Insertion order (`seq`) is assigned by the store.

mod memory;
mod models;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryDatabase;
pub use models::*;

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A referenced row does not exist
    #[error("foreign key violated: {0}")]
    ForeignKeyViolation(String),

    /// The backing store cannot serve requests
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Entry point to the store
#[async_trait]
pub trait Database: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>>;
}

/// Combined query surface of an open transaction
#[async_trait]
pub trait Transaction:
    DeploymentQueries + EventQueries + AttachmentQueries + ToolQueries + PackageQueries + Send + Sync
{
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait]
pub trait DeploymentQueries: Send + Sync {
    /// Insert a deployment unless `(project_id, idempotency_key)` already
    /// exists, in which case nothing is written and `None` is returned.
    async fn insert_deployment(
        &mut self,
        deployment: NewDeployment,
    ) -> StoreResult<Option<DeploymentRecord>>;

    async fn find_deployment_by_idempotency_key(
        &self,
        project_id: Uuid,
        idempotency_key: &str,
    ) -> StoreResult<Option<DeploymentRecord>>;

    async fn get_deployment(
        &self,
        project_id: Uuid,
        deployment_id: Uuid,
    ) -> StoreResult<Option<DeploymentRecord>>;

    /// Most recently created deployment regardless of status.
    async fn latest_deployment(&self, project_id: Uuid) -> StoreResult<Option<DeploymentRecord>>;

    /// Most recently created deployment whose current status is `completed`.
    async fn active_deployment(&self, project_id: Uuid) -> StoreResult<Option<DeploymentRecord>>;

    /// Deployments newest first, starting at `max_seq` (inclusive) when given.
    async fn list_deployments(
        &self,
        project_id: Uuid,
        max_seq: Option<i64>,
        limit: usize,
    ) -> StoreResult<Vec<DeploymentRecord>>;
}

#[async_trait]
pub trait EventQueries: Send + Sync {
    async fn append_event(&mut self, event: NewEvent) -> StoreResult<DeploymentEvent>;

    /// Highest-seq event of a deployment; carries its current status.
    async fn latest_event(&self, deployment_id: Uuid) -> StoreResult<Option<DeploymentEvent>>;

    /// Events in ascending seq order, starting at `min_seq` (inclusive).
    async fn list_events(
        &self,
        deployment_id: Uuid,
        min_seq: Option<i64>,
        limit: usize,
    ) -> StoreResult<Vec<DeploymentEvent>>;
}

#[async_trait]
pub trait AttachmentQueries: Send + Sync {
    async fn insert_openapi_attachment(
        &mut self,
        deployment_id: Uuid,
        attachment: NewOpenApiAttachment,
    ) -> StoreResult<OpenApiAttachment>;

    async fn list_openapi_attachments(
        &self,
        deployment_id: Uuid,
    ) -> StoreResult<Vec<OpenApiAttachment>>;

    async fn insert_functions_attachment(
        &mut self,
        deployment_id: Uuid,
        attachment: NewFunctionsAttachment,
    ) -> StoreResult<FunctionsAttachment>;

    async fn list_functions_attachments(
        &self,
        deployment_id: Uuid,
    ) -> StoreResult<Vec<FunctionsAttachment>>;

    async fn insert_package_attachment(
        &mut self,
        deployment_id: Uuid,
        attachment: NewPackageAttachment,
    ) -> StoreResult<PackageAttachment>;

    async fn list_package_attachments(
        &self,
        deployment_id: Uuid,
    ) -> StoreResult<Vec<PackageAttachment>>;

    /// Record how processing of an openapi or functions attachment ended.
    async fn set_attachment_state(
        &mut self,
        deployment_id: Uuid,
        attachment_id: Uuid,
        state: AttachmentState,
    ) -> StoreResult<()>;

    async fn attachment_state(
        &self,
        deployment_id: Uuid,
        attachment_id: Uuid,
    ) -> StoreResult<Option<AttachmentState>>;
}

#[async_trait]
pub trait ToolQueries: Send + Sync {
    async fn insert_http_tools(&mut self, tools: Vec<HttpToolDefinition>) -> StoreResult<()>;

    async fn insert_http_security(&mut self, schemes: Vec<HttpSecurityScheme>)
    -> StoreResult<()>;

    async fn insert_function_tools(&mut self, tools: Vec<FunctionToolDefinition>)
    -> StoreResult<()>;

    async fn insert_function_resources(
        &mut self,
        resources: Vec<FunctionResourceDefinition>,
    ) -> StoreResult<()>;

    async fn list_http_tools(&self, deployment_id: Uuid) -> StoreResult<Vec<HttpToolDefinition>>;

    async fn list_http_security(
        &self,
        deployment_id: Uuid,
    ) -> StoreResult<Vec<HttpSecurityScheme>>;

    async fn list_function_tools(
        &self,
        deployment_id: Uuid,
    ) -> StoreResult<Vec<FunctionToolDefinition>>;

    async fn list_function_resources(
        &self,
        deployment_id: Uuid,
    ) -> StoreResult<Vec<FunctionResourceDefinition>>;

    /// Tool count for a deployment, optionally narrowed to one document.
    async fn count_http_tools(
        &self,
        deployment_id: Uuid,
        openapi_document_id: Option<Uuid>,
    ) -> StoreResult<usize>;

    /// Tool count for a deployment, optionally narrowed to one archive.
    async fn count_function_tools(
        &self,
        deployment_id: Uuid,
        functions_id: Option<Uuid>,
    ) -> StoreResult<usize>;
}

#[async_trait]
pub trait PackageQueries: Send + Sync {
    async fn insert_package(&mut self, package: Package) -> StoreResult<()>;

    async fn insert_package_version(&mut self, version: PackageVersion) -> StoreResult<()>;

    async fn find_package_by_name(&self, name: &str) -> StoreResult<Option<Package>>;

    async fn get_package(&self, package_id: Uuid) -> StoreResult<Option<Package>>;

    async fn get_package_version(&self, version_id: Uuid) -> StoreResult<Option<PackageVersion>>;

    async fn list_package_versions(&self, package_id: Uuid) -> StoreResult<Vec<PackageVersion>>;
}
