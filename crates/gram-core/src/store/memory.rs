//! In-memory store for development and testing
//!
//! Transactions are serialized: `begin` takes an owned lock on the tables
//! and works on a copy that replaces the shared state on commit.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::*;
use crate::types::DeploymentStatus;

#[derive(Debug, Clone, Default)]
struct Tables {
    deployments: Vec<DeploymentRecord>,
    events: Vec<DeploymentEvent>,
    openapi_attachments: Vec<OpenApiAttachment>,
    functions_attachments: Vec<FunctionsAttachment>,
    package_attachments: Vec<PackageAttachment>,
    attachment_states: HashMap<(Uuid, Uuid), AttachmentState>,
    http_tools: Vec<HttpToolDefinition>,
    http_security: Vec<HttpSecurityScheme>,
    function_tools: Vec<FunctionToolDefinition>,
    function_resources: Vec<FunctionResourceDefinition>,
    packages: Vec<Package>,
    package_versions: Vec<PackageVersion>,
    last_seq: i64,
}

impl Tables {
    fn next_seq(&mut self) -> i64 {
        self.last_seq += 1;
        self.last_seq
    }

    fn deployment_exists(&self, deployment_id: Uuid) -> bool {
        self.deployments.iter().any(|d| d.id == deployment_id)
    }

    fn require_deployment(&self, deployment_id: Uuid) -> StoreResult<()> {
        if self.deployment_exists(deployment_id) {
            Ok(())
        } else {
            Err(StoreError::ForeignKeyViolation(format!(
                "deployment {deployment_id} does not exist"
            )))
        }
    }

    fn current_status(&self, deployment_id: Uuid) -> Option<DeploymentStatus> {
        self.events
            .iter()
            .filter(|e| e.deployment_id == deployment_id)
            .max_by_key(|e| e.seq)
            .map(|e| e.status)
    }

    fn project_deployments_desc(&self, project_id: Uuid) -> Vec<&DeploymentRecord> {
        let mut rows: Vec<&DeploymentRecord> = self
            .deployments
            .iter()
            .filter(|d| d.project_id == project_id)
            .collect();
        rows.sort_by(|a, b| b.seq.cmp(&a.seq));
        rows
    }
}

/// In-memory [`Database`]
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl DeploymentQueries for MemoryTransaction {
    async fn insert_deployment(
        &mut self,
        deployment: NewDeployment,
    ) -> StoreResult<Option<DeploymentRecord>> {
        let conflict = self.working.deployments.iter().any(|d| {
            d.project_id == deployment.project_id
                && d.idempotency_key == deployment.idempotency_key
        });
        if conflict {
            return Ok(None);
        }

        let record = DeploymentRecord {
            id: Uuid::new_v4(),
            seq: self.working.next_seq(),
            project_id: deployment.project_id,
            organization_id: deployment.organization_id,
            user_id: deployment.user_id,
            idempotency_key: deployment.idempotency_key,
            cloned_from: deployment.cloned_from,
            metadata: deployment.metadata,
            created_at: Utc::now(),
        };
        self.working.deployments.push(record.clone());
        Ok(Some(record))
    }

    async fn find_deployment_by_idempotency_key(
        &self,
        project_id: Uuid,
        idempotency_key: &str,
    ) -> StoreResult<Option<DeploymentRecord>> {
        Ok(self
            .working
            .deployments
            .iter()
            .find(|d| d.project_id == project_id && d.idempotency_key == idempotency_key)
            .cloned())
    }

    async fn get_deployment(
        &self,
        project_id: Uuid,
        deployment_id: Uuid,
    ) -> StoreResult<Option<DeploymentRecord>> {
        Ok(self
            .working
            .deployments
            .iter()
            .find(|d| d.project_id == project_id && d.id == deployment_id)
            .cloned())
    }

    async fn latest_deployment(&self, project_id: Uuid) -> StoreResult<Option<DeploymentRecord>> {
        Ok(self
            .working
            .project_deployments_desc(project_id)
            .first()
            .map(|d| (*d).clone()))
    }

    async fn active_deployment(&self, project_id: Uuid) -> StoreResult<Option<DeploymentRecord>> {
        Ok(self
            .working
            .project_deployments_desc(project_id)
            .into_iter()
            .find(|d| self.working.current_status(d.id) == Some(DeploymentStatus::Completed))
            .cloned())
    }

    async fn list_deployments(
        &self,
        project_id: Uuid,
        max_seq: Option<i64>,
        limit: usize,
    ) -> StoreResult<Vec<DeploymentRecord>> {
        Ok(self
            .working
            .project_deployments_desc(project_id)
            .into_iter()
            .filter(|d| max_seq.is_none_or(|max| d.seq <= max))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EventQueries for MemoryTransaction {
    async fn append_event(&mut self, event: NewEvent) -> StoreResult<DeploymentEvent> {
        self.working.require_deployment(event.deployment_id)?;
        let row = DeploymentEvent {
            id: Uuid::new_v4(),
            seq: self.working.next_seq(),
            deployment_id: event.deployment_id,
            project_id: event.project_id,
            status: event.status,
            event: event.event,
            message: event.message,
            created_at: Utc::now(),
        };
        self.working.events.push(row.clone());
        Ok(row)
    }

    async fn latest_event(&self, deployment_id: Uuid) -> StoreResult<Option<DeploymentEvent>> {
        Ok(self
            .working
            .events
            .iter()
            .filter(|e| e.deployment_id == deployment_id)
            .max_by_key(|e| e.seq)
            .cloned())
    }

    async fn list_events(
        &self,
        deployment_id: Uuid,
        min_seq: Option<i64>,
        limit: usize,
    ) -> StoreResult<Vec<DeploymentEvent>> {
        let mut rows: Vec<DeploymentEvent> = self
            .working
            .events
            .iter()
            .filter(|e| e.deployment_id == deployment_id)
            .filter(|e| min_seq.is_none_or(|min| e.seq >= min))
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.seq);
        rows.truncate(limit);
        Ok(rows)
    }
}

#[async_trait]
impl AttachmentQueries for MemoryTransaction {
    async fn insert_openapi_attachment(
        &mut self,
        deployment_id: Uuid,
        attachment: NewOpenApiAttachment,
    ) -> StoreResult<OpenApiAttachment> {
        self.working.require_deployment(deployment_id)?;
        let duplicate = self
            .working
            .openapi_attachments
            .iter()
            .any(|a| a.deployment_id == deployment_id && a.slug == attachment.slug);
        if duplicate {
            return Err(StoreError::UniqueViolation(format!(
                "openapi document slug {:?} already attached to deployment {deployment_id}",
                attachment.slug
            )));
        }

        let row = OpenApiAttachment {
            id: Uuid::new_v4(),
            deployment_id,
            asset_id: attachment.asset_id,
            name: attachment.name,
            slug: attachment.slug,
        };
        self.working.openapi_attachments.push(row.clone());
        Ok(row)
    }

    async fn list_openapi_attachments(
        &self,
        deployment_id: Uuid,
    ) -> StoreResult<Vec<OpenApiAttachment>> {
        Ok(self
            .working
            .openapi_attachments
            .iter()
            .filter(|a| a.deployment_id == deployment_id)
            .cloned()
            .collect())
    }

    async fn insert_functions_attachment(
        &mut self,
        deployment_id: Uuid,
        attachment: NewFunctionsAttachment,
    ) -> StoreResult<FunctionsAttachment> {
        self.working.require_deployment(deployment_id)?;
        let duplicate = self
            .working
            .functions_attachments
            .iter()
            .any(|a| a.deployment_id == deployment_id && a.slug == attachment.slug);
        if duplicate {
            return Err(StoreError::UniqueViolation(format!(
                "functions slug {:?} already attached to deployment {deployment_id}",
                attachment.slug
            )));
        }

        let row = FunctionsAttachment {
            id: Uuid::new_v4(),
            deployment_id,
            asset_id: attachment.asset_id,
            name: attachment.name,
            slug: attachment.slug,
            runtime: attachment.runtime,
        };
        self.working.functions_attachments.push(row.clone());
        Ok(row)
    }

    async fn list_functions_attachments(
        &self,
        deployment_id: Uuid,
    ) -> StoreResult<Vec<FunctionsAttachment>> {
        Ok(self
            .working
            .functions_attachments
            .iter()
            .filter(|a| a.deployment_id == deployment_id)
            .cloned()
            .collect())
    }

    async fn insert_package_attachment(
        &mut self,
        deployment_id: Uuid,
        attachment: NewPackageAttachment,
    ) -> StoreResult<PackageAttachment> {
        self.working.require_deployment(deployment_id)?;
        let duplicate = self
            .working
            .package_attachments
            .iter()
            .any(|a| a.deployment_id == deployment_id && a.package_id == attachment.package_id);
        if duplicate {
            return Err(StoreError::UniqueViolation(format!(
                "package {} already attached to deployment {deployment_id}",
                attachment.package_id
            )));
        }

        let row = PackageAttachment {
            id: Uuid::new_v4(),
            deployment_id,
            package_id: attachment.package_id,
            version_id: attachment.version_id,
        };
        self.working.package_attachments.push(row.clone());
        Ok(row)
    }

    async fn list_package_attachments(
        &self,
        deployment_id: Uuid,
    ) -> StoreResult<Vec<PackageAttachment>> {
        Ok(self
            .working
            .package_attachments
            .iter()
            .filter(|a| a.deployment_id == deployment_id)
            .cloned()
            .collect())
    }

    async fn set_attachment_state(
        &mut self,
        deployment_id: Uuid,
        attachment_id: Uuid,
        state: AttachmentState,
    ) -> StoreResult<()> {
        self.working.require_deployment(deployment_id)?;
        self.working
            .attachment_states
            .insert((deployment_id, attachment_id), state);
        Ok(())
    }

    async fn attachment_state(
        &self,
        deployment_id: Uuid,
        attachment_id: Uuid,
    ) -> StoreResult<Option<AttachmentState>> {
        Ok(self
            .working
            .attachment_states
            .get(&(deployment_id, attachment_id))
            .copied())
    }
}

#[async_trait]
impl ToolQueries for MemoryTransaction {
    async fn insert_http_tools(&mut self, tools: Vec<HttpToolDefinition>) -> StoreResult<()> {
        for tool in &tools {
            self.working.require_deployment(tool.deployment_id)?;
        }
        self.working.http_tools.extend(tools);
        Ok(())
    }

    async fn insert_http_security(
        &mut self,
        schemes: Vec<HttpSecurityScheme>,
    ) -> StoreResult<()> {
        for scheme in &schemes {
            self.working.require_deployment(scheme.deployment_id)?;
        }
        self.working.http_security.extend(schemes);
        Ok(())
    }

    async fn insert_function_tools(
        &mut self,
        tools: Vec<FunctionToolDefinition>,
    ) -> StoreResult<()> {
        for tool in &tools {
            self.working.require_deployment(tool.deployment_id)?;
        }
        self.working.function_tools.extend(tools);
        Ok(())
    }

    async fn insert_function_resources(
        &mut self,
        resources: Vec<FunctionResourceDefinition>,
    ) -> StoreResult<()> {
        for resource in &resources {
            self.working.require_deployment(resource.deployment_id)?;
            let taken = self.working.function_resources.iter().any(|r| {
                r.deployment_id == resource.deployment_id && r.resource_urn == resource.resource_urn
            });
            if taken {
                return Err(StoreError::UniqueViolation(format!(
                    "resource {} already exists in deployment {}",
                    resource.resource_urn, resource.deployment_id
                )));
            }
        }
        self.working.function_resources.extend(resources);
        Ok(())
    }

    async fn list_http_tools(&self, deployment_id: Uuid) -> StoreResult<Vec<HttpToolDefinition>> {
        Ok(self
            .working
            .http_tools
            .iter()
            .filter(|t| t.deployment_id == deployment_id)
            .cloned()
            .collect())
    }

    async fn list_http_security(
        &self,
        deployment_id: Uuid,
    ) -> StoreResult<Vec<HttpSecurityScheme>> {
        Ok(self
            .working
            .http_security
            .iter()
            .filter(|s| s.deployment_id == deployment_id)
            .cloned()
            .collect())
    }

    async fn list_function_tools(
        &self,
        deployment_id: Uuid,
    ) -> StoreResult<Vec<FunctionToolDefinition>> {
        Ok(self
            .working
            .function_tools
            .iter()
            .filter(|t| t.deployment_id == deployment_id)
            .cloned()
            .collect())
    }

    async fn list_function_resources(
        &self,
        deployment_id: Uuid,
    ) -> StoreResult<Vec<FunctionResourceDefinition>> {
        Ok(self
            .working
            .function_resources
            .iter()
            .filter(|r| r.deployment_id == deployment_id)
            .cloned()
            .collect())
    }

    async fn count_http_tools(
        &self,
        deployment_id: Uuid,
        openapi_document_id: Option<Uuid>,
    ) -> StoreResult<usize> {
        Ok(self
            .working
            .http_tools
            .iter()
            .filter(|t| t.deployment_id == deployment_id)
            .filter(|t| openapi_document_id.is_none_or(|doc| t.openapi_document_id == doc))
            .count())
    }

    async fn count_function_tools(
        &self,
        deployment_id: Uuid,
        functions_id: Option<Uuid>,
    ) -> StoreResult<usize> {
        Ok(self
            .working
            .function_tools
            .iter()
            .filter(|t| t.deployment_id == deployment_id)
            .filter(|t| functions_id.is_none_or(|id| t.functions_id == id))
            .count())
    }
}

#[async_trait]
impl PackageQueries for MemoryTransaction {
    async fn insert_package(&mut self, package: Package) -> StoreResult<()> {
        if self.working.packages.iter().any(|p| p.name == package.name) {
            return Err(StoreError::UniqueViolation(format!(
                "package name {:?} already exists",
                package.name
            )));
        }
        self.working.packages.push(package);
        Ok(())
    }

    async fn insert_package_version(&mut self, version: PackageVersion) -> StoreResult<()> {
        if !self.working.packages.iter().any(|p| p.id == version.package_id) {
            return Err(StoreError::ForeignKeyViolation(format!(
                "package {} does not exist",
                version.package_id
            )));
        }
        let duplicate = self
            .working
            .package_versions
            .iter()
            .any(|v| v.package_id == version.package_id && v.semver == version.semver);
        if duplicate {
            return Err(StoreError::UniqueViolation(format!(
                "version {} of package {} already exists",
                version.semver, version.package_id
            )));
        }
        self.working.package_versions.push(version);
        Ok(())
    }

    async fn find_package_by_name(&self, name: &str) -> StoreResult<Option<Package>> {
        Ok(self
            .working
            .packages
            .iter()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn get_package(&self, package_id: Uuid) -> StoreResult<Option<Package>> {
        Ok(self
            .working
            .packages
            .iter()
            .find(|p| p.id == package_id)
            .cloned())
    }

    async fn get_package_version(&self, version_id: Uuid) -> StoreResult<Option<PackageVersion>> {
        Ok(self
            .working
            .package_versions
            .iter()
            .find(|v| v.id == version_id)
            .cloned())
    }

    async fn list_package_versions(&self, package_id: Uuid) -> StoreResult<Vec<PackageVersion>> {
        Ok(self
            .working
            .package_versions
            .iter()
            .filter(|v| v.package_id == package_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;

    fn new_deployment(project_id: Uuid, key: &str) -> NewDeployment {
        NewDeployment {
            project_id,
            organization_id: "org".to_string(),
            user_id: "user".to_string(),
            idempotency_key: key.to_string(),
            cloned_from: None,
            metadata: DeploymentMetadata::default(),
        }
    }

    #[tokio::test]
    async fn test_idempotency_key_conflict_returns_none() {
        let db = MemoryDatabase::new();
        let project = Uuid::new_v4();

        let mut tx = db.begin().await.unwrap();
        let first = tx.insert_deployment(new_deployment(project, "k")).await.unwrap();
        assert!(first.is_some());
        let second = tx.insert_deployment(new_deployment(project, "k")).await.unwrap();
        assert!(second.is_none());

        // Same key in another project is a different deployment
        let other = tx
            .insert_deployment(new_deployment(Uuid::new_v4(), "k"))
            .await
            .unwrap();
        assert!(other.is_some());
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_is_discarded() {
        let db = MemoryDatabase::new();
        let project = Uuid::new_v4();

        {
            let mut tx = db.begin().await.unwrap();
            tx.insert_deployment(new_deployment(project, "dropped"))
                .await
                .unwrap();
        }

        let tx = db.begin().await.unwrap();
        assert!(tx.latest_deployment(project).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_seq_is_monotonic_across_tables() {
        let db = MemoryDatabase::new();
        let project = Uuid::new_v4();

        let mut tx = db.begin().await.unwrap();
        let d = tx
            .insert_deployment(new_deployment(project, "a"))
            .await
            .unwrap()
            .unwrap();
        let e1 = tx
            .append_event(NewEvent {
                deployment_id: d.id,
                project_id: project,
                status: DeploymentStatus::Created,
                event: EventKind::Created,
                message: "created".into(),
            })
            .await
            .unwrap();
        let e2 = tx
            .append_event(NewEvent {
                deployment_id: d.id,
                project_id: project,
                status: DeploymentStatus::Pending,
                event: EventKind::Pending,
                message: "pending".into(),
            })
            .await
            .unwrap();
        assert!(d.seq < e1.seq && e1.seq < e2.seq);

        let latest = tx.latest_event(d.id).await.unwrap().unwrap();
        assert_eq!(latest.status, DeploymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_duplicate_slug_rejected() {
        let db = MemoryDatabase::new();
        let project = Uuid::new_v4();

        let mut tx = db.begin().await.unwrap();
        let d = tx
            .insert_deployment(new_deployment(project, "a"))
            .await
            .unwrap()
            .unwrap();
        let attachment = NewOpenApiAttachment {
            asset_id: Uuid::new_v4(),
            name: "Doc".into(),
            slug: "doc".into(),
        };
        tx.insert_openapi_attachment(d.id, attachment.clone())
            .await
            .unwrap();
        let err = tx
            .insert_openapi_attachment(
                d.id,
                NewOpenApiAttachment {
                    asset_id: Uuid::new_v4(),
                    ..attachment
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn test_attachment_requires_deployment() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let err = tx
            .insert_package_attachment(
                Uuid::new_v4(),
                NewPackageAttachment {
                    package_id: Uuid::new_v4(),
                    version_id: Uuid::new_v4(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation(_)));
    }

    #[tokio::test]
    async fn test_list_deployments_newest_first_with_bound() {
        let db = MemoryDatabase::new();
        let project = Uuid::new_v4();

        let mut tx = db.begin().await.unwrap();
        let mut seqs = Vec::new();
        for key in ["a", "b", "c", "d"] {
            let d = tx
                .insert_deployment(new_deployment(project, key))
                .await
                .unwrap()
                .unwrap();
            seqs.push(d.seq);
        }

        let all = tx.list_deployments(project, None, 10).await.unwrap();
        let keys: Vec<&str> = all.iter().map(|d| d.idempotency_key.as_str()).collect();
        assert_eq!(keys, vec!["d", "c", "b", "a"]);

        let page = tx.list_deployments(project, Some(seqs[1]), 10).await.unwrap();
        let keys: Vec<&str> = page.iter().map(|d| d.idempotency_key.as_str()).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }
}
