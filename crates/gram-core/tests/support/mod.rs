#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use gram_core::blob::{BlobKey, MemoryBlobStore};
use gram_core::deployments::{
    CreateDeploymentForm, Deployment, DeploymentService, FunctionsForm, OpenApiAssetForm,
};
use gram_core::processor::ProcessDeployment;
use gram_core::store::{
    Database, DeploymentEvent, FunctionResourceDefinition, FunctionToolDefinition,
    FunctionsAttachment, HttpToolDefinition, MemoryDatabase, OpenApiAttachment, Package, PackageAttachment, PackageVersion, Visibility,
};
use gram_core::types::{AuthContext, DeploymentStatus};
use gram_core::workflow::{LocalWorkflowRunner, RetryPolicy};

pub fn fixture(name: &str) -> Vec<u8> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
}

/// Zip archive with a node entrypoint and the given manifest.
pub fn functions_archive(manifest: &Value) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        zip.start_file("functions.js", options).unwrap();
        zip.write_all(b"export default {};\n").unwrap();
        zip.start_file("manifest.json", options).unwrap();
        zip.write_all(manifest.to_string().as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf.into_inner()
}

/// Manifest declaring the four todo tools.
pub fn todo_manifest() -> Value {
    let schema = serde_json::json!({"type": "object", "properties": {}});
    serde_json::json!({
        "version": "0.0.0",
        "tools": [
            {"name": "list_all_todos", "description": "List every todo", "inputSchema": schema},
            {"name": "get_todo", "description": "Fetch one todo", "inputSchema": {
                "type": "object",
                "properties": {"id": {"type": "string"}},
                "required": ["id"]
            }},
            {"name": "create_todo", "description": "Create a todo", "inputSchema": {
                "type": "object",
                "properties": {"title": {"type": "string"}},
                "required": ["title"]
            }},
            {"name": "share_todos", "description": "Share todos by email", "inputSchema": schema,
             "variables": {"SMTP_HOST": {"description": "Outgoing mail host"}}}
        ]
    })
}

pub fn openapi(asset_id: Uuid, name: &str, slug: &str) -> OpenApiAssetForm {
    OpenApiAssetForm {
        asset_id: asset_id.to_string(),
        name: name.to_string(),
        slug: slug.to_string(),
    }
}

pub fn functions(asset_id: Uuid, slug: &str, runtime: &str) -> FunctionsForm {
    FunctionsForm {
        asset_id: asset_id.to_string(),
        name: slug.to_string(),
        slug: slug.to_string(),
        runtime: runtime.to_string(),
    }
}

pub fn create_form(key: &str, openapi: Vec<OpenApiAssetForm>) -> CreateDeploymentForm {
    CreateDeploymentForm {
        idempotency_key: key.to_string(),
        openapiv3_assets: openapi,
        ..CreateDeploymentForm::default()
    }
}

/// Service over in-memory storage for one project.
pub struct Harness {
    pub db: Arc<MemoryDatabase>,
    pub blobs: Arc<MemoryBlobStore>,
    pub service: DeploymentService,
    pub project_id: Uuid,
    pub auth: AuthContext,
}

impl Harness {
    pub fn new() -> Self {
        let db = Arc::new(MemoryDatabase::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let processor = ProcessDeployment::new(db.clone(), blobs.clone());
        let runner = LocalWorkflowRunner::with_policy(
            processor,
            RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(5),
                backoff_coefficient: 2.0,
            },
        );
        let service = DeploymentService::new(db.clone(), Arc::new(runner));
        let project_id = Uuid::new_v4();

        Self {
            db,
            blobs,
            service,
            project_id,
            auth: AuthContext::new("user-1", "org-1").with_project(project_id),
        }
    }

    pub async fn upload(&self, bytes: Vec<u8>) -> Uuid {
        let asset_id = Uuid::new_v4();
        self.blobs
            .put(BlobKey::new(self.project_id, asset_id), bytes)
            .await;
        asset_id
    }

    pub async fn upload_fixture(&self, name: &str) -> Uuid {
        self.upload(fixture(name)).await
    }

    /// Publish a package owned by `owner` whose versions point at `deployment_id`.
    pub async fn publish_package(
        &self,
        owner: Uuid,
        name: &str,
        versions: &[&str],
        deployment_id: Uuid,
    ) -> Uuid {
        let mut tx = self.db.begin().await.unwrap();
        let package_id = Uuid::new_v4();
        tx.insert_package(Package {
            id: package_id,
            project_id: owner,
            name: name.to_string(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
        for version in versions {
            tx.insert_package_version(PackageVersion {
                id: Uuid::new_v4(),
                package_id,
                semver: version.parse().unwrap(),
                deployment_id,
                visibility: Visibility::Public,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();
        package_id
    }

    pub async fn wait_for_terminal(&self, deployment_id: Uuid) -> Deployment {
        for _ in 0..200 {
            let deployment = self
                .service
                .get_deployment(&self.auth, &deployment_id.to_string())
                .await
                .unwrap();
            if deployment.status.is_terminal() {
                return deployment;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("deployment {deployment_id} did not finish");
    }

    pub async fn http_tools(&self, deployment_id: Uuid) -> Vec<HttpToolDefinition> {
        let tx = self.db.begin().await.unwrap();
        tx.list_http_tools(deployment_id).await.unwrap()
    }

    pub async fn http_tool_names(&self, deployment_id: Uuid) -> Vec<String> {
        self.http_tools(deployment_id)
            .await
            .into_iter()
            .map(|t| t.name)
            .collect()
    }

    pub async fn function_tools(&self, deployment_id: Uuid) -> Vec<FunctionToolDefinition> {
        let tx = self.db.begin().await.unwrap();
        tx.list_function_tools(deployment_id).await.unwrap()
    }

    pub async fn function_resources(&self, deployment_id: Uuid) -> Vec<FunctionResourceDefinition> {
        let tx = self.db.begin().await.unwrap();
        tx.list_function_resources(deployment_id).await.unwrap()
    }

    pub async fn events(&self, deployment_id: Uuid) -> Vec<DeploymentEvent> {
        let tx = self.db.begin().await.unwrap();
        tx.list_events(deployment_id, None, usize::MAX).await.unwrap()
    }

    pub async fn snapshot(&self, deployment_id: Uuid) -> Snapshot {
        let tx = self.db.begin().await.unwrap();
        Snapshot {
            openapi: tx.list_openapi_attachments(deployment_id).await.unwrap(),
            functions: tx.list_functions_attachments(deployment_id).await.unwrap(),
            packages: tx.list_package_attachments(deployment_id).await.unwrap(),
            events: tx.list_events(deployment_id, None, usize::MAX).await.unwrap(),
            http_tools: tx.list_http_tools(deployment_id).await.unwrap(),
            function_tools: tx.list_function_tools(deployment_id).await.unwrap(),
            function_resources: tx.list_function_resources(deployment_id).await.unwrap(),
        }
    }
}

/// Every row owned by one deployment.
#[derive(Debug, PartialEq)]
pub struct Snapshot {
    pub openapi: Vec<OpenApiAttachment>,
    pub functions: Vec<FunctionsAttachment>,
    pub packages: Vec<PackageAttachment>,
    pub events: Vec<DeploymentEvent>,
    pub http_tools: Vec<HttpToolDefinition>,
    pub function_tools: Vec<FunctionToolDefinition>,
    pub function_resources: Vec<FunctionResourceDefinition>,
}

/// Statuses must follow `created, pending, completed|failed` and never
/// change after a terminal one.
pub fn assert_status_monotonic(events: &[DeploymentEvent]) {
    let mut transitions = Vec::new();
    let mut terminal: Option<DeploymentStatus> = None;
    for event in events {
        if let Some(status) = terminal {
            assert_eq!(event.status, status, "status changed after {status}");
        }
        if let Some(status) = event.event.transition() {
            transitions.push(status);
        }
        if event.status.is_terminal() {
            terminal = Some(event.status);
        }
    }

    let expected_prefix = [DeploymentStatus::Created, DeploymentStatus::Pending];
    assert!(transitions.len() <= 3, "too many transitions: {transitions:?}");
    for (i, status) in transitions.iter().enumerate() {
        if i < 2 {
            assert_eq!(*status, expected_prefix[i]);
        } else {
            assert!(status.is_terminal());
        }
    }
}
