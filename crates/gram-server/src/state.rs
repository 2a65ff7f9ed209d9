//! Shared application state

use std::sync::Arc;

use gram_core::blob::{BlobStore, FsBlobStore};
use gram_core::deployments::DeploymentService;
use gram_core::processor::ProcessDeployment;
use gram_core::store::{Database, MemoryDatabase};
use gram_core::workflow::{LocalWorkflowRunner, RetryPolicy, WorkflowRunner};

use crate::auth::{Authenticator, StaticKeyAuthenticator};
use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub deployments: DeploymentService,
    pub authenticator: Arc<dyn Authenticator>,
    pub version: String,
}

impl AppState {
    /// Wire the service over explicit storage and auth seams.
    pub fn new(
        db: Arc<dyn Database>,
        blobs: Arc<dyn BlobStore>,
        authenticator: Arc<dyn Authenticator>,
        policy: RetryPolicy,
    ) -> Self {
        let processor = ProcessDeployment::new(db.clone(), blobs);
        let workflows: Arc<dyn WorkflowRunner> =
            Arc::new(LocalWorkflowRunner::with_policy(processor, policy));

        Self {
            deployments: DeploymentService::new(db, workflows),
            authenticator,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// In-memory store, filesystem blobs and static keys from `config`.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            Arc::new(MemoryDatabase::new()),
            Arc::new(FsBlobStore::new(config.storage.blob_root.clone())),
            Arc::new(StaticKeyAuthenticator::new(&config.auth.keys)),
            config.workflow.retry_policy(),
        )
    }
}
