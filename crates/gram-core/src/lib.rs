//! Gram Core Library
//!
//! Domain logic for the deployment engine: turning OpenAPI documents and
//! functions archives into per-deployment tool inventories, with idempotent
//! creation, clone-based evolution and an append-only status log.

pub mod blob;
pub mod config;
pub mod deployments;
pub mod error;
pub mod functions;
pub mod naming;
pub mod openapi;
pub mod packages;
pub mod pagination;
pub mod processor;
pub mod store;
pub mod types;
pub mod validation;
pub mod workflow;

/// Re-exports of commonly used types
pub mod prelude {
    // Errors
    pub use crate::error::{ErrorKind, ServiceError};

    // Domain
    pub use crate::types::{AuthContext, DeploymentStatus, EventKind};

    // Deployments
    pub use crate::deployments::{
        CreateDeploymentForm, Deployment, DeploymentLogs, DeploymentPage, DeploymentService,
        EvolveForm, FunctionsForm, OpenApiAssetForm, PackageForm, RedeployForm,
    };

    // Storage
    pub use crate::blob::{BlobKey, BlobStore, FsBlobStore, MemoryBlobStore};
    pub use crate::store::{Database, MemoryDatabase, Transaction};

    // Processing
    pub use crate::processor::ProcessDeployment;
    pub use crate::workflow::{LocalWorkflowRunner, RetryPolicy, WorkflowRunner};

    // Config
    pub use crate::config::DeploymentConfig;
}
