//! Durable execution of deployment processing
//!
//! A [`WorkflowRunner`] starts at most one processing execution per
//! deployment start. Starting the same key again joins the execution that
//! is still running instead of launching a second one. Finished executions
//! are forgotten; a later start runs again and finds the deployment already
//! terminal.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::{ErrorKind, ServiceError};
use crate::processor::ProcessDeployment;
use crate::types::DeploymentStatus;

/// Identity of one processing execution
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkflowKey {
    pub project_id: Uuid,
    pub deployment_id: Uuid,
    pub idempotency_key: String,
}

impl WorkflowKey {
    pub fn new(project_id: Uuid, deployment_id: Uuid, idempotency_key: impl Into<String>) -> Self {
        Self {
            project_id,
            deployment_id,
            idempotency_key: idempotency_key.into(),
        }
    }

    /// Stable execution id, shared by every start of the same key.
    pub fn workflow_id(&self) -> String {
        format!(
            "v1:process-deployment:{}:{}:{}",
            self.project_id, self.deployment_id, self.idempotency_key
        )
    }
}

impl fmt::Display for WorkflowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.workflow_id())
    }
}

/// Failure of an execution, shared between every waiter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("workflow {0} ended without a result")]
    Abandoned(String),

    #[error("{message}")]
    Failed { kind: ErrorKind, message: String },
}

impl From<&ServiceError> for WorkflowError {
    fn from(err: &ServiceError) -> Self {
        WorkflowError::Failed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<WorkflowError> for ServiceError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Abandoned(id) => {
                ServiceError::unexpected(format!("workflow {id} ended without a result"))
            }
            WorkflowError::Failed { kind, message } => match kind {
                ErrorKind::Unauthorized => ServiceError::Unauthorized(message),
                ErrorKind::BadRequest => ServiceError::BadRequest(message),
                ErrorKind::Invalid => ServiceError::Invalid(message),
                ErrorKind::Unsupported => ServiceError::Unsupported(message),
                ErrorKind::NotFound => ServiceError::NotFound(message),
                ErrorKind::InvariantViolation => ServiceError::InvariantViolation(message),
                ErrorKind::Unexpected => ServiceError::Unexpected(message),
            },
        }
    }
}

pub type WorkflowResult = Result<DeploymentStatus, WorkflowError>;

/// Waitable reference to a running or finished execution.
///
/// Dropping a handle does not cancel the execution.
#[derive(Debug, Clone)]
pub struct WorkflowHandle {
    id: String,
    result: watch::Receiver<Option<WorkflowResult>>,
}

impl WorkflowHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the execution's terminal result.
    pub async fn wait(mut self) -> WorkflowResult {
        let received = self
            .result
            .wait_for(Option::is_some)
            .await
            .map(|result| (*result).clone());
        received
            .ok()
            .flatten()
            .unwrap_or_else(|| Err(WorkflowError::Abandoned(self.id.clone())))
    }
}

/// Launches deployment processing
#[async_trait]
pub trait WorkflowRunner: Send + Sync {
    async fn start(&self, key: WorkflowKey) -> WorkflowHandle;
}

/// Retry schedule for failed executions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_coefficient: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            backoff_coefficient: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given (1-based) failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        self.initial_backoff
            .mul_f64(self.backoff_coefficient.max(1.0).powi(exponent))
    }
}

/// In-process runner backed by tokio tasks
#[derive(Clone)]
pub struct LocalWorkflowRunner {
    processor: ProcessDeployment,
    policy: RetryPolicy,
    /// Executions still running, keyed by start identity.
    executions: Arc<Mutex<HashMap<WorkflowKey, watch::Receiver<Option<WorkflowResult>>>>>,
}

impl LocalWorkflowRunner {
    pub fn new(processor: ProcessDeployment) -> Self {
        Self::with_policy(processor, RetryPolicy::default())
    }

    pub fn with_policy(processor: ProcessDeployment, policy: RetryPolicy) -> Self {
        Self {
            processor,
            policy,
            executions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl WorkflowRunner for LocalWorkflowRunner {
    async fn start(&self, key: WorkflowKey) -> WorkflowHandle {
        let id = key.workflow_id();
        let mut executions = self.executions.lock().await;
        if let Some(existing) = executions.get(&key) {
            info!(workflow_id = %id, "Joining existing deployment workflow");
            return WorkflowHandle {
                id,
                result: existing.clone(),
            };
        }

        let (tx, rx) = watch::channel(None);
        executions.insert(key.clone(), rx.clone());
        drop(executions);

        let processor = self.processor.clone();
        let policy = self.policy;
        let executions = Arc::clone(&self.executions);
        let span = info_span!("deployment_workflow", workflow_id = %id);
        tokio::spawn(
            async move {
                let result = execute(&processor, &policy, &key).await;
                tx.send_replace(Some(result));
                executions.lock().await.remove(&key);
            }
            .instrument(span),
        );

        WorkflowHandle { id, result: rx }
    }
}

async fn execute(
    processor: &ProcessDeployment,
    policy: &RetryPolicy,
    key: &WorkflowKey,
) -> WorkflowResult {
    let mut attempt = 1;
    loop {
        let err = match processor.run(key.project_id, key.deployment_id).await {
            Ok(status) => return Ok(status),
            Err(err) => err,
        };

        if !err.kind().is_internal() {
            warn!(error = %err, "Deployment workflow failed permanently");
            return Err(WorkflowError::from(&err));
        }

        if attempt >= policy.max_attempts {
            error!(error = %err, attempt, "Deployment workflow exhausted retries");
            let message =
                format!("deployment processing failed after {attempt} attempts: {err}");
            return processor
                .fail(key.project_id, key.deployment_id, &message)
                .await
                .map_err(|e| WorkflowError::from(&e));
        }

        let delay = policy.backoff(attempt);
        warn!(error = %err, attempt, delay_ms = delay.as_millis() as u64, "Retrying deployment workflow");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
