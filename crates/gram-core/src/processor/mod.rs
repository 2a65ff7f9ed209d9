//! Deployment processing
//!
//! Turns a `created` deployment into a terminal one by extracting tools from
//! each attached asset. Every step is safe to repeat: each attachment records
//! how it ended in the same transaction as its output, a resumed run skips
//! marked attachments, and a terminal deployment is returned as is.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::blob::{BlobError, BlobKey, BlobStore};
use crate::error::ServiceError;
use crate::functions::{self, FunctionsContext};
use crate::openapi::{self, DocumentContext};
use crate::store::{AttachmentState, Database, DeploymentRecord, NewEvent, Transaction};
use crate::types::{DeploymentStatus, Diagnostic, EventKind};

pub const PENDING_MESSAGE: &str = "Deployment pending";
pub const COMPLETED_MESSAGE: &str = "Deployment completed";

/// Outcome of processing a single attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttachmentOutcome {
    Processed,
    Skipped,
    Fatal,
}

/// Runs tool extraction for one deployment
#[derive(Clone)]
pub struct ProcessDeployment {
    db: Arc<dyn Database>,
    blobs: Arc<dyn BlobStore>,
}

impl ProcessDeployment {
    pub fn new(db: Arc<dyn Database>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { db, blobs }
    }

    /// Process a deployment to a terminal status.
    ///
    /// Store failures and blob I/O failures are returned as errors so the
    /// caller can retry; asset problems are recorded on the deployment log.
    #[instrument(skip_all, fields(%project_id, %deployment_id))]
    pub async fn run(
        &self,
        project_id: Uuid,
        deployment_id: Uuid,
    ) -> Result<DeploymentStatus, ServiceError> {
        let mut tx = self.db.begin().await?;
        let deployment = load_deployment(tx.as_ref(), project_id, deployment_id).await?;
        let status = current_status(tx.as_ref(), deployment_id).await?;
        if status.is_terminal() {
            info!(status = %status, "Deployment already processed");
            return Ok(status);
        }
        if status == DeploymentStatus::Created {
            tx.append_event(NewEvent {
                deployment_id,
                project_id,
                status: DeploymentStatus::Pending,
                event: EventKind::Pending,
                message: PENDING_MESSAGE.to_string(),
            })
            .await?;
            tx.commit().await?;
        } else {
            drop(tx);
        }

        let fatal = self.process_openapi(&deployment).await? + self.process_functions(&deployment).await?;

        let (status, event, message) = if fatal > 0 {
            (
                DeploymentStatus::Failed,
                EventKind::Failed,
                format!(
                    "{fatal} attachment{} failed to process",
                    if fatal == 1 { "" } else { "s" }
                ),
            )
        } else {
            (
                DeploymentStatus::Completed,
                EventKind::Completed,
                COMPLETED_MESSAGE.to_string(),
            )
        };

        let mut tx = self.db.begin().await?;
        let current = current_status(tx.as_ref(), deployment_id).await?;
        if current.is_terminal() {
            return Ok(current);
        }
        tx.append_event(NewEvent {
            deployment_id,
            project_id,
            status,
            event,
            message,
        })
        .await?;
        tx.commit().await?;

        info!(status = %status, fatal_attachments = fatal, "Deployment processed");
        Ok(status)
    }

    /// Mark a deployment failed unless it already reached a terminal status.
    #[instrument(skip_all, fields(%project_id, %deployment_id))]
    pub async fn fail(
        &self,
        project_id: Uuid,
        deployment_id: Uuid,
        message: &str,
    ) -> Result<DeploymentStatus, ServiceError> {
        let mut tx = self.db.begin().await?;
        load_deployment(tx.as_ref(), project_id, deployment_id).await?;
        let current = current_status(tx.as_ref(), deployment_id).await?;
        if current.is_terminal() {
            return Ok(current);
        }

        tx.append_event(NewEvent {
            deployment_id,
            project_id,
            status: DeploymentStatus::Failed,
            event: EventKind::Failed,
            message: message.to_string(),
        })
        .await?;
        tx.commit().await?;

        warn!(reason = %message, "Deployment marked failed");
        Ok(DeploymentStatus::Failed)
    }

    async fn process_openapi(&self, deployment: &DeploymentRecord) -> Result<usize, ServiceError> {
        let attachments = {
            let tx = self.db.begin().await?;
            tx.list_openapi_attachments(deployment.id).await?
        };

        let mut fatal = 0;
        for attachment in attachments {
            let ctx = DocumentContext::for_attachment(deployment.project_id, &attachment);
            let outcome = self.process_document(&ctx).await?;
            if outcome == AttachmentOutcome::Fatal {
                fatal += 1;
            }
        }
        Ok(fatal)
    }

    #[instrument(skip_all, fields(document = %ctx.slug))]
    async fn process_document(&self, ctx: &DocumentContext) -> Result<AttachmentOutcome, ServiceError> {
        if let Some(outcome) = self.resumed(ctx.deployment_id, ctx.document_id).await? {
            return Ok(outcome);
        }

        let Some(bytes) = self.read_asset(ctx.project_id, ctx.asset_id).await? else {
            self.record_fatal(
                ctx.project_id,
                ctx.deployment_id,
                ctx.document_id,
                format!("{}: openapi document asset not found", ctx.name),
            )
            .await?;
            return Ok(AttachmentOutcome::Fatal);
        };

        let extraction = match openapi::extract(&bytes, ctx) {
            Ok(extraction) => extraction,
            Err(e) => {
                self.record_fatal(
                    ctx.project_id,
                    ctx.deployment_id,
                    ctx.document_id,
                    format!("{}: {e}", ctx.name),
                )
                .await?;
                return Ok(AttachmentOutcome::Fatal);
            }
        };

        let mut tx = self.db.begin().await?;
        write_diagnostics(tx.as_mut(), ctx.project_id, ctx.deployment_id, &extraction.diagnostics)
            .await?;
        let tool_count = extraction.tools.len();
        tx.insert_http_tools(extraction.tools).await?;
        tx.insert_http_security(extraction.security_schemes).await?;
        tx.set_attachment_state(ctx.deployment_id, ctx.document_id, AttachmentState::Processed)
            .await?;
        tx.commit().await?;

        info!(tools = tool_count, "Processed openapi document");
        Ok(AttachmentOutcome::Processed)
    }

    async fn process_functions(&self, deployment: &DeploymentRecord) -> Result<usize, ServiceError> {
        let attachments = {
            let tx = self.db.begin().await?;
            tx.list_functions_attachments(deployment.id).await?
        };

        let mut fatal = 0;
        for attachment in attachments {
            let ctx = FunctionsContext::for_attachment(deployment.project_id, &attachment);
            let outcome = self.process_archive(&ctx).await?;
            if outcome == AttachmentOutcome::Fatal {
                fatal += 1;
            }
        }
        Ok(fatal)
    }

    #[instrument(skip_all, fields(functions = %ctx.slug))]
    async fn process_archive(&self, ctx: &FunctionsContext) -> Result<AttachmentOutcome, ServiceError> {
        if let Some(outcome) = self.resumed(ctx.deployment_id, ctx.functions_id).await? {
            return Ok(outcome);
        }

        let Some(bytes) = self.read_asset(ctx.project_id, ctx.asset_id).await? else {
            self.record_fatal(
                ctx.project_id,
                ctx.deployment_id,
                ctx.functions_id,
                format!("{}: functions asset not found", ctx.slug),
            )
            .await?;
            return Ok(AttachmentOutcome::Fatal);
        };

        let extraction = match functions::extract(&bytes, ctx) {
            Ok(extraction) => extraction,
            Err(e) => {
                self.record_fatal(
                    ctx.project_id,
                    ctx.deployment_id,
                    ctx.functions_id,
                    format!("{}: {e}", ctx.slug),
                )
                .await?;
                return Ok(AttachmentOutcome::Fatal);
            }
        };

        let mut tx = self.db.begin().await?;
        write_diagnostics(tx.as_mut(), ctx.project_id, ctx.deployment_id, &extraction.diagnostics)
            .await?;
        let tool_count = extraction.tools.len();
        let resource_count = extraction.resources.len();
        tx.insert_function_tools(extraction.tools).await?;
        tx.insert_function_resources(extraction.resources).await?;
        tx.set_attachment_state(ctx.deployment_id, ctx.functions_id, AttachmentState::Processed)
            .await?;
        tx.commit().await?;

        info!(
            tools = tool_count,
            resources = resource_count,
            manifest_version = %extraction.manifest_version,
            "Processed functions archive"
        );
        Ok(AttachmentOutcome::Processed)
    }

    /// Asset bytes, or `None` when the asset does not exist.
    async fn read_asset(&self, project_id: Uuid, asset_id: Uuid) -> Result<Option<Vec<u8>>, ServiceError> {
        match self.blobs.read(&BlobKey::new(project_id, asset_id)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(BlobError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Outcome of an attachment an earlier run already finished.
    async fn resumed(
        &self,
        deployment_id: Uuid,
        attachment_id: Uuid,
    ) -> Result<Option<AttachmentOutcome>, ServiceError> {
        let tx = self.db.begin().await?;
        Ok(match tx.attachment_state(deployment_id, attachment_id).await? {
            Some(AttachmentState::Processed) => Some(AttachmentOutcome::Skipped),
            Some(AttachmentState::Failed) => Some(AttachmentOutcome::Fatal),
            None => None,
        })
    }

    async fn record_fatal(
        &self,
        project_id: Uuid,
        deployment_id: Uuid,
        attachment_id: Uuid,
        message: String,
    ) -> Result<(), ServiceError> {
        warn!(%message, "Attachment failed to process");
        let mut tx = self.db.begin().await?;
        write_diagnostics(tx.as_mut(), project_id, deployment_id, &[Diagnostic::error(message)])
            .await?;
        tx.set_attachment_state(deployment_id, attachment_id, AttachmentState::Failed)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

async fn load_deployment(
    tx: &dyn Transaction,
    project_id: Uuid,
    deployment_id: Uuid,
) -> Result<DeploymentRecord, ServiceError> {
    tx.get_deployment(project_id, deployment_id)
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("deployment {deployment_id} not found")))
}

async fn current_status(
    tx: &dyn Transaction,
    deployment_id: Uuid,
) -> Result<DeploymentStatus, ServiceError> {
    tx.latest_event(deployment_id)
        .await?
        .map(|event| event.status)
        .ok_or_else(|| ServiceError::invariant(format!("deployment {deployment_id} has no events")))
}

/// Log diagnostics as events carrying the deployment's current status.
async fn write_diagnostics(
    tx: &mut dyn Transaction,
    project_id: Uuid,
    deployment_id: Uuid,
    diagnostics: &[Diagnostic],
) -> Result<(), ServiceError> {
    if diagnostics.is_empty() {
        return Ok(());
    }
    let status = current_status(tx, deployment_id).await?;
    for diagnostic in diagnostics {
        tx.append_event(NewEvent {
            deployment_id,
            project_id,
            status,
            event: diagnostic.event_kind(),
            message: diagnostic.message.clone(),
        })
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::store::{MemoryDatabase, NewDeployment, NewOpenApiAttachment};

    const PETS: &str = r#"
openapi: 3.0.3
info: {title: Pets, version: 1.0.0}
paths:
  /pets:
    get:
      operationId: listPets
    post:
      operationId: createPet
"#;

    struct Fixture {
        db: Arc<MemoryDatabase>,
        blobs: Arc<MemoryBlobStore>,
        project_id: Uuid,
        deployment_id: Uuid,
        document_id: Uuid,
        asset_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let db = Arc::new(MemoryDatabase::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let project_id = Uuid::new_v4();
        let asset_id = Uuid::new_v4();

        let mut tx = db.begin().await.unwrap();
        let deployment = tx
            .insert_deployment(NewDeployment {
                project_id,
                organization_id: "org".to_string(),
                user_id: "user".to_string(),
                idempotency_key: "key".to_string(),
                cloned_from: None,
                metadata: Default::default(),
            })
            .await
            .unwrap()
            .unwrap();
        let document = tx
            .insert_openapi_attachment(
                deployment.id,
                NewOpenApiAttachment {
                    asset_id,
                    name: "Pets".to_string(),
                    slug: "pets".to_string(),
                },
            )
            .await
            .unwrap();
        tx.append_event(NewEvent {
            deployment_id: deployment.id,
            project_id,
            status: DeploymentStatus::Created,
            event: EventKind::Created,
            message: "Deployment created".to_string(),
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        Fixture {
            db,
            blobs,
            project_id,
            deployment_id: deployment.id,
            document_id: document.id,
            asset_id,
        }
    }

    fn processor(f: &Fixture) -> ProcessDeployment {
        ProcessDeployment::new(f.db.clone(), f.blobs.clone())
    }

    async fn events(f: &Fixture) -> Vec<EventKind> {
        let tx = f.db.begin().await.unwrap();
        tx.list_events(f.deployment_id, None, 100)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event)
            .collect()
    }

    #[tokio::test]
    async fn test_run_completes_and_is_repeatable() {
        let f = fixture().await;
        f.blobs
            .put(BlobKey::new(f.project_id, f.asset_id), PETS.as_bytes())
            .await;
        let processor = processor(&f);

        let status = processor.run(f.project_id, f.deployment_id).await.unwrap();
        assert_eq!(status, DeploymentStatus::Completed);

        let status = processor.run(f.project_id, f.deployment_id).await.unwrap();
        assert_eq!(status, DeploymentStatus::Completed);

        let tx = f.db.begin().await.unwrap();
        assert_eq!(tx.count_http_tools(f.deployment_id, None).await.unwrap(), 2);
        drop(tx);

        assert_eq!(
            events(&f).await,
            vec![EventKind::Created, EventKind::Pending, EventKind::Completed]
        );
    }

    #[tokio::test]
    async fn test_missing_asset_fails_deployment() {
        let f = fixture().await;
        let status = processor(&f).run(f.project_id, f.deployment_id).await.unwrap();
        assert_eq!(status, DeploymentStatus::Failed);

        let tx = f.db.begin().await.unwrap();
        let logged = tx.list_events(f.deployment_id, None, 100).await.unwrap();
        assert_eq!(logged[2].event, EventKind::Error);
        assert_eq!(logged[2].status, DeploymentStatus::Pending);
        assert!(logged[2].message.contains("asset not found"));
        assert_eq!(logged[3].message, "1 attachment failed to process");
    }

    #[tokio::test]
    async fn test_fail_does_not_override_terminal_status() {
        let f = fixture().await;
        f.blobs
            .put(BlobKey::new(f.project_id, f.asset_id), PETS.as_bytes())
            .await;
        let processor = processor(&f);
        processor.run(f.project_id, f.deployment_id).await.unwrap();

        let status = processor
            .fail(f.project_id, f.deployment_id, "workflow gave up")
            .await
            .unwrap();
        assert_eq!(status, DeploymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_fail_marks_created_deployment_failed() {
        let f = fixture().await;
        let status = processor(&f)
            .fail(f.project_id, f.deployment_id, "workflow gave up")
            .await
            .unwrap();
        assert_eq!(status, DeploymentStatus::Failed);
        assert_eq!(events(&f).await, vec![EventKind::Created, EventKind::Failed]);
    }

    #[tokio::test]
    async fn test_unknown_deployment_is_not_found() {
        let f = fixture().await;
        let err = processor(&f)
            .run(f.project_id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    /// Leave the deployment pending after one pass over its documents, as a
    /// worker that died before the final transition would.
    async fn interrupted_run(f: &Fixture) {
        let mut tx = f.db.begin().await.unwrap();
        let deployment = load_deployment(tx.as_ref(), f.project_id, f.deployment_id)
            .await
            .unwrap();
        tx.append_event(NewEvent {
            deployment_id: f.deployment_id,
            project_id: f.project_id,
            status: DeploymentStatus::Pending,
            event: EventKind::Pending,
            message: PENDING_MESSAGE.to_string(),
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();
        processor(f).process_openapi(&deployment).await.unwrap();
    }

    #[tokio::test]
    async fn test_resume_does_not_relog_failed_attachment() {
        let f = fixture().await;
        interrupted_run(&f).await;

        let status = processor(&f).run(f.project_id, f.deployment_id).await.unwrap();
        assert_eq!(status, DeploymentStatus::Failed);
        assert_eq!(
            events(&f).await,
            vec![
                EventKind::Created,
                EventKind::Pending,
                EventKind::Error,
                EventKind::Failed
            ]
        );

        let tx = f.db.begin().await.unwrap();
        let logged = tx.list_events(f.deployment_id, None, 100).await.unwrap();
        assert_eq!(logged[3].message, "1 attachment failed to process");
    }

    #[tokio::test]
    async fn test_resume_skips_document_without_tools() {
        let f = fixture().await;
        f.blobs
            .put(
                BlobKey::new(f.project_id, f.asset_id),
                b"openapi: 3.0.3\ninfo: {title: Empty, version: 1.0.0}\npaths: {}\n".as_slice(),
            )
            .await;
        interrupted_run(&f).await;
        let before = events(&f).await.len();

        // A rerun that extracted again would now find two tools.
        f.blobs
            .put(BlobKey::new(f.project_id, f.asset_id), PETS.as_bytes())
            .await;
        let status = processor(&f).run(f.project_id, f.deployment_id).await.unwrap();
        assert_eq!(status, DeploymentStatus::Completed);

        let tx = f.db.begin().await.unwrap();
        assert_eq!(tx.count_http_tools(f.deployment_id, None).await.unwrap(), 0);
        assert_eq!(
            tx.attachment_state(f.deployment_id, f.document_id).await.unwrap(),
            Some(AttachmentState::Processed)
        );
        drop(tx);
        assert_eq!(events(&f).await.len(), before + 1);
    }
}
