//! Deployment lifecycle operations
//!
//! [`DeploymentService`] creates, evolves and redeploys deployments inside a
//! single store transaction each, then hands the new deployment to the
//! [`WorkflowRunner`] for processing. Reads project deployments together with
//! their attachments, tool counts and status log.

mod forms;
mod resources;

pub use forms::{
    CreateDeploymentForm, EvolveForm, FunctionsForm, OpenApiAssetForm, PackageForm, RedeployForm,
};
pub use resources::{
    Deployment, DeploymentFunctions, DeploymentLogs, DeploymentOpenApiAsset, DeploymentPackage,
    DeploymentPage, DeploymentSummary,
};

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::packages::{PackageRequest, ResolvedPackage, resolve_packages};
use crate::pagination::{PAGE_SIZE, encode_cursor, parse_optional_cursor};
use crate::store::{
    Database, DeploymentMetadata, DeploymentRecord, NewDeployment, NewEvent,
    NewFunctionsAttachment, NewOpenApiAttachment, NewPackageAttachment, Transaction,
};
use crate::types::{AuthContext, DeploymentStatus, EventKind};
use crate::validation::Validator;
use crate::workflow::{WorkflowKey, WorkflowRunner};

pub const CREATED_MESSAGE: &str = "Deployment created";

const NO_ATTACHMENTS: &str =
    "at least one openapi document, functions archive or package is required";

/// Attachments of one request after validation and package resolution.
#[derive(Debug, Default)]
struct Attachments {
    openapi: Vec<NewOpenApiAttachment>,
    functions: Vec<NewFunctionsAttachment>,
    packages: Vec<ResolvedPackage>,
}

/// Changes applied to a cloned deployment.
#[derive(Debug, Default)]
struct CloneChanges {
    upserts: Attachments,
    exclude_openapi: HashSet<Uuid>,
    exclude_functions: HashSet<Uuid>,
    exclude_packages: HashSet<Uuid>,
}

/// Deployment CRUD entry point
#[derive(Clone)]
pub struct DeploymentService {
    db: Arc<dyn Database>,
    workflows: Arc<dyn WorkflowRunner>,
}

impl DeploymentService {
    pub fn new(db: Arc<dyn Database>, workflows: Arc<dyn WorkflowRunner>) -> Self {
        Self { db, workflows }
    }

    /// Create a deployment, or return the existing one for the same
    /// idempotency key without touching its attachments.
    #[instrument(skip_all, fields(project_id = ?auth.project_id, idempotency_key = %form.idempotency_key))]
    pub async fn create_deployment(
        &self,
        auth: &AuthContext,
        form: CreateDeploymentForm,
    ) -> ServiceResult<Deployment> {
        let project_id = active_project(auth)?;
        let idempotency_key = form.idempotency_key.trim();
        if idempotency_key.is_empty() {
            return Err(ServiceError::bad_request("idempotency key is required"));
        }
        if !form.has_attachments() {
            return Err(ServiceError::invalid(NO_ATTACHMENTS));
        }

        let (openapi, functions) =
            validate_attachments(&form.openapiv3_assets, &form.functions, "")?;
        let requests: Vec<PackageRequest> = form.packages.iter().map(PackageRequest::from).collect();

        let mut tx = self.db.begin().await?;
        let packages = resolve_packages(tx.as_ref(), project_id, &requests).await?;

        let inserted = tx
            .insert_deployment(NewDeployment {
                project_id,
                organization_id: auth.organization_id.clone(),
                user_id: auth.user_id.clone(),
                idempotency_key: idempotency_key.to_string(),
                cloned_from: None,
                metadata: form.metadata.clone(),
            })
            .await?;

        let record = match inserted {
            Some(record) => {
                let attachments = Attachments {
                    openapi,
                    functions,
                    packages,
                };
                write_attachments(tx.as_mut(), record.id, attachments).await?;
                record_created(tx.as_mut(), &record).await?;
                tx.commit().await?;
                info!(deployment_id = %record.id, "Created deployment");
                record
            }
            None => {
                let existing = tx
                    .find_deployment_by_idempotency_key(project_id, idempotency_key)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::invariant("idempotency conflict without an existing deployment")
                    })?;
                drop(tx);
                debug!(deployment_id = %existing.id, "Idempotency key already used");
                existing
            }
        };

        self.launch(record, form.non_blocking).await
    }

    /// Create a new deployment from the latest (or a chosen) deployment with
    /// attachments added, replaced or removed.
    #[instrument(skip_all, fields(project_id = ?auth.project_id))]
    pub async fn evolve(&self, auth: &AuthContext, form: EvolveForm) -> ServiceResult<Deployment> {
        let project_id = active_project(auth)?;
        if !form.has_upserts() && !form.has_exclusions() {
            return Err(ServiceError::invalid(
                "at least one upsert or exclusion is required",
            ));
        }

        let source_id = form
            .deployment_id
            .as_deref()
            .map(|raw| parse_id("deployment id", raw))
            .transpose()?;
        let exclude_openapi = parse_ids("openapiv3 asset id", &form.exclude_openapiv3_assets)?;
        let exclude_functions = parse_ids("functions asset id", &form.exclude_functions)?;
        let exclude_packages = parse_ids("package id", &form.exclude_packages)?;

        let (openapi, functions) = validate_attachments(
            &form.upsert_openapiv3_assets,
            &form.upsert_functions,
            "upsert_",
        )?;
        let requests: Vec<PackageRequest> = form
            .upsert_packages
            .iter()
            .map(PackageRequest::from)
            .collect();

        let mut tx = self.db.begin().await?;
        let source = match source_id {
            Some(id) => Some(
                tx.get_deployment(project_id, id)
                    .await?
                    .ok_or_else(|| ServiceError::not_found(format!("deployment {id} not found")))?,
            ),
            None => tx.latest_deployment(project_id).await?,
        };
        let packages = resolve_packages(tx.as_ref(), project_id, &requests).await?;
        let upserts = Attachments {
            openapi,
            functions,
            packages,
        };

        let record = match source {
            Some(source) => {
                let changes = CloneChanges {
                    upserts,
                    exclude_openapi,
                    exclude_functions,
                    exclude_packages,
                };
                clone_deployment(tx.as_mut(), &source, changes).await?
            }
            None => {
                if upserts.openapi.is_empty()
                    && upserts.functions.is_empty()
                    && upserts.packages.is_empty()
                {
                    return Err(ServiceError::invalid(NO_ATTACHMENTS));
                }
                let record = insert_fresh(
                    tx.as_mut(),
                    NewDeployment {
                        project_id,
                        organization_id: auth.organization_id.clone(),
                        user_id: auth.user_id.clone(),
                        idempotency_key: Uuid::new_v4().to_string(),
                        cloned_from: None,
                        metadata: DeploymentMetadata::default(),
                    },
                )
                .await?;
                write_attachments(tx.as_mut(), record.id, upserts).await?;
                record
            }
        };
        record_created(tx.as_mut(), &record).await?;
        tx.commit().await?;
        info!(
            deployment_id = %record.id,
            cloned_from = ?record.cloned_from,
            "Evolved deployment"
        );

        self.launch(record, form.non_blocking).await
    }

    /// Clone a deployment without changes.
    #[instrument(skip_all, fields(project_id = ?auth.project_id, source = %form.deployment_id))]
    pub async fn redeploy(&self, auth: &AuthContext, form: RedeployForm) -> ServiceResult<Deployment> {
        let project_id = active_project(auth)?;
        let source_id = parse_id("deployment id", &form.deployment_id)?;

        let mut tx = self.db.begin().await?;
        let source = tx
            .get_deployment(project_id, source_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("deployment {source_id} not found")))?;
        let record = clone_deployment(tx.as_mut(), &source, CloneChanges::default()).await?;
        record_created(tx.as_mut(), &record).await?;
        tx.commit().await?;
        info!(deployment_id = %record.id, "Redeployed deployment");

        self.launch(record, form.non_blocking).await
    }

    pub async fn get_deployment(
        &self,
        auth: &AuthContext,
        deployment_id: &str,
    ) -> ServiceResult<Deployment> {
        let project_id = active_project(auth)?;
        let id = parse_id("deployment id", deployment_id)?;
        self.load(project_id, id).await
    }

    /// Most recently created deployment, whatever its status.
    pub async fn get_latest_deployment(
        &self,
        auth: &AuthContext,
    ) -> ServiceResult<Option<Deployment>> {
        let project_id = active_project(auth)?;
        let tx = self.db.begin().await?;
        match tx.latest_deployment(project_id).await? {
            Some(record) => Ok(Some(resources::deployment_view(tx.as_ref(), record).await?)),
            None => Ok(None),
        }
    }

    /// Most recently created deployment that completed processing.
    pub async fn get_active_deployment(
        &self,
        auth: &AuthContext,
    ) -> ServiceResult<Option<Deployment>> {
        let project_id = active_project(auth)?;
        let tx = self.db.begin().await?;
        match tx.active_deployment(project_id).await? {
            Some(record) => Ok(Some(resources::deployment_view(tx.as_ref(), record).await?)),
            None => Ok(None),
        }
    }

    /// Deployments newest first.
    pub async fn list_deployments(
        &self,
        auth: &AuthContext,
        cursor: Option<&str>,
    ) -> ServiceResult<DeploymentPage> {
        let project_id = active_project(auth)?;
        let max_seq = parse_optional_cursor(cursor)?;

        let tx = self.db.begin().await?;
        let mut rows = tx
            .list_deployments(project_id, max_seq, PAGE_SIZE + 1)
            .await?;
        let next_cursor = if rows.len() > PAGE_SIZE {
            let next = encode_cursor(rows[PAGE_SIZE].seq);
            rows.truncate(PAGE_SIZE);
            Some(next)
        } else {
            None
        };

        let mut items = Vec::with_capacity(rows.len());
        for record in &rows {
            items.push(resources::deployment_summary(tx.as_ref(), record).await?);
        }
        Ok(DeploymentPage { items, next_cursor })
    }

    /// Status log of one deployment in event order.
    pub async fn get_deployment_logs(
        &self,
        auth: &AuthContext,
        deployment_id: &str,
        cursor: Option<&str>,
    ) -> ServiceResult<DeploymentLogs> {
        let project_id = active_project(auth)?;
        let id = parse_id("deployment id", deployment_id)?;
        let min_seq = parse_optional_cursor(cursor)?;

        let tx = self.db.begin().await?;
        if tx.get_deployment(project_id, id).await?.is_none() {
            return Err(ServiceError::not_found(format!("deployment {id} not found")));
        }
        let status = resources::status_of(tx.as_ref(), id).await?;
        let mut events = tx.list_events(id, min_seq, PAGE_SIZE + 1).await?;
        let next_cursor = if events.len() > PAGE_SIZE {
            let next = encode_cursor(events[PAGE_SIZE].seq);
            events.truncate(PAGE_SIZE);
            Some(next)
        } else {
            None
        };

        Ok(DeploymentLogs {
            status,
            events,
            next_cursor,
        })
    }

    async fn load(&self, project_id: Uuid, deployment_id: Uuid) -> ServiceResult<Deployment> {
        let tx = self.db.begin().await?;
        let record = tx
            .get_deployment(project_id, deployment_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("deployment {deployment_id} not found")))?;
        resources::deployment_view(tx.as_ref(), record).await
    }

    /// Start (or join) processing, waiting for it unless `non_blocking`.
    async fn launch(&self, record: DeploymentRecord, non_blocking: bool) -> ServiceResult<Deployment> {
        let key = WorkflowKey::new(record.project_id, record.id, record.idempotency_key.clone());

        if non_blocking {
            let view = self.load(record.project_id, record.id).await?;
            self.workflows.start(key).await;
            return Ok(view);
        }

        let status = self.workflows.start(key).await.wait().await?;
        debug!(deployment_id = %record.id, status = %status, "Deployment processing finished");
        self.load(record.project_id, record.id).await
    }
}

fn active_project(auth: &AuthContext) -> ServiceResult<Uuid> {
    auth.project_id
        .ok_or_else(|| ServiceError::unauthorized("no active project"))
}

fn parse_id(what: &str, raw: &str) -> ServiceResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ServiceError::bad_request(format!("{raw:?} is not a valid {what}")))
}

fn parse_ids(what: &str, raw: &[String]) -> ServiceResult<HashSet<Uuid>> {
    raw.iter().map(|id| parse_id(what, id)).collect()
}

/// Validate every attachment of a request, reporting all problems at once.
fn validate_attachments(
    openapi: &[OpenApiAssetForm],
    functions: &[FunctionsForm],
    prefix: &str,
) -> ServiceResult<(Vec<NewOpenApiAttachment>, Vec<NewFunctionsAttachment>)> {
    let mut validator = Validator::new();

    let mut openapi_rows = Vec::with_capacity(openapi.len());
    let mut seen = HashSet::new();
    for (i, form) in openapi.iter().enumerate() {
        let field = format!("{prefix}openapiv3_assets[{i}]");
        let asset_id = validator.asset_id(&format!("{field}.asset_id"), &form.asset_id);
        validator.name(&format!("{field}.name"), &form.name);
        validator.slug(&format!("{field}.slug"), &form.slug);
        if !seen.insert(form.slug.as_str()) {
            validator.invalid(format!("{field}.slug"), format!("duplicate slug {:?}", form.slug));
        }
        if let Some(asset_id) = asset_id {
            openapi_rows.push(NewOpenApiAttachment {
                asset_id,
                name: form.name.trim().to_string(),
                slug: form.slug.clone(),
            });
        }
    }

    let mut functions_rows = Vec::with_capacity(functions.len());
    let mut seen = HashSet::new();
    for (i, form) in functions.iter().enumerate() {
        let field = format!("{prefix}functions[{i}]");
        let asset_id = validator.asset_id(&format!("{field}.asset_id"), &form.asset_id);
        validator.name(&format!("{field}.name"), &form.name);
        validator.slug(&format!("{field}.slug"), &form.slug);
        validator.runtime(&format!("{field}.runtime"), &form.runtime);
        if !seen.insert(form.slug.as_str()) {
            validator.invalid(format!("{field}.slug"), format!("duplicate slug {:?}", form.slug));
        }
        if let Some(asset_id) = asset_id {
            functions_rows.push(NewFunctionsAttachment {
                asset_id,
                name: form.name.trim().to_string(),
                slug: form.slug.clone(),
                runtime: form.runtime.clone(),
            });
        }
    }

    validator.finish()?;
    Ok((openapi_rows, functions_rows))
}

async fn insert_fresh(
    tx: &mut dyn Transaction,
    deployment: NewDeployment,
) -> ServiceResult<DeploymentRecord> {
    tx.insert_deployment(deployment)
        .await?
        .ok_or_else(|| ServiceError::invariant("fresh idempotency key already in use"))
}

async fn write_attachments(
    tx: &mut dyn Transaction,
    deployment_id: Uuid,
    attachments: Attachments,
) -> ServiceResult<()> {
    for attachment in attachments.openapi {
        tx.insert_openapi_attachment(deployment_id, attachment).await?;
    }
    for attachment in attachments.functions {
        tx.insert_functions_attachment(deployment_id, attachment).await?;
    }
    for package in attachments.packages {
        tx.insert_package_attachment(
            deployment_id,
            NewPackageAttachment {
                package_id: package.package_id,
                version_id: package.version_id,
            },
        )
        .await?;
    }
    Ok(())
}

/// Copy `source` into a new deployment, then apply `changes`.
///
/// An upsert replaces a cloned attachment of the same kind that shares its
/// asset (or package) id or its slug.
async fn clone_deployment(
    tx: &mut dyn Transaction,
    source: &DeploymentRecord,
    changes: CloneChanges,
) -> ServiceResult<DeploymentRecord> {
    let record = insert_fresh(
        tx,
        NewDeployment {
            project_id: source.project_id,
            organization_id: source.organization_id.clone(),
            user_id: source.user_id.clone(),
            idempotency_key: Uuid::new_v4().to_string(),
            cloned_from: Some(source.id),
            metadata: source.metadata.clone(),
        },
    )
    .await?;

    let upserts = &changes.upserts;

    let mut openapi: Vec<NewOpenApiAttachment> = tx
        .list_openapi_attachments(source.id)
        .await?
        .into_iter()
        .filter(|a| !changes.exclude_openapi.contains(&a.asset_id))
        .filter(|a| {
            !upserts
                .openapi
                .iter()
                .any(|u| u.asset_id == a.asset_id || u.slug == a.slug)
        })
        .map(|a| NewOpenApiAttachment {
            asset_id: a.asset_id,
            name: a.name,
            slug: a.slug,
        })
        .collect();
    openapi.extend(upserts.openapi.iter().cloned());

    let mut functions: Vec<NewFunctionsAttachment> = tx
        .list_functions_attachments(source.id)
        .await?
        .into_iter()
        .filter(|a| !changes.exclude_functions.contains(&a.asset_id))
        .filter(|a| {
            !upserts
                .functions
                .iter()
                .any(|u| u.asset_id == a.asset_id || u.slug == a.slug)
        })
        .map(|a| NewFunctionsAttachment {
            asset_id: a.asset_id,
            name: a.name,
            slug: a.slug,
            runtime: a.runtime,
        })
        .collect();
    functions.extend(upserts.functions.iter().cloned());

    let mut packages: Vec<NewPackageAttachment> = tx
        .list_package_attachments(source.id)
        .await?
        .into_iter()
        .filter(|p| !changes.exclude_packages.contains(&p.package_id))
        .filter(|p| !upserts.packages.iter().any(|u| u.package_id == p.package_id))
        .map(|p| NewPackageAttachment {
            package_id: p.package_id,
            version_id: p.version_id,
        })
        .collect();
    packages.extend(upserts.packages.iter().map(|p| NewPackageAttachment {
        package_id: p.package_id,
        version_id: p.version_id,
    }));

    for attachment in openapi {
        tx.insert_openapi_attachment(record.id, attachment).await?;
    }
    for attachment in functions {
        tx.insert_functions_attachment(record.id, attachment).await?;
    }
    for attachment in packages {
        tx.insert_package_attachment(record.id, attachment).await?;
    }

    Ok(record)
}

async fn record_created(tx: &mut dyn Transaction, record: &DeploymentRecord) -> ServiceResult<()> {
    tx.append_event(NewEvent {
        deployment_id: record.id,
        project_id: record.project_id,
        status: DeploymentStatus::Created,
        event: EventKind::Created,
        message: CREATED_MESSAGE.to_string(),
    })
    .await?;
    Ok(())
}
