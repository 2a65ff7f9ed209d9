//! Package resolution
//!
//! Maps `(name, version)` requests onto concrete package versions published
//! by other projects. Runs inside the caller's transaction so the resolved
//! versions are consistent with the deployment being written.

mod version;

pub use self::version::{Semver, SemverError};

use tracing::debug;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::store::{PackageVersion, Transaction};

/// A package reference as supplied by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    pub name: String,
    /// Empty or absent means the highest published version.
    pub version: Option<String>,
}

/// A package version pinned for attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub package_id: Uuid,
    pub owning_project_id: Uuid,
    pub version_id: Uuid,
    pub name: String,
    pub version: Semver,
}

/// Resolve every request and check that none is owned by `target_project_id`.
pub async fn resolve_packages(
    tx: &dyn Transaction,
    target_project_id: Uuid,
    requests: &[PackageRequest],
) -> Result<Vec<ResolvedPackage>, ServiceError> {
    let mut resolved = Vec::with_capacity(requests.len());
    for request in requests {
        resolved.push(resolve_one(tx, request).await?);
    }

    if resolved
        .iter()
        .any(|p| p.owning_project_id == target_project_id)
    {
        return Err(ServiceError::invalid("cannot add package to its own project"));
    }

    Ok(resolved)
}

async fn resolve_one(
    tx: &dyn Transaction,
    request: &PackageRequest,
) -> Result<ResolvedPackage, ServiceError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ServiceError::bad_request("package name is required"));
    }

    let wanted = match request.version.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            Semver::parse(raw)
                .map_err(|e| ServiceError::bad_request(format!("package {name}: {e}")))?,
        ),
    };

    let package = tx
        .find_package_by_name(name)
        .await?
        .ok_or_else(|| ServiceError::bad_request(format!("package {name:?} does not exist")))?;

    let versions = tx.list_package_versions(package.id).await?;
    let version = match &wanted {
        Some(semver) => select_exact(&versions, semver).ok_or_else(|| {
            ServiceError::bad_request(format!("package {name:?} has no version {semver}"))
        })?,
        None => select_latest(&versions).ok_or_else(|| {
            ServiceError::bad_request(format!("package {name:?} has no published versions"))
        })?,
    };

    debug!(
        package = %name,
        version = %version.semver,
        package_id = %package.id,
        "Resolved package version"
    );

    Ok(ResolvedPackage {
        package_id: package.id,
        owning_project_id: package.project_id,
        version_id: version.id,
        name: package.name,
        version: version.semver.clone(),
    })
}

fn select_exact<'a>(versions: &'a [PackageVersion], wanted: &Semver) -> Option<&'a PackageVersion> {
    versions.iter().find(|v| &v.semver == wanted)
}

fn select_latest(versions: &[PackageVersion]) -> Option<&PackageVersion> {
    versions
        .iter()
        .max_by(|a, b| a.semver.cmp(&b.semver).then(a.created_at.cmp(&b.created_at)))
}
