//! Request payloads accepted by the deployment service.
//!
//! Identifiers arrive as strings so that malformed values are reported with
//! the rest of a request's problems instead of failing deserialization.

use serde::{Deserialize, Serialize};

use crate::packages::PackageRequest;
use crate::store::DeploymentMetadata;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenApiAssetForm {
    pub asset_id: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionsForm {
    pub asset_id: String,
    pub name: String,
    pub slug: String,
    pub runtime: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageForm {
    pub name: String,
    /// Exact version; absent or empty selects the latest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl From<&PackageForm> for PackageRequest {
    fn from(form: &PackageForm) -> Self {
        PackageRequest {
            name: form.name.clone(),
            version: form.version.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDeploymentForm {
    pub idempotency_key: String,

    #[serde(default)]
    pub openapiv3_assets: Vec<OpenApiAssetForm>,

    #[serde(default)]
    pub functions: Vec<FunctionsForm>,

    #[serde(default)]
    pub packages: Vec<PackageForm>,

    /// Return as soon as the deployment is recorded instead of waiting
    /// for processing to finish.
    #[serde(default)]
    pub non_blocking: bool,

    #[serde(flatten)]
    pub metadata: DeploymentMetadata,
}

impl CreateDeploymentForm {
    pub fn has_attachments(&self) -> bool {
        !self.openapiv3_assets.is_empty() || !self.functions.is_empty() || !self.packages.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolveForm {
    /// Deployment to evolve from; the project's latest when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,

    #[serde(default)]
    pub upsert_openapiv3_assets: Vec<OpenApiAssetForm>,

    #[serde(default)]
    pub upsert_functions: Vec<FunctionsForm>,

    #[serde(default)]
    pub upsert_packages: Vec<PackageForm>,

    /// Asset ids of OpenAPI attachments to drop.
    #[serde(default)]
    pub exclude_openapiv3_assets: Vec<String>,

    /// Asset ids of functions attachments to drop.
    #[serde(default)]
    pub exclude_functions: Vec<String>,

    /// Package ids to drop.
    #[serde(default)]
    pub exclude_packages: Vec<String>,

    #[serde(default)]
    pub non_blocking: bool,
}

impl EvolveForm {
    pub fn has_upserts(&self) -> bool {
        !self.upsert_openapiv3_assets.is_empty()
            || !self.upsert_functions.is_empty()
            || !self.upsert_packages.is_empty()
    }

    pub fn has_exclusions(&self) -> bool {
        !self.exclude_openapiv3_assets.is_empty()
            || !self.exclude_functions.is_empty()
            || !self.exclude_packages.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeployForm {
    pub deployment_id: String,

    #[serde(default)]
    pub non_blocking: bool,
}
