//! Functions archive extraction
//!
//! A functions attachment is a ZIP archive holding the runtime entrypoint
//! and a `manifest.json` that declares the exposed tools and resources.

mod manifest;

pub use manifest::{
    MAX_TOOL_NAME_LENGTH, Manifest, ManifestResource, ManifestTool, ValidatedManifest,
    is_valid_tool_name,
};

use std::io::{Cursor, Read};

use chrono::Utc;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::naming::resource_urn;
use crate::store::{FunctionResourceDefinition, FunctionToolDefinition, FunctionsAttachment};
use crate::types::Diagnostic;
use crate::validation::{SUPPORTED_RUNTIMES, is_supported_runtime};

const MANIFEST_FILE: &str = "manifest.json";

const NODE_ENTRYPOINTS: [&str; 6] = [
    "functions.cjs",
    "functions.cts",
    "functions.js",
    "functions.mjs",
    "functions.mts",
    "functions.ts",
];

const PYTHON_ENTRYPOINTS: [&str; 1] = ["functions.py"];

/// Errors that prevent an archive from producing any tools
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FunctionsError {
    #[error("unsupported functions runtime: {runtime} (allowed: {})", SUPPORTED_RUNTIMES.join(", "))]
    UnsupportedRuntime { runtime: String },

    #[error("error opening functions zip file: {0}")]
    Archive(String),

    #[error("functions zip file is missing entrypoint file: {}", .expected.join(", "))]
    MissingEntrypoint { expected: Vec<String> },

    #[error("functions zip file is missing manifest.json file")]
    MissingManifest,

    #[error("error parsing manifest file: {0}")]
    InvalidManifest(String),
}

/// Identity of the archive being extracted.
#[derive(Debug, Clone)]
pub struct FunctionsContext {
    pub project_id: Uuid,
    pub deployment_id: Uuid,
    /// Attachment id; tools reference it as their functions archive.
    pub functions_id: Uuid,
    pub asset_id: Uuid,
    pub slug: String,
    pub runtime: String,
}

impl FunctionsContext {
    pub fn for_attachment(project_id: Uuid, attachment: &FunctionsAttachment) -> Self {
        Self {
            project_id,
            deployment_id: attachment.deployment_id,
            functions_id: attachment.id,
            asset_id: attachment.asset_id,
            slug: attachment.slug.clone(),
            runtime: attachment.runtime.clone(),
        }
    }
}

/// Everything derived from one archive.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub manifest_version: String,
    pub tools: Vec<FunctionToolDefinition>,
    pub resources: Vec<FunctionResourceDefinition>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Entrypoint file names accepted for `runtime`.
pub fn entrypoints(runtime: &str) -> &'static [&'static str] {
    if runtime.starts_with("nodejs:") {
        &NODE_ENTRYPOINTS
    } else if runtime.starts_with("python:") {
        &PYTHON_ENTRYPOINTS
    } else {
        &[]
    }
}

/// Extract tools and resources from functions archive bytes.
///
/// Manifest entries are all-or-nothing: a single malformed tool or resource
/// yields nothing and one error diagnostic per offense.
pub fn extract(bytes: &[u8], ctx: &FunctionsContext) -> Result<Extraction, FunctionsError> {
    if !is_supported_runtime(&ctx.runtime) {
        return Err(FunctionsError::UnsupportedRuntime {
            runtime: ctx.runtime.clone(),
        });
    }
    let accepted = entrypoints(&ctx.runtime);

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| FunctionsError::Archive(e.to_string()))?;

    let has_entrypoint = archive.file_names().any(|name| accepted.contains(&name));
    if !has_entrypoint {
        return Err(FunctionsError::MissingEntrypoint {
            expected: accepted.iter().map(|s| s.to_string()).collect(),
        });
    }

    let manifest_bytes = {
        let mut file = match archive.by_name(MANIFEST_FILE) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => return Err(FunctionsError::MissingManifest),
            Err(e) => return Err(FunctionsError::Archive(e.to_string())),
        };
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)
            .map_err(|e| FunctionsError::Archive(format!("error reading manifest file: {e}")))?;
        buffer
    };

    let manifest = Manifest::from_bytes(&manifest_bytes)?;

    let mut extraction = Extraction {
        manifest_version: manifest.version.clone(),
        ..Default::default()
    };

    match manifest.validate() {
        Ok(ValidatedManifest { tools, resources }) => {
            let now = Utc::now();
            extraction.tools = tools
                .into_iter()
                .map(|tool| FunctionToolDefinition {
                    id: Uuid::new_v4(),
                    deployment_id: ctx.deployment_id,
                    project_id: ctx.project_id,
                    functions_id: ctx.functions_id,
                    asset_id: ctx.asset_id,
                    name: tool.name,
                    description: tool.description.unwrap_or_default(),
                    runtime: ctx.runtime.clone(),
                    input_schema: Value::Object(tool.input_schema),
                    variables: tool.variables.map(Value::Object).unwrap_or(Value::Null),
                    meta: tool.meta,
                    created_at: now,
                })
                .collect();
            extraction.resources = resources
                .into_iter()
                .map(|resource| FunctionResourceDefinition {
                    id: Uuid::new_v4(),
                    deployment_id: ctx.deployment_id,
                    project_id: ctx.project_id,
                    functions_id: ctx.functions_id,
                    asset_id: ctx.asset_id,
                    resource_urn: resource_urn(&ctx.slug, &resource.uri),
                    name: resource.name,
                    description: resource.description.unwrap_or_default(),
                    uri: resource.uri,
                    title: resource.title,
                    mime_type: resource.mime_type,
                    runtime: ctx.runtime.clone(),
                    variables: Value::Object(resource.variables.unwrap_or_else(Map::new)),
                    meta: resource.meta,
                    created_at: now,
                })
                .collect();
        }
        Err(offenses) => {
            extraction.diagnostics = offenses
                .into_iter()
                .map(|offense| {
                    Diagnostic::error(format!("{}: invalid manifest: {offense}", ctx.slug))
                })
                .collect();
        }
    }

    debug!(
        functions = %ctx.slug,
        manifest_version = %extraction.manifest_version,
        tools = extraction.tools.len(),
        resources = extraction.resources.len(),
        "Extracted function tools"
    );

    Ok(extraction)
}
