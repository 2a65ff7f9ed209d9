//! OpenAPI tool extraction
//!
//! Turns an OpenAPI 3.x document into one HTTP tool definition per
//! operation. A document that cannot be loaded at all is a fatal
//! [`OpenApiError`]; problems confined to a single operation skip that
//! operation and are reported as [`Diagnostic`]s.

mod document;
mod extensions;
mod schema;
mod security;

use chrono::Utc;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::naming::env_var_name;
use crate::store::{HttpSecurityScheme, HttpToolDefinition, OpenApiAttachment};
use crate::types::Diagnostic;

/// HTTP methods turned into tools, in emission order.
pub const METHODS: [&str; 6] = ["get", "post", "put", "delete", "head", "patch"];

/// Errors that prevent a document from producing any tools
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpenApiError {
    #[error("failed to parse document: {0}")]
    Parse(String),

    #[error("document root must be a mapping")]
    NotAnObject,

    #[error("document does not declare an openapi version")]
    MissingVersion,

    #[error("unsupported OpenAPI version {0:?} (expected 3.x)")]
    UnsupportedVersion(String),

    #[error(
        "external reference {reference:?} at {location} is not supported; bundle the document before uploading"
    )]
    ExternalReference { reference: String, location: String },

    #[error("paths must be a mapping")]
    InvalidPaths,
}

/// Identity of the document being extracted.
#[derive(Debug, Clone)]
pub struct DocumentContext {
    pub project_id: Uuid,
    pub deployment_id: Uuid,
    /// Attachment id; tools reference it as their OpenAPI document.
    pub document_id: Uuid,
    pub asset_id: Uuid,
    pub name: String,
    pub slug: String,
}

impl DocumentContext {
    pub fn for_attachment(project_id: Uuid, attachment: &OpenApiAttachment) -> Self {
        Self {
            project_id,
            deployment_id: attachment.deployment_id,
            document_id: attachment.id,
            asset_id: attachment.asset_id,
            name: attachment.name.clone(),
            slug: attachment.slug.clone(),
        }
    }
}

/// Everything derived from one document.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub tools: Vec<HttpToolDefinition>,
    pub security_schemes: Vec<HttpSecurityScheme>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Extract tools from raw JSON or YAML bytes.
pub fn extract(bytes: &[u8], ctx: &DocumentContext) -> Result<Extraction, OpenApiError> {
    let doc = document::parse(bytes)?;
    let refs = document::Refs::new(&doc);

    let paths: Option<&Map<String, Value>> = match doc.get("paths") {
        None | Some(Value::Null) => None,
        Some(Value::Object(paths)) => Some(paths),
        Some(_) => return Err(OpenApiError::InvalidPaths),
    };

    let mut extraction = Extraction::default();
    let server_env_var = env_var_name(&format!("{}_SERVER_URL", ctx.slug));
    let default_server_url = security::default_server_url(&doc, ctx, &mut extraction.diagnostics);
    extraction.security_schemes =
        security::security_schemes(&refs, &doc, ctx, &mut extraction.diagnostics);

    let shared = OperationShared {
        ctx,
        refs: &refs,
        global_security: doc.get("security"),
        server_env_var: &server_env_var,
        default_server_url: default_server_url.as_deref(),
    };

    for (path, item) in paths.into_iter().flatten() {
        if path.starts_with("x-") {
            continue;
        }
        let item = match refs.deref(item) {
            Ok(Value::Object(item)) => item,
            Ok(_) => {
                extraction.diagnostics.push(Diagnostic::error(format!(
                    "{}: {path}: skipped path item: must be a mapping",
                    ctx.name
                )));
                continue;
            }
            Err(e) => {
                extraction.diagnostics.push(Diagnostic::error(format!(
                    "{}: {path}: skipped path item: {e}",
                    ctx.name
                )));
                continue;
            }
        };

        for method in METHODS {
            let Some(operation) = item.get(method) else {
                continue;
            };
            let operation_id = match operation.get("operationId").and_then(Value::as_str) {
                Some(id) if !id.trim().is_empty() => id.to_string(),
                _ => format!("{}_{path}", method.to_ascii_uppercase()),
            };

            let mut warnings = Vec::new();
            let result = shared.tool(
                path,
                method,
                &operation_id,
                item.get("parameters"),
                operation,
                &mut warnings,
            );
            extraction.diagnostics.extend(
                warnings
                    .into_iter()
                    .map(|w| Diagnostic::warning(format!("{}: {operation_id}: {w}", ctx.name))),
            );
            match result {
                Ok(tool) => extraction.tools.push(tool),
                Err(e) => extraction.diagnostics.push(Diagnostic::error(format!(
                    "{}: {operation_id}: skipped operation due to error: {e}",
                    ctx.name
                ))),
            }
        }
    }

    debug!(
        document = %ctx.name,
        tools = extraction.tools.len(),
        diagnostics = extraction.diagnostics.len(),
        "Extracted OpenAPI tools"
    );

    Ok(extraction)
}

struct OperationShared<'a> {
    ctx: &'a DocumentContext,
    refs: &'a document::Refs<'a>,
    global_security: Option<&'a Value>,
    server_env_var: &'a str,
    default_server_url: Option<&'a str>,
}

impl OperationShared<'_> {
    fn tool(
        &self,
        path: &str,
        method: &str,
        operation_id: &str,
        shared_parameters: Option<&Value>,
        operation: &Value,
        warnings: &mut Vec<String>,
    ) -> Result<HttpToolDefinition, String> {
        let operation = self.refs.deref(operation)?;
        let operation: &Map<String, Value> = operation
            .as_object()
            .ok_or_else(|| "operation must be a mapping".to_string())?;

        if operation
            .get("servers")
            .and_then(Value::as_array)
            .is_some_and(|servers| !servers.is_empty())
        {
            return Err("per-operation servers are not currently supported".to_string());
        }
        if operation.get("deprecated").and_then(Value::as_bool) == Some(true) {
            return Err("operation is deprecated".to_string());
        }
        if operation
            .get("operationId")
            .is_some_and(|id| !id.is_string() && !id.is_null())
        {
            return Err("operationId must be a string".to_string());
        }

        if let Some(body) = operation.get("requestBody") {
            let offered = self
                .refs
                .deref(body)
                .ok()
                .and_then(|body| body.get("content"))
                .and_then(Value::as_object)
                .map_or(0, Map::len);
            if offered > 1 {
                warnings.push("only one request body content type processed for operation".to_string());
            }
        }

        let descriptor = extensions::describe(&self.ctx.slug, operation_id, operation, warnings);
        if descriptor.name.is_empty() {
            return Err("operation produces an empty tool name".to_string());
        }

        let tags = match operation.get("tags") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|tag| {
                    tag.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| format!("tag {tag} is not a string"))
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err("tags must be a list".to_string()),
        };

        let input = schema::build_input_schema(self.refs, shared_parameters, operation)?;

        let security = operation
            .get("security")
            .or(self.global_security)
            .cloned();

        Ok(HttpToolDefinition {
            id: Uuid::new_v4(),
            deployment_id: self.ctx.deployment_id,
            project_id: self.ctx.project_id,
            openapi_document_id: self.ctx.document_id,
            asset_id: self.ctx.asset_id,
            name: descriptor.name,
            untruncated_name: descriptor.untruncated_name,
            path: path.to_string(),
            method: method.to_ascii_uppercase(),
            operation_id: operation_id.to_string(),
            summary: descriptor.summary,
            description: descriptor.description,
            tags,
            confirm: descriptor.confirm,
            confirm_prompt: descriptor.confirm_prompt,
            x_gram: descriptor.x_gram,
            original_name: descriptor.original_name,
            original_summary: descriptor.original_summary,
            original_description: descriptor.original_description,
            schema: input.schema,
            security,
            request_content_type: input.request_content_type,
            server_env_var: self.server_env_var.to_string(),
            default_server_url: self.default_server_url.map(str::to_string),
            created_at: Utc::now(),
        })
    }
}
