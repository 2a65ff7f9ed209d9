//! Functions manifest parsing and validation
//!
//! `manifest.json` sits at the root of a functions archive and declares the
//! tools and resources the bundle exposes. Entries are kept as raw JSON until
//! validated so that every malformed entry can be reported, not just the first.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::FunctionsError;

/// Longest accepted tool name.
pub const MAX_TOOL_NAME_LENGTH: usize = 128;

/// Manifest as read from the archive
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub tools: Vec<Value>,

    #[serde(default)]
    pub resources: Vec<Value>,
}

/// Tools and resources of a manifest that passed validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedManifest {
    pub tools: Vec<ManifestTool>,
    pub resources: Vec<ManifestResource>,
}

/// A validated tool entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestTool {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub input_schema: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// A validated resource entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestResource {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub uri: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Manifest {
    /// Parse a manifest from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FunctionsError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| FunctionsError::InvalidManifest(e.to_string()))?;
        if !value.is_object() {
            return Err(FunctionsError::InvalidManifest(
                "manifest must be a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(|e| FunctionsError::InvalidManifest(e.to_string()))
    }

    /// Validate every tool and resource entry.
    ///
    /// Returns the tools and resources when all entries are well formed,
    /// otherwise every offense found across all entries.
    pub fn validate(&self) -> Result<ValidatedManifest, Vec<String>> {
        let mut offenses = Vec::new();
        let mut validated = ValidatedManifest::default();

        for (index, entry) in self.tools.iter().enumerate() {
            match validate_tool(entry) {
                Ok(tool) => validated.tools.push(tool),
                Err(problems) => offenses.extend(labelled("tool", index, entry, problems)),
            }
        }
        offenses.extend(duplicates(
            validated.tools.iter().map(|t| t.name.as_str()),
            "tool name",
        ));

        for (index, entry) in self.resources.iter().enumerate() {
            match validate_resource(entry) {
                Ok(resource) => validated.resources.push(resource),
                Err(problems) => offenses.extend(labelled("resource", index, entry, problems)),
            }
        }
        offenses.extend(duplicates(
            validated.resources.iter().map(|r| r.uri.as_str()),
            "resource uri",
        ));

        if offenses.is_empty() {
            Ok(validated)
        } else {
            Err(offenses)
        }
    }
}

fn labelled(kind: &str, index: usize, entry: &Value, problems: Vec<String>) -> Vec<String> {
    let label = entry
        .get("name")
        .and_then(Value::as_str)
        .map(|name| format!("{kind} {index} ({name:?})"))
        .unwrap_or_else(|| format!("{kind} {index}"));
    problems.into_iter().map(|p| format!("{label}: {p}")).collect()
}

fn duplicates<'a>(keys: impl Iterator<Item = &'a str>, what: &str) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for key in keys {
        *counts.entry(key).or_default() += 1;
    }
    let mut repeated: Vec<(&str, usize)> =
        counts.into_iter().filter(|(_, count)| *count > 1).collect();
    repeated.sort();
    repeated
        .into_iter()
        .map(|(key, count)| format!("{what} {key:?} is declared {count} times"))
        .collect()
}

/// Check a tool name against `[A-Za-z0-9_-]{1,128}`.
pub fn is_valid_tool_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_TOOL_NAME_LENGTH
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn validate_tool(entry: &Value) -> Result<ManifestTool, Vec<String>> {
    let Some(object) = entry.as_object() else {
        return Err(vec!["entry must be an object".to_string()]);
    };
    let mut problems = Vec::new();

    let name = match object.get("name") {
        Some(Value::String(name)) if is_valid_tool_name(name) => Some(name.clone()),
        Some(Value::String(name)) => {
            problems.push(format!(
                "name {name:?} must be 1 to {MAX_TOOL_NAME_LENGTH} letters, digits, '_' or '-'"
            ));
            None
        }
        Some(_) => {
            problems.push("name must be a string".to_string());
            None
        }
        None => {
            problems.push("name is required".to_string());
            None
        }
    };

    let description = optional_string(object, "description", &mut problems);

    let input_schema = match object.get("inputSchema") {
        Some(Value::Object(schema)) => Some(schema.clone()),
        Some(_) => {
            problems.push("inputSchema must be an object".to_string());
            None
        }
        None => {
            problems.push("inputSchema is required".to_string());
            None
        }
    };

    let variables = parse_variables(object, &mut problems);

    let meta = object.get("meta").filter(|meta| !meta.is_null()).cloned();

    match (name, input_schema) {
        (Some(name), Some(input_schema)) if problems.is_empty() => Ok(ManifestTool {
            name,
            description,
            input_schema,
            variables,
            meta,
        }),
        _ => Err(problems),
    }
}

fn validate_resource(entry: &Value) -> Result<ManifestResource, Vec<String>> {
    let Some(object) = entry.as_object() else {
        return Err(vec!["entry must be an object".to_string()]);
    };
    let mut problems = Vec::new();

    let name = match object.get("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => Some(name.clone()),
        Some(Value::String(_)) => {
            problems.push("name must not be empty".to_string());
            None
        }
        Some(_) => {
            problems.push("name must be a string".to_string());
            None
        }
        None => {
            problems.push("name is required".to_string());
            None
        }
    };

    let uri = match object.get("uri") {
        Some(Value::String(uri)) => match url::Url::parse(uri) {
            Ok(_) => Some(uri.clone()),
            Err(e) => {
                problems.push(format!("uri {uri:?} is not a valid URI: {e}"));
                None
            }
        },
        Some(_) => {
            problems.push("uri must be a string".to_string());
            None
        }
        None => {
            problems.push("uri is required".to_string());
            None
        }
    };

    let description = optional_string(object, "description", &mut problems);
    let title = optional_string(object, "title", &mut problems);
    let mime_type = optional_string(object, "mimeType", &mut problems);
    let variables = parse_variables(object, &mut problems);
    let meta = object.get("meta").filter(|meta| !meta.is_null()).cloned();

    match (name, uri) {
        (Some(name), Some(uri)) if problems.is_empty() => Ok(ManifestResource {
            name,
            description,
            uri,
            title,
            mime_type,
            variables,
            meta,
        }),
        _ => Err(problems),
    }
}

fn optional_string(
    object: &Map<String, Value>,
    field: &str,
    problems: &mut Vec<String>,
) -> Option<String> {
    match object.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(value)) => Some(value.clone()),
        Some(_) => {
            problems.push(format!("{field} must be a string"));
            None
        }
    }
}

fn parse_variables(
    object: &Map<String, Value>,
    problems: &mut Vec<String>,
) -> Option<Map<String, Value>> {
    match object.get("variables") {
        None | Some(Value::Null) => None,
        Some(Value::Object(variables)) => {
            for (key, attributes) in variables {
                if !attributes.is_object() {
                    problems.push(format!("variable {key:?} must be an object"));
                }
            }
            Some(variables.clone())
        }
        Some(_) => {
            problems.push("variables must be an object".to_string());
            None
        }
    }
}
