//! Per-operation tool overrides from `x-gram` and `x-speakeasy-mcp`.
//!
//! `x-gram` wins when both are present. A malformed extension is ignored
//! with a warning and the operation keeps its own name and text.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::naming::{MAX_TOOL_NAME_LENGTH, sanitize_tool_name, truncate_with_hash};
use crate::types::ConfirmMode;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GramExtension {
    name: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    confirm: Option<String>,
    confirm_prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SpeakeasyExtension {
    name: Option<String>,
    description: Option<String>,
}

/// Name and text of the tool generated for one operation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ToolDescriptor {
    pub name: String,
    pub untruncated_name: String,
    pub summary: String,
    pub description: String,
    pub confirm: ConfirmMode,
    pub confirm_prompt: Option<String>,
    pub x_gram: bool,
    pub original_name: Option<String>,
    pub original_summary: Option<String>,
    pub original_description: Option<String>,
}

pub(crate) fn describe(
    slug: &str,
    operation_id: &str,
    operation: &Map<String, Value>,
    warnings: &mut Vec<String>,
) -> ToolDescriptor {
    let untruncated_name = sanitize_tool_name(&format!("{slug}_{operation_id}"));
    let name = truncate_with_hash(&untruncated_name, MAX_TOOL_NAME_LENGTH);
    let summary = text(operation, "summary");
    let description = text(operation, "description");

    let plain = ToolDescriptor {
        name: name.clone(),
        untruncated_name,
        summary: summary.clone(),
        description: description.clone(),
        confirm: ConfirmMode::Always,
        confirm_prompt: None,
        x_gram: false,
        original_name: None,
        original_summary: None,
        original_description: None,
    };

    let gram = decode::<GramExtension>(operation, "x-gram", warnings);
    let (overrides, x_gram) = match gram {
        Some(ext) => (ext, true),
        None => match decode::<SpeakeasyExtension>(operation, "x-speakeasy-mcp", warnings) {
            Some(SpeakeasyExtension {
                name: None,
                description: None,
            })
            | None => return plain,
            Some(ext) => (
                GramExtension {
                    name: ext.name,
                    description: ext.description,
                    ..GramExtension::default()
                },
                false,
            ),
        },
    };

    let confirm = match overrides.confirm.as_deref() {
        None => ConfirmMode::Always,
        Some(raw) => ConfirmMode::parse(raw).unwrap_or_else(|| {
            warnings.push(format!("invalid tool confirmation mode {raw:?}, using \"always\""));
            ConfirmMode::Always
        }),
    };

    let custom_name = overrides
        .name
        .as_deref()
        .map(sanitize_tool_name)
        .filter(|n| !n.is_empty())
        .map(|n| truncate_with_hash(&n, MAX_TOOL_NAME_LENGTH));

    ToolDescriptor {
        name: custom_name.unwrap_or_else(|| name.clone()),
        untruncated_name: plain.untruncated_name,
        summary: overrides.summary.unwrap_or_else(|| summary.clone()),
        description: overrides.description.unwrap_or_else(|| description.clone()),
        confirm,
        confirm_prompt: overrides.confirm_prompt,
        x_gram,
        original_name: non_empty(name),
        original_summary: non_empty(summary),
        original_description: non_empty(description),
    }
}

fn decode<T: for<'de> Deserialize<'de>>(
    operation: &Map<String, Value>,
    key: &str,
    warnings: &mut Vec<String>,
) -> Option<T> {
    let raw = operation.get(key)?;
    match serde_json::from_value(raw.clone()) {
        Ok(ext) => Some(ext),
        Err(e) => {
            warnings.push(format!("error parsing {key} extension: {e}"));
            None
        }
    }
}

fn text(operation: &Map<String, Value>, field: &str) -> String {
    operation
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}
