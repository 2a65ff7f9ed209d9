//! Document loading and local reference handling.

use serde_json::{Map, Number, Value};

use super::OpenApiError;

/// Parse JSON or YAML bytes into a checked OpenAPI 3.x document.
///
/// Rejects documents that point outside themselves: every `$ref` must be a
/// local `#/...` pointer.
pub(crate) fn parse(bytes: &[u8]) -> Result<Value, OpenApiError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| OpenApiError::Parse("document is not valid UTF-8".to_string()))?;
    let text = text.trim_start_matches('\u{feff}').trim_start();
    if text.is_empty() {
        return Err(OpenApiError::Parse("document is empty".to_string()));
    }

    let doc = if text.starts_with('{') {
        serde_json::from_str::<Value>(text)
            .map_err(|e| OpenApiError::Parse(format!("invalid JSON: {e}")))?
    } else {
        let mut yaml: serde_yaml::Value = serde_yaml::from_str(text)
            .map_err(|e| OpenApiError::Parse(format!("invalid YAML: {e}")))?;
        yaml.apply_merge()
            .map_err(|e| OpenApiError::Parse(format!("invalid YAML: {e}")))?;
        yaml_to_json(yaml)?
    };

    if !doc.is_object() {
        return Err(OpenApiError::NotAnObject);
    }

    match doc.get("openapi") {
        None => {
            if let Some(swagger) = doc.get("swagger") {
                return Err(OpenApiError::UnsupportedVersion(scalar_text(swagger)));
            }
            return Err(OpenApiError::MissingVersion);
        }
        Some(Value::String(version)) if version.starts_with("3.") => {}
        Some(other) => return Err(OpenApiError::UnsupportedVersion(scalar_text(other))),
    }

    let mut location = Vec::new();
    if let Some((reference, at)) = find_external_ref(&doc, &mut location) {
        return Err(OpenApiError::ExternalReference {
            reference,
            location: at,
        });
    }

    Ok(doc)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn yaml_to_json(value: serde_yaml::Value) -> Result<Value, OpenApiError> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                n.as_f64()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| OpenApiError::Parse(format!("unsupported number {n}")))?
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut out = Map::with_capacity(mapping.len());
            for (key, value) in mapping {
                let key = match key {
                    Yaml::String(s) => s,
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    Yaml::Null => "null".to_string(),
                    _ => {
                        return Err(OpenApiError::Parse(
                            "mapping keys must be scalars".to_string(),
                        ));
                    }
                };
                out.insert(key, yaml_to_json(value)?);
            }
            Value::Object(out)
        }
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

/// First `$ref` that is not a local pointer, with its JSON pointer location.
fn find_external_ref(value: &Value, location: &mut Vec<String>) -> Option<(String, String)> {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("$ref") {
                if !reference.starts_with('#') {
                    return Some((reference.clone(), pointer_string(location)));
                }
            }
            for (key, child) in map {
                location.push(key.clone());
                let found = find_external_ref(child, location);
                location.pop();
                if found.is_some() {
                    return found;
                }
            }
            None
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                location.push(i.to_string());
                let found = find_external_ref(child, location);
                location.pop();
                if found.is_some() {
                    return found;
                }
            }
            None
        }
        _ => None,
    }
}

fn pointer_string(segments: &[String]) -> String {
    let mut out = String::from("#");
    for segment in segments {
        out.push('/');
        out.push_str(&segment.replace('~', "~0").replace('/', "~1"));
    }
    out
}

/// Resolves local `#/...` references against the document root.
pub(crate) struct Refs<'a> {
    root: &'a Value,
}

impl<'a> Refs<'a> {
    pub(crate) fn new(root: &'a Value) -> Self {
        Self { root }
    }

    fn target(&self, reference: &str) -> Result<&'a Value, String> {
        let pointer = reference
            .strip_prefix('#')
            .ok_or_else(|| format!("external reference {reference:?} is not supported"))?;
        if pointer.is_empty() {
            return Ok(self.root);
        }
        self.root
            .pointer(pointer)
            .ok_or_else(|| format!("unresolvable reference {reference:?}"))
    }

    /// Follow a chain of `$ref` objects to the first concrete value.
    pub(crate) fn deref<'v>(&self, value: &'v Value) -> Result<&'v Value, String>
    where
        'a: 'v,
    {
        let mut current = value;
        let mut seen: Vec<&str> = Vec::new();
        while let Some(reference) = current.get("$ref").and_then(Value::as_str) {
            if seen.contains(&reference) {
                return Err(format!("circular reference {reference:?}"));
            }
            seen.push(reference);
            current = self.target(reference)?;
        }
        Ok(current)
    }

    /// Deep copy of `value` with every local reference replaced by its target.
    ///
    /// Sibling keywords next to a `$ref` override the referenced object.
    pub(crate) fn inline(&self, value: &Value) -> Result<Value, String> {
        self.inline_with(value, &mut Vec::new())
    }

    fn inline_with(&self, value: &Value, stack: &mut Vec<String>) -> Result<Value, String> {
        match value {
            Value::Object(map) => {
                if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                    if stack.iter().any(|r| r == reference) {
                        return Err(format!("circular reference {reference:?}"));
                    }
                    let target = self.target(reference)?;
                    stack.push(reference.to_string());
                    let mut resolved = self.inline_with(target, stack)?;
                    if let Value::Object(resolved_map) = &mut resolved {
                        for (key, sibling) in map {
                            if key != "$ref" {
                                resolved_map.insert(key.clone(), self.inline_with(sibling, stack)?);
                            }
                        }
                    }
                    stack.pop();
                    return Ok(resolved);
                }

                let mut out = Map::with_capacity(map.len());
                for (key, child) in map {
                    out.insert(key.clone(), self.inline_with(child, stack)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.inline_with(item, stack))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }
}
