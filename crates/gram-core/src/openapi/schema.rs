//! Tool input schemas built from operation parameters and request bodies.

use serde_json::{Map, Value, json};

use super::document::Refs;

/// Parameter locations grouped into the tool input, in output order.
const GROUPS: [(&str, &str); 3] = [
    ("path", "pathParameters"),
    ("query", "queryParameters"),
    ("header", "headerParameters"),
];

/// Request body media types in order of preference.
const BODY_MEDIA_TYPES: [&str; 4] = [
    "application/json",
    "application/x-www-form-urlencoded",
    "multipart/form-data",
    "text/plain",
];

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OperationInput {
    pub schema: Value,
    pub request_content_type: Option<String>,
}

#[derive(Debug, Clone)]
struct Parameter {
    name: String,
    location: String,
    required: bool,
    schema: Value,
}

/// Build the input schema for one operation.
///
/// `shared` holds the path item's `parameters`; an operation parameter with
/// the same name and location replaces the shared one.
pub(crate) fn build_input_schema(
    refs: &Refs<'_>,
    shared: Option<&Value>,
    operation: &Map<String, Value>,
) -> Result<OperationInput, String> {
    let mut parameters = collect_parameters(refs, shared)?;
    for parameter in collect_parameters(refs, operation.get("parameters"))? {
        match parameters
            .iter_mut()
            .find(|p| p.name == parameter.name && p.location == parameter.location)
        {
            Some(existing) => *existing = parameter,
            None => parameters.push(parameter),
        }
    }

    let mut properties = Map::new();
    let mut required = Vec::new();

    for (location, group_name) in GROUPS {
        let members: Vec<&Parameter> = parameters.iter().filter(|p| p.location == location).collect();
        if members.is_empty() {
            continue;
        }
        let mut group_properties = Map::new();
        let mut group_required = Vec::new();
        for parameter in members {
            group_properties.insert(parameter.name.clone(), parameter.schema.clone());
            if parameter.required {
                group_required.push(Value::String(parameter.name.clone()));
            }
        }
        if !group_required.is_empty() {
            required.push(Value::String(group_name.to_string()));
        }
        properties.insert(group_name.to_string(), object_schema(group_properties, group_required));
    }

    let mut request_content_type = None;
    if let Some(body) = operation.get("requestBody") {
        if let Some(body) = request_body(refs, body)? {
            if body.required {
                required.push(Value::String("body".to_string()));
            }
            properties.insert("body".to_string(), body.schema);
            request_content_type = Some(body.content_type);
        }
    }

    Ok(OperationInput {
        schema: object_schema(properties, required),
        request_content_type,
    })
}

fn object_schema(properties: Map<String, Value>, required: Vec<Value>) -> Value {
    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), Value::Array(required));
    }
    schema.insert("additionalProperties".to_string(), json!(false));
    Value::Object(schema)
}

fn collect_parameters(refs: &Refs<'_>, list: Option<&Value>) -> Result<Vec<Parameter>, String> {
    let items = match list {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err("parameters must be a list".to_string()),
    };

    let mut parameters = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let item = refs.deref(item)?;
        let object = item
            .as_object()
            .ok_or_else(|| format!("parameter {index} must be an object"))?;

        let name = object
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| format!("parameter {index} is missing a name"))?;
        let location = object
            .get("in")
            .and_then(Value::as_str)
            .ok_or_else(|| format!("parameter {name:?} is missing its location"))?;

        match location {
            "path" | "query" | "header" => {}
            "cookie" => continue,
            other => return Err(format!("parameter {name:?} has unsupported location {other:?}")),
        }

        let required = object.get("required").and_then(Value::as_bool).unwrap_or(false);

        let mut schema = match (object.get("schema"), object.get("content")) {
            (Some(schema), _) => refs.inline(schema)?,
            (None, Some(Value::Object(content))) => content
                .values()
                .find_map(|media| media.get("schema"))
                .map(|schema| refs.inline(schema))
                .transpose()?
                .unwrap_or_else(|| json!({"type": "string"})),
            _ => json!({"type": "string"}),
        };

        if let (Some(description), Value::Object(schema_map)) =
            (object.get("description"), &mut schema)
        {
            if !schema_map.contains_key("description") {
                schema_map.insert("description".to_string(), description.clone());
            }
        }

        parameters.push(Parameter {
            name: name.to_string(),
            location: location.to_string(),
            required,
            schema,
        });
    }

    Ok(parameters)
}

struct RequestBody {
    schema: Value,
    content_type: String,
    required: bool,
}

fn request_body(refs: &Refs<'_>, body: &Value) -> Result<Option<RequestBody>, String> {
    let body = refs.deref(body)?;
    let Some(object) = body.as_object() else {
        return Err("request body must be an object".to_string());
    };
    let content = match object.get("content") {
        Some(Value::Object(content)) if !content.is_empty() => content,
        _ => return Ok(None),
    };

    let Some((content_type, media)) = select_media_type(content) else {
        let offered: Vec<&str> = content.keys().map(String::as_str).collect();
        return Err(format!(
            "unsupported request body content types: {}",
            offered.join(", ")
        ));
    };

    let mut schema = match media.get("schema") {
        Some(schema) => refs.inline(schema)?,
        None => json!({}),
    };
    if let (Some(description), Value::Object(schema_map)) =
        (object.get("description"), &mut schema)
    {
        if !schema_map.contains_key("description") {
            schema_map.insert("description".to_string(), description.clone());
        }
    }

    Ok(Some(RequestBody {
        schema,
        content_type: content_type.to_string(),
        required: object.get("required").and_then(Value::as_bool).unwrap_or(false),
    }))
}

fn select_media_type(content: &Map<String, Value>) -> Option<(&str, &Value)> {
    let essence = |key: &str| {
        key.split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    };

    let find = |wanted: &str| {
        content
            .iter()
            .find(|(key, _)| essence(key) == wanted)
            .map(|(key, media)| (key.as_str(), media))
    };

    find(BODY_MEDIA_TYPES[0])
        .or_else(|| {
            content
                .iter()
                .find(|(key, _)| essence(key).ends_with("+json"))
                .map(|(key, media)| (key.as_str(), media))
        })
        .or_else(|| BODY_MEDIA_TYPES[1..].iter().find_map(|wanted| find(*wanted)))
}
