//! Document-level servers and security schemes.

use serde_json::Value;
use url::Url;
use uuid::Uuid;

use super::DocumentContext;
use super::document::Refs;
use crate::naming::env_var_name;
use crate::store::HttpSecurityScheme;
use crate::types::Diagnostic;

/// First declared server usable as a default base URL.
///
/// Servers with variables are passed over; malformed and non-https URLs are
/// reported as warnings.
pub(crate) fn default_server_url(
    doc: &Value,
    ctx: &DocumentContext,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<String> {
    let servers = doc.get("servers")?.as_array()?;
    for server in servers {
        let Some(raw) = server.get("url").and_then(Value::as_str) else {
            continue;
        };
        let has_variables = server
            .get("variables")
            .and_then(Value::as_object)
            .is_some_and(|vars| !vars.is_empty());
        if has_variables {
            continue;
        }

        match Url::parse(raw) {
            Ok(url) if url.scheme() == "https" => return Some(raw.to_string()),
            Ok(_) => diagnostics.push(Diagnostic::warning(format!(
                "{}: {raw}: skipping non-https server url",
                ctx.name
            ))),
            Err(e) => diagnostics.push(Diagnostic::warning(format!(
                "{}: {raw}: skipping server due to malformed url: {e}",
                ctx.name
            ))),
        }
    }
    None
}

/// Rows for `components.securitySchemes`, with the environment variables a
/// toolset needs to supply credentials for each.
pub(crate) fn security_schemes(
    refs: &Refs<'_>,
    doc: &Value,
    ctx: &DocumentContext,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<HttpSecurityScheme> {
    let Some(schemes) = doc
        .pointer("/components/securitySchemes")
        .and_then(Value::as_object)
    else {
        return Vec::new();
    };

    let mut rows = Vec::with_capacity(schemes.len());
    for (key, raw) in schemes {
        let scheme = match refs.deref(raw) {
            Ok(scheme) => scheme,
            Err(e) => {
                diagnostics.push(Diagnostic::error(format!(
                    "{}: error resolving security scheme {key}: {e}",
                    ctx.name
                )));
                continue;
            }
        };

        match classify(&ctx.slug, key, scheme) {
            Ok((env_variables, oauth_types)) => rows.push(HttpSecurityScheme {
                id: Uuid::new_v4(),
                deployment_id: ctx.deployment_id,
                project_id: ctx.project_id,
                openapi_document_id: ctx.document_id,
                key: key.clone(),
                scheme_type: text(scheme, "type").unwrap_or_default(),
                name: text(scheme, "name"),
                in_placement: text(scheme, "in"),
                scheme: text(scheme, "scheme"),
                env_variables,
                oauth_types,
            }),
            Err(reason) => diagnostics.push(Diagnostic::error(format!(
                "{}: security scheme {key}: {reason}",
                ctx.name
            ))),
        }
    }

    rows
}

fn text(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn classify(slug: &str, key: &str, scheme: &Value) -> Result<(Vec<String>, Vec<String>), String> {
    let var = |suffix: &str| env_var_name(&format!("{slug}_{key}{suffix}"));
    let scheme_type = scheme.get("type").and_then(Value::as_str).unwrap_or_default();

    match scheme_type {
        "apiKey" => Ok((vec![var("")], Vec::new())),
        "http" => match scheme
            .get("scheme")
            .and_then(Value::as_str)
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("bearer") => Ok((vec![var("")], Vec::new())),
            Some("basic") => Ok((vec![var("_USERNAME"), var("_PASSWORD")], Vec::new())),
            other => Err(format!(
                "unsupported http security scheme: {}",
                other.unwrap_or("<missing>")
            )),
        },
        "openIdConnect" => Ok((vec![var("_ACCESS_TOKEN")], Vec::new())),
        "oauth2" => {
            let flows = scheme.get("flows");
            let has = |flow: &str| flows.and_then(|f| f.get(flow)).is_some();

            let mut env = Vec::new();
            let mut types = Vec::new();
            if has("authorizationCode") || has("clientCredentials") || has("implicit") {
                env.push(var("_ACCESS_TOKEN"));
            }
            if has("clientCredentials") {
                types.push("client_credentials".to_string());
                env.push(var("_CLIENT_SECRET"));
                env.push(var("_CLIENT_ID"));
                env.push(var("_TOKEN_URL"));
            }
            if has("implicit") {
                types.push("implicit".to_string());
            }
            if has("authorizationCode") {
                types.push("authorization_code".to_string());
            }
            if types.is_empty() {
                return Err("unsupported oauth2 security scheme: no supported flows found".to_string());
            }
            Ok((env, types))
        }
        "" => Err("security scheme is missing its type".to_string()),
        other => Err(format!("unsupported security scheme type: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DiagnosticLevel;
    use serde_json::json;

    fn ctx() -> DocumentContext {
        DocumentContext {
            project_id: Uuid::new_v4(),
            deployment_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            asset_id: Uuid::new_v4(),
            name: "Petstore".to_string(),
            slug: "petstore-api".to_string(),
        }
    }

    #[test]
    fn test_default_server_skips_insecure_and_templated() {
        let doc = json!({
            "servers": [
                {"url": "http://insecure.example.com"},
                {"url": "https://{region}.example.com", "variables": {"region": {"default": "us"}}},
                {"url": "/relative"},
                {"url": "https://api.example.com/v1"}
            ]
        });
        let mut diagnostics = Vec::new();
        let url = default_server_url(&doc, &ctx(), &mut diagnostics);
        assert_eq!(url.as_deref(), Some("https://api.example.com/v1"));
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|d| d.level == DiagnosticLevel::Warning));
    }

    #[test]
    fn test_security_scheme_env_vars() {
        let doc = json!({
            "components": {"securitySchemes": {
                "api_key": {"type": "apiKey", "name": "X-API-Key", "in": "header"},
                "basicAuth": {"type": "http", "scheme": "basic"},
                "oauth": {"type": "oauth2", "flows": {"clientCredentials": {"tokenUrl": "https://auth.example.com/token", "scopes": {}}}},
                "mutual": {"type": "mutualTLS"}
            }}
        });
        let refs = Refs::new(&doc);
        let mut diagnostics = Vec::new();
        let rows = security_schemes(&refs, &doc, &ctx(), &mut diagnostics);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].key, "api_key");
        assert_eq!(rows[0].env_variables, vec!["PETSTORE_API_API_KEY"]);
        assert_eq!(rows[0].in_placement.as_deref(), Some("header"));
        assert_eq!(
            rows[1].env_variables,
            vec!["PETSTORE_API_BASIC_AUTH_USERNAME", "PETSTORE_API_BASIC_AUTH_PASSWORD"]
        );
        assert_eq!(rows[2].oauth_types, vec!["client_credentials"]);
        assert_eq!(rows[2].env_variables[0], "PETSTORE_API_OAUTH_ACCESS_TOKEN");

        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("mutualTLS"));
    }
}
