//! Identifier normalization for tool names, resource URNs and environment
//! variables.

use sha2::{Digest, Sha256};

/// Longest tool name handed to MCP clients.
pub const MAX_TOOL_NAME_LENGTH: usize = 60;

/// Hex characters of the digest appended to a truncated name.
const HASH_SUFFIX_LENGTH: usize = 8;

/// Normalize an identifier to `[a-z0-9_]+`.
///
/// camelCase boundaries become underscores, runs of other characters collapse
/// to a single `_`, and leading/trailing separators are dropped.
pub fn sanitize_tool_name(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut pending_separator = false;

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_ascii_alphanumeric() {
            pending_separator = true;
            continue;
        }

        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_is_lower)
            {
                pending_separator = true;
            }
        }

        if pending_separator && !out.is_empty() {
            out.push('_');
        }
        pending_separator = false;
        out.push(c.to_ascii_lowercase());
    }

    out
}

/// Cut `input` to `max_len` bytes, replacing the tail with a short sha256
/// digest of the full value so distinct long names stay distinct.
pub fn truncate_with_hash(input: &str, max_len: usize) -> String {
    if input.len() <= max_len {
        return input.to_string();
    }

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hex::encode(hasher.finalize());
    let suffix = &digest[..HASH_SUFFIX_LENGTH];
    if max_len < HASH_SUFFIX_LENGTH {
        return suffix.to_string();
    }

    let mut cut = max_len - HASH_SUFFIX_LENGTH;
    while !input.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{suffix}", &input[..cut])
}

/// `SCREAMING_SNAKE_CASE` form used for environment variable names.
pub fn env_var_name(input: &str) -> String {
    sanitize_tool_name(input).to_ascii_uppercase()
}

/// Stable identifier of a function resource: `resources:function:{slug}:{uri}`
/// with the URI reduced to lowercase dash-separated parts.
pub fn resource_urn(slug: &str, uri: &str) -> String {
    format!("resources:function:{slug}:{}", uri_slug(uri))
}

fn uri_slug(uri: &str) -> String {
    let Ok(parsed) = url::Url::parse(uri) else {
        return uri_fragment(uri);
    };

    let mut parts = vec![uri_fragment(parsed.scheme())];
    if let Some(host) = parsed.host_str() {
        parts.push(uri_fragment(host));
    }
    let path = parsed.path().trim_matches('/');
    if !path.is_empty() {
        parts.push(uri_fragment(&path.replace('/', "-")));
    }
    if let Some(query) = parsed.query() {
        parts.push(uri_fragment(&query.replace(['&', '='], "-")));
    }
    parts.retain(|p| !p.is_empty());
    parts.join("-")
}

/// Lowercase `[a-z0-9_-]` with runs of other characters collapsed to `-`.
fn uri_fragment(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches(|c| c == '-' || c == '_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_slug_and_operation() {
        assert_eq!(sanitize_tool_name("test-doc_get_todos"), "test_doc_get_todos");
        assert_eq!(sanitize_tool_name("todo-api_getTodoById"), "todo_api_get_todo_by_id");
        assert_eq!(sanitize_tool_name("petstore_listPets"), "petstore_list_pets");
    }

    #[test]
    fn test_sanitize_collapses_and_trims() {
        assert_eq!(sanitize_tool_name("__a--b  c__"), "a_b_c");
        assert_eq!(sanitize_tool_name("get /users/{id}"), "get_users_id");
        assert_eq!(sanitize_tool_name("---"), "");
    }

    #[test]
    fn test_sanitize_acronyms_and_digits() {
        assert_eq!(sanitize_tool_name("getHTTPServer"), "get_http_server");
        assert_eq!(sanitize_tool_name("v2Users"), "v2_users");
        assert_eq!(sanitize_tool_name("ID"), "id");
    }

    #[test]
    fn test_truncate_with_hash() {
        assert_eq!(truncate_with_hash("short_name", MAX_TOOL_NAME_LENGTH), "short_name");

        let exact = "a".repeat(MAX_TOOL_NAME_LENGTH);
        assert_eq!(truncate_with_hash(&exact, MAX_TOOL_NAME_LENGTH), exact);

        let long_a = format!("{}_one", "x".repeat(70));
        let long_b = format!("{}_two", "x".repeat(70));
        let cut_a = truncate_with_hash(&long_a, MAX_TOOL_NAME_LENGTH);
        let cut_b = truncate_with_hash(&long_b, MAX_TOOL_NAME_LENGTH);
        assert_eq!(cut_a.len(), MAX_TOOL_NAME_LENGTH);
        assert!(cut_a.starts_with(&"x".repeat(52)));
        assert_ne!(cut_a, cut_b);
        assert_eq!(truncate_with_hash(&long_a, MAX_TOOL_NAME_LENGTH), cut_a);

        assert_eq!(truncate_with_hash(&long_a, 4).len(), 8);
    }

    #[test]
    fn test_env_var_name() {
        assert_eq!(env_var_name("test-doc_SERVER_URL"), "TEST_DOC_SERVER_URL");
        assert_eq!(env_var_name("petstore-api_bearerAuth"), "PETSTORE_API_BEARER_AUTH");
    }

    #[test]
    fn test_resource_urn() {
        assert_eq!(
            resource_urn("docs", "file:///docs/readme.md"),
            "resources:function:docs:file-docs-readme-md"
        );
        assert_eq!(
            resource_urn("app", "postgres://DB.local/users?version=v1&format=json"),
            "resources:function:app:postgres-db-local-users-version-v1-format-json"
        );
        assert_eq!(resource_urn("app", "screen://"), "resources:function:app:screen");
    }
}
