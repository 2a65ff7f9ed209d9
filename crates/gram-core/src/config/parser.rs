//! Reading and writing deployment config files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::debug;

use super::schema::{CONFIG_TYPE_DEPLOYMENT, DeploymentConfig, SourceLocation};

/// Parse config JSON without validating it.
pub fn parse_config_str(content: &str) -> Result<DeploymentConfig> {
    serde_json::from_str(content).context("Failed to decode deployment config")
}

/// Load, validate and resolve a deployment config.
///
/// Every validation problem is reported in one error. Relative source
/// locations are rewritten against the config file's directory.
pub fn load_config(path: &Path) -> Result<DeploymentConfig> {
    let mut config = read_config(path)?;

    let problems = config.problems();
    if !problems.is_empty() {
        bail!(
            "Invalid deployment config {}:\n  - {}",
            path.display(),
            problems.join("\n  - ")
        );
    }

    let base_dir = config_dir(path);
    for source in &mut config.sources {
        if let SourceLocation::Path(resolved) = source.resolve_location(&base_dir) {
            source.location = resolved.display().to_string();
        }
    }

    debug!(path = %path.display(), sources = config.sources.len(), "Loaded deployment config");
    Ok(config)
}

/// Open an existing config for amendment, or start a new one.
///
/// An existing file only needs to decode and carry the deployment type;
/// sources are validated once the config is complete.
pub fn open_or_new(path: &Path) -> Result<DeploymentConfig> {
    if !path.exists() {
        return Ok(DeploymentConfig::new());
    }

    let config = read_config(path)?;
    if config.config_type != CONFIG_TYPE_DEPLOYMENT {
        bail!(
            "Invalid config type {:?} in {}",
            config.config_type,
            path.display()
        );
    }
    Ok(config)
}

/// Write the config as pretty JSON.
pub fn save_config(config: &DeploymentConfig, path: &Path) -> Result<()> {
    let mut content =
        serde_json::to_string_pretty(config).context("Failed to serialize deployment config")?;
    content.push('\n');

    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))
}

fn read_config(path: &Path) -> Result<DeploymentConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn config_dir(path: &Path) -> PathBuf {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Source;
    use tempfile::TempDir;

    const VALID: &str = r#"{
  "schema_version": "1.0.0",
  "type": "deployment",
  "sources": [
    {"type": "openapiv3", "location": "specs/todo.yaml", "name": "Todo", "slug": "todo"},
    {"type": "function", "location": "https://cdn.example.com/fns.zip", "name": "Fns", "slug": "fns", "runtime": "nodejs:22"},
    {"type": "openapiv3", "location": "/srv/petstore.json", "name": "Petstore", "slug": "petstore"}
  ]
}"#;

    #[test]
    fn test_load_resolves_relative_locations() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gram.deploy.json");
        std::fs::write(&path, VALID).unwrap();

        let config = load_config(&path).unwrap();
        let base = std::fs::canonicalize(dir.path()).unwrap();

        assert_eq!(
            config.sources[0].location,
            base.join("specs/todo.yaml").display().to_string()
        );
        assert_eq!(config.sources[1].location, "https://cdn.example.com/fns.zip");
        assert_eq!(config.sources[2].location, "/srv/petstore.json");
    }

    #[test]
    fn test_load_reports_every_problem() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gram.deploy.json");
        std::fs::write(
            &path,
            r#"{
  "schema_version": "0.9.0",
  "type": "deployment",
  "sources": [
    {"type": "openapiv3", "location": "a.yaml", "name": "Same", "slug": "Bad Slug"},
    {"type": "function", "location": "b.zip", "name": "Same", "slug": "b"}
  ]
}"#,
        )
        .unwrap();

        let message = format!("{:#}", load_config(&path).unwrap_err());
        assert!(message.contains("unsupported schema version \"0.9.0\""));
        assert!(message.contains("sources[0]: invalid slug \"Bad Slug\""));
        assert!(message.contains("sources[1]: source of type 'function' is missing required field 'runtime'"));
        assert!(message.contains("source names must be unique: ['Same' (2 times)]"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load_config(&dir.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(parse_config_str("{ not json").is_err());
        assert!(parse_config_str(r#"{"schema_version": "1.0.0", "type": "deployment", "sources": [{"type": "graphql"}]}"#).is_err());
    }

    #[test]
    fn test_stage_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gram.deploy.json");

        let mut config = open_or_new(&path).unwrap();
        assert!(config.sources.is_empty());
        config.add_source(Source::openapi("Todo", "todo", "todo.yaml"));
        save_config(&config, &path).unwrap();

        let mut reopened = open_or_new(&path).unwrap();
        reopened.add_source(Source::function("Fns", "fns", "fns.zip", "nodejs:22"));
        save_config(&reopened, &path).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.sources.len(), 2);
        assert_eq!(loaded.sources[1].runtime.as_deref(), Some("nodejs:22"));
        assert!(std::fs::read_to_string(&path).unwrap().ends_with("}\n"));
    }

    #[test]
    fn test_open_rejects_other_config_types() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gram.deploy.json");
        std::fs::write(
            &path,
            r#"{"schema_version": "1.0.0", "type": "toolset", "sources": []}"#,
        )
        .unwrap();

        let err = open_or_new(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid config type \"toolset\""));
    }
}
