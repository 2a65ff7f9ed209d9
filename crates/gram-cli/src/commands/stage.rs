//! `gram stage`: build a deployment config one source at a time

use std::path::Path;

use anyhow::{Context, Result, bail};
use gram_core::config::{Source, open_or_new, save_config};
use gram_core::validation::{SUPPORTED_RUNTIMES, is_supported_runtime, is_valid_slug};
use tracing::info;

/// Source to add to a config file
#[derive(Debug, Clone)]
pub struct StageOptions {
    pub slug: String,
    pub name: Option<String>,
    pub location: String,
    /// Present for functions archives only.
    pub runtime: Option<String>,
}

/// Add (or replace) a source and write the config back.
pub fn run_stage(config_path: &Path, opts: StageOptions) -> Result<Source> {
    if !is_valid_slug(&opts.slug) {
        bail!(
            "invalid slug {:?}: use lowercase letters, digits and single hyphens",
            opts.slug
        );
    }
    if opts.location.trim().is_empty() {
        bail!("location is required");
    }

    let name = opts
        .name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| opts.slug.clone());

    let source = match opts.runtime {
        Some(runtime) => {
            if !is_supported_runtime(&runtime) {
                bail!(
                    "unsupported runtime {runtime:?} (expected one of: {})",
                    SUPPORTED_RUNTIMES.join(", ")
                );
            }
            Source::function(name, opts.slug, opts.location, runtime)
        }
        None => Source::openapi(name, opts.slug, opts.location),
    };

    let mut config = open_or_new(config_path)
        .with_context(|| format!("Invalid config file {}", config_path.display()))?;
    config.add_source(source.clone());
    save_config(&config, config_path)?;

    info!(
        slug = %source.slug,
        source_type = %source.source_type,
        config = %config_path.display(),
        "Staged source"
    );
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gram_core::config::{DeploymentConfig, SourceType};
    use tempfile::TempDir;

    fn opts(slug: &str, runtime: Option<&str>) -> StageOptions {
        StageOptions {
            slug: slug.to_string(),
            name: None,
            location: format!("{slug}.bin"),
            runtime: runtime.map(str::to_string),
        }
    }

    #[test]
    fn test_stage_creates_and_amends_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gram.deploy.json");

        let source = run_stage(&path, opts("todo", None)).unwrap();
        assert_eq!(source.name, "todo");
        assert_eq!(source.source_type, SourceType::OpenApiV3);

        run_stage(&path, opts("fns", Some("nodejs:22"))).unwrap();

        let config = DeploymentConfig::load(&path).unwrap();
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[1].runtime.as_deref(), Some("nodejs:22"));
    }

    #[test]
    fn test_stage_rejects_bad_input() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gram.deploy.json");

        assert!(run_stage(&path, opts("Bad Slug", None)).is_err());
        assert!(run_stage(&path, opts("fns", Some("ruby:3"))).is_err());
        assert!(!path.exists());
    }
}
