//! `gram validate`: check a deployment config file

use std::path::Path;

use anyhow::{Result, bail};
use gram_core::config::{DeploymentConfig, SourceLocation};

/// Load and validate the config, then check that local sources exist.
pub fn run_validate(config_path: &Path) -> Result<DeploymentConfig> {
    let config = DeploymentConfig::load(config_path)?;

    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let missing: Vec<String> = config
        .sources
        .iter()
        .filter_map(|source| match source.resolve_location(base_dir) {
            SourceLocation::Path(path) if !path.exists() => {
                Some(format!("{}: {} does not exist", source.slug, path.display()))
            }
            _ => None,
        })
        .collect();

    if !missing.is_empty() {
        bail!("Missing source files:\n  - {}", missing.join("\n  - "));
    }

    Ok(config)
}
