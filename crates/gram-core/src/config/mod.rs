//! Deployment config files (`gram.deploy.json`)
//!
//! A config lists the OpenAPI documents and functions archives that make up
//! a deployment. The CLI builds one incrementally with `stage` and checks it
//! with `validate`.

pub mod parser;
pub mod schema;

use std::path::Path;

use anyhow::Result;

pub use parser::{load_config, open_or_new, parse_config_str, save_config};
pub use schema::{
    CONFIG_SCHEMA_VERSION, CONFIG_TYPE_DEPLOYMENT, DeploymentConfig, Source, SourceLocation,
    SourceType,
};

/// Default config file name in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "gram.deploy.json";

impl DeploymentConfig {
    /// See [`load_config`].
    pub fn load(path: &Path) -> Result<Self> {
        load_config(path)
    }

    /// See [`save_config`].
    pub fn save(&self, path: &Path) -> Result<()> {
        save_config(self, path)
    }
}
