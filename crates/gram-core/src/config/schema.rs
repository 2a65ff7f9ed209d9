//! Deployment config file schema

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::validation::{MAX_NAME_LENGTH, SUPPORTED_RUNTIMES, is_supported_runtime, is_valid_slug};

pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
pub const SUPPORTED_SCHEMA_VERSIONS: &[&str] = &[CONFIG_SCHEMA_VERSION];
pub const CONFIG_TYPE_DEPLOYMENT: &str = "deployment";

/// Kind of asset a source points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    #[serde(rename = "openapiv3")]
    OpenApiV3,
    #[serde(rename = "function")]
    Function,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::OpenApiV3 => "openapiv3",
            SourceType::Function => "function",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One asset to deploy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub source_type: SourceType,

    /// Local path or `http(s)` URL of the asset.
    pub location: String,

    pub name: String,

    pub slug: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
}

/// Where a source's bytes live once resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Path(PathBuf),
    Url(Url),
}

impl Source {
    pub fn openapi(
        name: impl Into<String>,
        slug: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            source_type: SourceType::OpenApiV3,
            location: location.into(),
            name: name.into(),
            slug: slug.into(),
            runtime: None,
        }
    }

    pub fn function(
        name: impl Into<String>,
        slug: impl Into<String>,
        location: impl Into<String>,
        runtime: impl Into<String>,
    ) -> Self {
        Self {
            source_type: SourceType::Function,
            location: location.into(),
            name: name.into(),
            slug: slug.into(),
            runtime: Some(runtime.into()),
        }
    }

    /// Offenses of this source alone, each phrased as a full sentence.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("source is missing required field 'name'".to_string());
        } else if self.name.chars().count() > MAX_NAME_LENGTH {
            problems.push(format!(
                "source name must be at most {MAX_NAME_LENGTH} characters"
            ));
        }

        if self.slug.is_empty() {
            problems.push("source is missing required field 'slug'".to_string());
        } else if !is_valid_slug(&self.slug) {
            problems.push(format!(
                "invalid slug {:?}: use lowercase letters, digits and single hyphens",
                self.slug
            ));
        }

        if self.location.trim().is_empty() {
            problems.push("source is missing required field 'location'".to_string());
        }

        if self.source_type == SourceType::Function {
            match self.runtime.as_deref().map(str::trim) {
                None | Some("") => problems.push(
                    "source of type 'function' is missing required field 'runtime'".to_string(),
                ),
                Some(runtime) if !is_supported_runtime(runtime) => problems.push(format!(
                    "unsupported runtime {runtime:?} (expected one of: {})",
                    SUPPORTED_RUNTIMES.join(", ")
                )),
                Some(_) => {}
            }
        }

        problems
    }

    /// Classify the location, joining relative paths onto `base_dir`.
    pub fn resolve_location(&self, base_dir: &Path) -> SourceLocation {
        match Url::parse(&self.location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                return SourceLocation::Url(url);
            }
            _ => {}
        }

        let path = Path::new(&self.location);
        if path.is_absolute() {
            SourceLocation::Path(path.to_path_buf())
        } else {
            SourceLocation::Path(base_dir.join(path))
        }
    }
}

/// Contents of a `gram.deploy.json` file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub schema_version: String,

    #[serde(rename = "type")]
    pub config_type: String,

    #[serde(default)]
    pub sources: Vec<Source>,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DeploymentConfig {
    /// Empty config at the current schema version.
    pub fn new() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION.to_string(),
            config_type: CONFIG_TYPE_DEPLOYMENT.to_string(),
            sources: Vec::new(),
        }
    }

    /// Add a source, replacing any existing source with the same slug.
    pub fn add_source(&mut self, source: Source) {
        match self.sources.iter_mut().find(|s| s.slug == source.slug) {
            Some(existing) => *existing = source,
            None => self.sources.push(source),
        }
    }

    /// Every offense in the config; empty when the config is valid.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if !SUPPORTED_SCHEMA_VERSIONS.contains(&self.schema_version.as_str()) {
            problems.push(format!(
                "unsupported schema version {:?} (expected one of: {})",
                self.schema_version,
                SUPPORTED_SCHEMA_VERSIONS.join(", ")
            ));
        }

        if self.config_type != CONFIG_TYPE_DEPLOYMENT {
            problems.push(format!(
                "invalid config type {:?} (expected {CONFIG_TYPE_DEPLOYMENT:?})",
                self.config_type
            ));
        }

        if self.sources.is_empty() {
            problems.push("at least one source is required".to_string());
        }

        for (i, source) in self.sources.iter().enumerate() {
            for problem in source.problems() {
                problems.push(format!("sources[{i}]: {problem}"));
            }
        }

        if let Some(duplicates) = duplicates(self.sources.iter().map(|s| s.name.as_str())) {
            problems.push(format!("source names must be unique: {duplicates}"));
        }
        if let Some(duplicates) = duplicates(self.sources.iter().map(|s| s.slug.as_str())) {
            problems.push(format!("source slugs must be unique: {duplicates}"));
        }

        problems
    }
}

/// `['a' (2 times), 'b' (3 times)]` in first-seen order, or `None`.
fn duplicates<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut order = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values.filter(|v| !v.is_empty()) {
        let count = counts.entry(value).or_insert(0);
        if *count == 0 {
            order.push(value);
        }
        *count += 1;
    }

    let listed: Vec<String> = order
        .into_iter()
        .filter_map(|value| {
            let count = counts.get(value).copied().unwrap_or(0);
            (count > 1).then(|| format!("'{value}' ({count} times)"))
        })
        .collect();

    if listed.is_empty() {
        None
    } else {
        Some(format!("[{}]", listed.join(", ")))
    }
}
