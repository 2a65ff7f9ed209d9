//! Server configuration

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use gram_core::workflow::RetryPolicy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Contents of the server's TOML config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ListenConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding uploaded assets as `{project_id}/{asset_id}`.
    #[serde(default = "default_blob_root")]
    pub blob_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blob_root: default_blob_root(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub keys: Vec<ApiKeyConfig>,
}

/// One accepted API key and the identity it resolves to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    pub key: String,
    pub user_id: String,
    pub organization_id: String,
    #[serde(default)]
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

impl WorkflowConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            ..RetryPolicy::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_blob_root() -> PathBuf {
    PathBuf::from("./data/assets")
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

impl ServerConfig {
    /// Load from `path`, or use defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read server config: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse server config: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        for entry in &config.auth.keys {
            anyhow::ensure!(
                entry.key.starts_with(crate::auth::KEY_PREFIX),
                "API key for user {:?} must start with {:?}",
                entry.user_id,
                crate::auth::KEY_PREFIX
            );
        }
        Ok(config)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid listen address: {}:{}",
                    self.server.host, self.server.port
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.workflow.max_attempts, 3);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.auth.keys.is_empty());
        assert_eq!(
            config.listen_addr().unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_load_full_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[server]
host = "0.0.0.0"
port = 9000

[storage]
blob_root = "/var/lib/gram/assets"

[[auth.keys]]
key = "gram_local_abc"
user_id = "user-1"
organization_id = "org-1"
project_id = "6f1d3a52-5b8e-4c57-9a0c-4f5c3d2e1b00"

[workflow]
max_attempts = 5
initial_backoff_ms = 50

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = ServerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage.blob_root, PathBuf::from("/var/lib/gram/assets"));
        assert_eq!(config.auth.keys.len(), 1);
        assert!(config.auth.keys[0].project_id.is_some());
        assert_eq!(config.logging.format, LogFormat::Json);

        let policy = config.workflow.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_backoff, Duration::from_millis(50));
    }

    #[test]
    fn test_rejects_keys_without_prefix() {
        let err = ServerConfig::from_toml(
            r#"
[[auth.keys]]
key = "secret"
user_id = "user-1"
organization_id = "org-1"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("must start with"));
    }

    #[test]
    fn test_missing_file() {
        let err = ServerConfig::load(Some(Path::new("/nonexistent/gram-server.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read server config"));
    }
}
