//! HTTP client for the deployment API

use anyhow::{Context, Result, bail};
use gram_core::deployments::{Deployment, DeploymentLogs};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://app.getgram.ai";
pub const KEY_PREFIX: &str = "gram";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    kind: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct DeploymentLookup {
    deployment: Option<Deployment>,
}

/// Authenticated API client; one `reqwest::Client` per process.
#[derive(Debug, Clone)]
pub struct GramClient {
    http: reqwest::Client,
    base_url: Url,
}

impl GramClient {
    pub fn new(api_url: &str, api_key: &str, project: Option<&str>) -> Result<Self> {
        if !api_key.starts_with(KEY_PREFIX) {
            bail!("API key must start with {KEY_PREFIX:?}");
        }

        let base_url =
            Url::parse(api_url).with_context(|| format!("Invalid API URL: {api_url}"))?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .context("API key contains invalid characters")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        if let Some(project) = project {
            headers.insert(
                "gram-project",
                HeaderValue::from_str(project).context("Invalid project slug")?,
            );
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("gram-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http, base_url })
    }

    pub async fn get_deployment(&self, id: &str) -> Result<Deployment> {
        self.get(&format!("deployments/{id}")).await
    }

    pub async fn get_latest_deployment(&self) -> Result<Option<Deployment>> {
        let lookup: DeploymentLookup = self.get("deployments/latest").await?;
        Ok(lookup.deployment)
    }

    pub async fn get_deployment_logs(&self, id: &str) -> Result<DeploymentLogs> {
        self.get(&format!("deployments/{id}/logs")).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self
            .base_url
            .join(path)
            .with_context(|| format!("Invalid request path: {path}"))?;

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            match serde_json::from_str::<ErrorBody>(&text) {
                Ok(body) => bail!("{} ({}): {}", status, body.kind, body.message),
                Err(_) => bail!("{status}: {text}"),
            }
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to decode response from {url}"))
    }
}
