//! API key authentication

use std::collections::HashMap;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use gram_core::error::ServiceError;
use gram_core::types::AuthContext;

use crate::config::ApiKeyConfig;
use crate::error::ApiError;
use crate::state::AppState;

/// Every API key starts with this prefix.
pub const KEY_PREFIX: &str = "gram";

/// Resolves a presented API key to a caller identity
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, key: &str) -> Option<AuthContext>;
}

/// Fixed set of keys from the server config
#[derive(Debug, Default)]
pub struct StaticKeyAuthenticator {
    keys: HashMap<String, AuthContext>,
}

impl StaticKeyAuthenticator {
    pub fn new(entries: &[ApiKeyConfig]) -> Self {
        let keys = entries
            .iter()
            .filter(|entry| entry.key.starts_with(KEY_PREFIX))
            .map(|entry| {
                let mut auth = AuthContext::new(&entry.user_id, &entry.organization_id);
                auth.project_id = entry.project_id;
                (entry.key.clone(), auth)
            })
            .collect();
        Self { keys }
    }
}

#[async_trait]
impl Authenticator for StaticKeyAuthenticator {
    async fn authenticate(&self, key: &str) -> Option<AuthContext> {
        if !key.starts_with(KEY_PREFIX) {
            return None;
        }
        self.keys.get(key).cloned()
    }
}

/// Caller identity of an authenticated request
#[derive(Debug, Clone)]
pub struct Authenticated(pub AuthContext);

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ServiceError::unauthorized("missing api key"))?;

        let auth = state
            .authenticator
            .authenticate(key)
            .await
            .ok_or_else(|| ServiceError::unauthorized("invalid api key"))?;

        Ok(Authenticated(auth))
    }
}
