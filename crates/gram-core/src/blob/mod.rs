//! Read-only access to uploaded assets
//!
//! Assets are addressed by project and asset id; how bytes are laid out in
//! the backing storage is the implementation's concern.

mod fs;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

pub use fs::FsBlobStore;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("asset {0} not found")]
    NotFound(BlobKey),

    #[error("failed to read asset {key}: {source}")]
    Io {
        key: BlobKey,
        #[source]
        source: std::io::Error,
    },
}

/// Opaque reference to one uploaded asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobKey {
    pub project_id: Uuid,
    pub asset_id: Uuid,
}

impl BlobKey {
    pub fn new(project_id: Uuid, asset_id: Uuid) -> Self {
        Self {
            project_id,
            asset_id,
        }
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "projects/{}/assets/{}", self.project_id, self.asset_id)
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn read(&self, key: &BlobKey) -> Result<Vec<u8>, BlobError>;
}

/// In-memory blob store for development and testing
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<BlobKey, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store bytes under `key`, replacing anything already there.
    pub async fn put(&self, key: BlobKey, bytes: impl Into<Vec<u8>>) {
        self.blobs.write().await.insert(key, bytes.into());
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn read(&self, key: &BlobKey) -> Result<Vec<u8>, BlobError> {
        self.blobs
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or(BlobError::NotFound(*key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryBlobStore::new();
        let key = BlobKey::new(Uuid::new_v4(), Uuid::new_v4());

        assert!(matches!(
            store.read(&key).await,
            Err(BlobError::NotFound(_))
        ));

        store.put(key, b"openapi: 3.0.0".to_vec()).await;
        assert_eq!(store.read(&key).await.unwrap(), b"openapi: 3.0.0");
    }

    #[test]
    fn test_key_display() {
        let project = Uuid::nil();
        let asset = Uuid::from_u128(1);
        assert_eq!(
            BlobKey::new(project, asset).to_string(),
            format!("projects/{project}/assets/{asset}")
        );
    }
}
