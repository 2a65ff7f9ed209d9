//! Filesystem-backed blob store
//!
//! Assets live at `<root>/projects/<project_id>/assets/<asset_id>`, written by
//! the upload service.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{BlobError, BlobKey, BlobStore};

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of an asset on disk.
    pub fn path_for(&self, key: &BlobKey) -> PathBuf {
        self.root
            .join("projects")
            .join(key.project_id.to_string())
            .join("assets")
            .join(key.asset_id.to_string())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn read(&self, key: &BlobKey) -> Result<Vec<u8>, BlobError> {
        let path = self.path_for(key);
        debug!(path = %path.display(), "Reading asset");
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BlobError::NotFound(*key)),
            Err(source) => Err(BlobError::Io { key: *key, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_reads_asset_from_layout() {
        let temp = TempDir::new().unwrap();
        let store = FsBlobStore::new(temp.path());
        let key = BlobKey::new(Uuid::new_v4(), Uuid::new_v4());

        let path = store.path_for(&key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{}").unwrap();

        assert_eq!(store.read(&key).await.unwrap(), b"{}");
    }

    #[tokio::test]
    async fn test_missing_asset_is_not_found() {
        let temp = TempDir::new().unwrap();
        let store = FsBlobStore::new(temp.path());
        let key = BlobKey::new(Uuid::new_v4(), Uuid::new_v4());

        assert!(matches!(
            store.read(&key).await,
            Err(BlobError::NotFound(k)) if k == key
        ));
    }
}
