//! Default [`ObjectStore`] backed by the local filesystem. An S3-backed implementation lives in
//! the deploying binary crate, injected through the same trait seam.

use async_trait::async_trait;

use crate::collaborators::ObjectStore;
use crate::error::HandlerError;

pub struct LocalObjectStore;

impl LocalObjectStore {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn delete(&self, storage_path: &str) -> Result<(), HandlerError> {
        match tokio::fs::remove_file(storage_path).await {
            Ok(()) => Ok(()),
            // "object not found" is success.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HandlerError::storage(format!("failed to delete {storage_path}: {e}"))),
        }
    }

    async fn exists(&self, storage_path: &str) -> Result<bool, HandlerError> {
        Ok(tokio::fs::metadata(storage_path).await.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delete_missing_file_is_success() {
        let store = LocalObjectStore::new();
        store.delete("/tmp/dipc-definitely-does-not-exist-12345").await.unwrap();
    }

    #[tokio::test]
    async fn exists_reflects_filesystem_state() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let store = LocalObjectStore::new();
        assert!(store.exists(tmp.path().to_str().unwrap()).await.unwrap());
        let path = tmp.path().to_path_buf();
        drop(tmp);
        assert!(!store.exists(path.to_str().unwrap()).await.unwrap());
    }
}
