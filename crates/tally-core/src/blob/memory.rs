//! In-process blob store

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{validate_name, BlobStore};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<(String, String), String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names stored in a container, sorted
    pub fn names(&self, container: &str) -> Vec<String> {
        let Ok(blobs) = self.blobs.lock() else {
            return Vec::new();
        };
        let mut names: Vec<String> = blobs
            .keys()
            .filter(|(c, _)| c == container)
            .map(|(_, n)| n.clone())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn download_text(&self, container: &str, name: &str) -> Result<String> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| Error::Blob("Blob store lock poisoned".to_string()))?;
        blobs
            .get(&(container.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::Blob(format!("Blob not found: {}/{}", container, name)))
    }

    async fn upload_text(&self, container: &str, name: &str, text: &str) -> Result<()> {
        validate_name(name)?;
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| Error::Blob("Blob store lock poisoned".to_string()))?;
        blobs.insert((container.to_string(), name.to_string()), text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_then_download() {
        let store = MemoryBlobStore::new();
        store.upload_text("data", "uploads/a.csv", "hello").await.unwrap();
        assert_eq!(store.download_text("data", "uploads/a.csv").await.unwrap(), "hello");
        assert_eq!(store.names("data"), vec!["uploads/a.csv".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_blob() {
        let store = MemoryBlobStore::new();
        let err = store.download_text("data", "missing.csv").await.unwrap_err();
        assert!(matches!(err, Error::Blob(_)));
        assert!(err.is_retryable());
    }
}
