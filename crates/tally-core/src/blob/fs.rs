//! Local filesystem blob store

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{validate_name, BlobStore};
use crate::error::{Error, Result};

/// Blobs stored as files under `<root>/<container>/<name>`
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a new filesystem store
    ///
    /// Creates the root directory if it doesn't exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| {
                Error::Blob(format!(
                    "Failed to create blob directory {}: {}",
                    root.display(),
                    e
                ))
            })?;
            info!("Created blob directory: {}", root.display());
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, container: &str, name: &str) -> Result<PathBuf> {
        validate_name(container)?;
        validate_name(name)?;
        Ok(self.root.join(container).join(name))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn download_text(&self, container: &str, name: &str) -> Result<String> {
        let path = self.blob_path(container, name)?;

        if !path.exists() {
            return Err(Error::Blob(format!("Blob not found: {}/{}", container, name)));
        }

        let bytes = tokio::fs::read(&path).await?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                // Bank exports are sometimes Latin-1; bad bytes become U+FFFD
                warn!(path = %path.display(), "Blob is not valid UTF-8, decoding lossily");
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };
        debug!(path = %path.display(), bytes = text.len(), "Downloaded blob");
        Ok(text)
    }

    async fn upload_text(&self, container: &str, name: &str, text: &str) -> Result<()> {
        let path = self.blob_path(container, name)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, text).await?;

        info!("Stored blob: {}", path.display());
        Ok(())
    }
}
