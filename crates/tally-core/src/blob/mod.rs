//! Blob storage for uploaded CSV files
//!
//! Blobs are addressed by container plus name. Names may contain `/` to
//! group uploads (`uploads/20250817-101500-august.csv`).
//!
//! - `MemoryBlobStore` keeps blobs in process
//! - `FsBlobStore` keeps one directory per container under a root

use async_trait::async_trait;

use crate::error::{Error, Result};

mod fs;
mod memory;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    async fn download_text(&self, container: &str, name: &str) -> Result<String>;

    /// Store text, replacing any existing blob with the same name
    async fn upload_text(&self, container: &str, name: &str, text: &str) -> Result<()>;
}

/// Reject names that could escape the container.
///
/// A bad name fails the same way on every attempt, so it is `InvalidData`.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidData("Blob name is empty".to_string()));
    }
    if name.starts_with('/') || name.split(['/', '\\']).any(|part| part == ".." || part.is_empty()) {
        return Err(Error::InvalidData(format!("Invalid blob name: {}", name)));
    }
    Ok(())
}
