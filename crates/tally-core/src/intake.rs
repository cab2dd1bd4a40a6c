//! Upload intake and the queue message envelope
//!
//! An upload is stored as a blob and announced on the work queue with a
//! small JSON envelope naming the blob. The worker resolves the envelope
//! back to a blob name.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::blob::{validate_name, BlobStore};
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::queue::QueueSender;

/// Where uploads land inside the container
pub const UPLOAD_PREFIX: &str = "uploads";

/// Queue message body announcing an uploaded CSV
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEnvelope {
    #[serde(rename = "blobName", alias = "blob_name")]
    pub blob_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl UploadEnvelope {
    pub fn to_body(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Resolve a queue message body to its envelope.
///
/// Some producers JSON-encode the envelope twice, so a body that decodes to
/// a string is decoded again.
pub fn parse_envelope(body: &str) -> Result<UploadEnvelope> {
    let mut value: Value = serde_json::from_str(body.trim())
        .map_err(|e| Error::InvalidMessage(format!("Message body is not JSON: {}", e)))?;
    if let Value::String(inner) = &value {
        value = serde_json::from_str(inner)
            .map_err(|e| Error::InvalidMessage(format!("Message body is not JSON: {}", e)))?;
    }

    let envelope: UploadEnvelope = serde_json::from_value(value)
        .map_err(|e| Error::InvalidMessage(format!("Missing or malformed blobName: {}", e)))?;
    if envelope.blob_name.trim().is_empty() {
        return Err(Error::InvalidMessage("blobName is empty".to_string()));
    }
    validate_name(&envelope.blob_name)
        .map_err(|_| Error::InvalidMessage(format!("Malformed blobName: {}", envelope.blob_name)))?;
    Ok(envelope)
}

/// Blob name for an upload received at `now`
pub fn upload_blob_name(filename: &str, now: DateTime<Utc>) -> String {
    let base = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "..")
        .unwrap_or("upload.csv");
    format!("{}/{}-{}", UPLOAD_PREFIX, now.format("%Y%m%d-%H%M%S"), base)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub blob_name: String,
    pub message_id: String,
    pub bytes: usize,
}

/// Store an uploaded CSV and queue it for ingestion
#[allow(clippy::too_many_arguments)]
pub async fn submit_csv(
    blobs: &dyn BlobStore,
    queue: &dyn QueueSender,
    ctx: &RunContext,
    container: &str,
    queue_name: &str,
    max_bytes: usize,
    filename: &str,
    csv_text: &str,
) -> Result<UploadReceipt> {
    if csv_text.is_empty() {
        return Err(Error::InvalidData("Upload is empty".to_string()));
    }
    if csv_text.len() > max_bytes {
        return Err(Error::InvalidData(format!(
            "Upload is {} bytes, limit is {}",
            csv_text.len(),
            max_bytes
        )));
    }

    let blob_name = upload_blob_name(filename, Utc::now());
    ctx.guard("upload blob", blobs.upload_text(container, &blob_name, csv_text))
        .await?;

    let body = UploadEnvelope {
        blob_name: blob_name.clone(),
        filename: Some(filename.to_string()),
    }
    .to_body()?;
    let message_id = ctx.guard("enqueue upload", queue.enqueue(queue_name, &body)).await?;

    info!(blob_name = %blob_name, message_id = %message_id, bytes = csv_text.len(), "Queued upload");
    Ok(UploadReceipt {
        blob_name,
        message_id,
        bytes: csv_text.len(),
    })
}
