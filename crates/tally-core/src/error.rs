//! Error types for Tally

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Blob error: {0}")]
    Blob(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Invalid queue message: {0}")]
    InvalidMessage(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Cancelled during {0}")]
    Cancelled(String),

    #[error("Deadline exceeded during {0}")]
    DeadlineExceeded(String),
}

impl Error {
    /// Whether redelivering the same unit of work could succeed.
    ///
    /// Malformed input and bad configuration fail the same way every time,
    /// so the queue should not redeliver them.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::InvalidMessage(_) | Error::InvalidData(_) | Error::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
