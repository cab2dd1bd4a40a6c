//! Work queue between upload intake and the ingestion worker
//!
//! Delivery is at-least-once: a received message stays invisible for the
//! visibility timeout and comes back unless it is completed. Messages
//! received too many times are moved to `<queue>-poison`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

mod memory;
mod sqlite;

pub use memory::MemoryQueue;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: String,
    pub queue: String,
    pub body: String,
    /// Times this message has been received, including this one
    pub dequeue_count: u32,
}

#[async_trait]
pub trait QueueSender: Send + Sync {
    /// Enqueue a message body, returning the message id
    async fn enqueue(&self, queue: &str, body: &str) -> Result<String>;
}

#[async_trait]
pub trait QueueReceiver: Send + Sync {
    /// Receive the oldest visible message and hide it for `visibility`
    async fn receive(&self, queue: &str, visibility: Duration) -> Result<Option<QueueMessage>>;

    /// Remove a processed message
    async fn complete(&self, message: &QueueMessage) -> Result<()>;

    /// Make a message visible again immediately
    async fn abandon(&self, message: &QueueMessage) -> Result<()>;

    /// Move a message to the poison queue
    async fn dead_letter(&self, message: &QueueMessage, reason: &str) -> Result<()>;

    /// Messages waiting in a queue, visible or not
    async fn depth(&self, queue: &str) -> Result<usize>;
}

/// Name of the queue that holds messages that could not be processed
pub fn poison_queue_name(queue: &str) -> String {
    format!("{}-poison", queue)
}

pub(crate) fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
