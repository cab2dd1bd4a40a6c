//! In-process queue

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::warn;

use super::{new_message_id, poison_queue_name, QueueMessage, QueueReceiver, QueueSender};
use crate::error::{Error, Result};

#[derive(Debug)]
struct Stored {
    id: String,
    body: String,
    dequeue_count: u32,
    visible_at: Instant,
}

#[derive(Debug, Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, VecDeque<Stored>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, VecDeque<Stored>>>> {
        self.queues
            .lock()
            .map_err(|_| Error::Queue("Queue lock poisoned".to_string()))
    }

    /// Bodies in a queue, oldest first
    pub fn bodies(&self, queue: &str) -> Vec<String> {
        self.lock()
            .map(|queues| {
                queues
                    .get(queue)
                    .map(|q| q.iter().map(|m| m.body.clone()).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }
}

fn push(queues: &mut HashMap<String, VecDeque<Stored>>, queue: &str, id: String, body: String) {
    queues.entry(queue.to_string()).or_default().push_back(Stored {
        id,
        body,
        dequeue_count: 0,
        visible_at: Instant::now(),
    });
}

fn take(queues: &mut HashMap<String, VecDeque<Stored>>, message: &QueueMessage) -> Option<Stored> {
    let q = queues.get_mut(&message.queue)?;
    let pos = q.iter().position(|m| m.id == message.id)?;
    q.remove(pos)
}

#[async_trait]
impl QueueSender for MemoryQueue {
    async fn enqueue(&self, queue: &str, body: &str) -> Result<String> {
        let id = new_message_id();
        push(&mut *self.lock()?, queue, id.clone(), body.to_string());
        Ok(id)
    }
}

#[async_trait]
impl QueueReceiver for MemoryQueue {
    async fn receive(&self, queue: &str, visibility: Duration) -> Result<Option<QueueMessage>> {
        let mut queues = self.lock()?;
        let Some(q) = queues.get_mut(queue) else {
            return Ok(None);
        };
        let now = Instant::now();
        let Some(stored) = q.iter_mut().find(|m| m.visible_at <= now) else {
            return Ok(None);
        };
        stored.dequeue_count += 1;
        stored.visible_at = now + visibility;
        Ok(Some(QueueMessage {
            id: stored.id.clone(),
            queue: queue.to_string(),
            body: stored.body.clone(),
            dequeue_count: stored.dequeue_count,
        }))
    }

    async fn complete(&self, message: &QueueMessage) -> Result<()> {
        take(&mut *self.lock()?, message);
        Ok(())
    }

    async fn abandon(&self, message: &QueueMessage) -> Result<()> {
        let mut queues = self.lock()?;
        if let Some(stored) = queues
            .get_mut(&message.queue)
            .and_then(|q| q.iter_mut().find(|m| m.id == message.id))
        {
            stored.visible_at = Instant::now();
        }
        Ok(())
    }

    async fn dead_letter(&self, message: &QueueMessage, reason: &str) -> Result<()> {
        let mut queues = self.lock()?;
        if let Some(stored) = take(&mut queues, message) {
            warn!(id = %message.id, queue = %message.queue, reason, "Message moved to poison queue");
            push(&mut queues, &poison_queue_name(&message.queue), stored.id, stored.body);
        }
        Ok(())
    }

    async fn depth(&self, queue: &str) -> Result<usize> {
        Ok(self.lock()?.get(queue).map_or(0, |q| q.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIS: Duration = Duration::from_secs(300);

    #[tokio::test]
    async fn test_fifo_and_complete() {
        let queue = MemoryQueue::new();
        queue.enqueue("q", "first").await.unwrap();
        queue.enqueue("q", "second").await.unwrap();

        let m = queue.receive("q", VIS).await.unwrap().unwrap();
        assert_eq!(m.body, "first");
        assert_eq!(m.dequeue_count, 1);
        queue.complete(&m).await.unwrap();

        let m = queue.receive("q", VIS).await.unwrap().unwrap();
        assert_eq!(m.body, "second");
        assert_eq!(queue.depth("q").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_received_message_is_hidden_until_abandoned() {
        let queue = MemoryQueue::new();
        queue.enqueue("q", "only").await.unwrap();

        let m = queue.receive("q", VIS).await.unwrap().unwrap();
        assert!(queue.receive("q", VIS).await.unwrap().is_none());

        queue.abandon(&m).await.unwrap();
        let again = queue.receive("q", VIS).await.unwrap().unwrap();
        assert_eq!(again.id, m.id);
        assert_eq!(again.dequeue_count, 2);
    }

    #[tokio::test]
    async fn test_dead_letter_moves_to_poison_queue() {
        let queue = MemoryQueue::new();
        queue.enqueue("q", "bad").await.unwrap();
        let m = queue.receive("q", VIS).await.unwrap().unwrap();
        queue.dead_letter(&m, "malformed").await.unwrap();

        assert_eq!(queue.depth("q").await.unwrap(), 0);
        assert_eq!(queue.bodies("q-poison"), vec!["bad".to_string()]);
    }

    #[tokio::test]
    async fn test_receive_from_unknown_queue() {
        let queue = MemoryQueue::new();
        assert!(queue.receive("nothing", VIS).await.unwrap().is_none());
    }
}
