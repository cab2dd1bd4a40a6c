//! Queue backed by the `queue_messages` table of a `SqliteStore`

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tracing::warn;

use super::{new_message_id, poison_queue_name, QueueMessage, QueueReceiver, QueueSender};
use crate::error::Result;
use crate::store::SqliteStore;

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[async_trait]
impl QueueSender for SqliteStore {
    async fn enqueue(&self, queue: &str, body: &str) -> Result<String> {
        let (queue, body) = (queue.to_string(), body.to_string());
        self.blocking(move |conn| {
            let id = new_message_id();
            conn.execute(
                "INSERT INTO queue_messages (id, queue_name, body, visible_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, queue, body, now_millis()],
            )?;
            Ok(id)
        })
        .await
    }
}

#[async_trait]
impl QueueReceiver for SqliteStore {
    async fn receive(&self, queue: &str, visibility: Duration) -> Result<Option<QueueMessage>> {
        let queue = queue.to_string();
        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

            let now = now_millis();
            let found: Option<(String, String, u32)> = tx
                .query_row(
                    "SELECT id, body, dequeue_count FROM queue_messages
                     WHERE queue_name = ?1 AND visible_at <= ?2
                     ORDER BY seq LIMIT 1",
                    params![queue, now],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            let Some((id, body, count)) = found else {
                return Ok(None);
            };

            let dequeue_count = count + 1;
            let hidden_until = now + i64::try_from(visibility.as_millis()).unwrap_or(i64::MAX / 2);
            tx.execute(
                "UPDATE queue_messages SET dequeue_count = ?1, visible_at = ?2 WHERE id = ?3",
                params![dequeue_count, hidden_until, id],
            )?;
            tx.commit()?;

            Ok(Some(QueueMessage {
                id,
                queue,
                body,
                dequeue_count,
            }))
        })
        .await
    }

    async fn complete(&self, message: &QueueMessage) -> Result<()> {
        let id = message.id.clone();
        self.blocking(move |conn| {
            conn.execute("DELETE FROM queue_messages WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
    }

    async fn abandon(&self, message: &QueueMessage) -> Result<()> {
        let id = message.id.clone();
        self.blocking(move |conn| {
            conn.execute(
                "UPDATE queue_messages SET visible_at = ?1 WHERE id = ?2",
                params![now_millis(), id],
            )?;
            Ok(())
        })
        .await
    }

    async fn dead_letter(&self, message: &QueueMessage, reason: &str) -> Result<()> {
        let id = message.id.clone();
        let poison = poison_queue_name(&message.queue);
        let moved = self
            .blocking(move |conn| {
                Ok(conn.execute(
                    "UPDATE queue_messages SET queue_name = ?1, dequeue_count = 0, visible_at = ?2 WHERE id = ?3",
                    params![poison, now_millis(), id],
                )?)
            })
            .await?;
        if moved > 0 {
            warn!(id = %message.id, queue = %message.queue, reason, "Message moved to poison queue");
        }
        Ok(())
    }

    async fn depth(&self, queue: &str) -> Result<usize> {
        let queue = queue.to_string();
        let count: i64 = self
            .blocking(move |conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM queue_messages WHERE queue_name = ?1",
                    params![queue],
                    |row| row.get(0),
                )?)
            })
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIS: Duration = Duration::from_secs(300);

    #[tokio::test]
    async fn test_receive_hides_and_counts() {
        let store = SqliteStore::in_memory().unwrap();
        store.enqueue("process-queue", "{\"blobName\":\"a.csv\"}").await.unwrap();

        let m = store.receive("process-queue", VIS).await.unwrap().unwrap();
        assert_eq!(m.dequeue_count, 1);
        assert!(store.receive("process-queue", VIS).await.unwrap().is_none());

        store.abandon(&m).await.unwrap();
        let again = store.receive("process-queue", VIS).await.unwrap().unwrap();
        assert_eq!(again.id, m.id);
        assert_eq!(again.dequeue_count, 2);

        store.complete(&again).await.unwrap();
        assert_eq!(store.depth("process-queue").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_order_is_fifo() {
        let store = SqliteStore::in_memory().unwrap();
        store.enqueue("q", "1").await.unwrap();
        store.enqueue("q", "2").await.unwrap();
        let first = store.receive("q", VIS).await.unwrap().unwrap();
        let second = store.receive("q", VIS).await.unwrap().unwrap();
        assert_eq!(first.body, "1");
        assert_eq!(second.body, "2");
    }

    #[tokio::test]
    async fn test_dead_letter() {
        let store = SqliteStore::in_memory().unwrap();
        store.enqueue("q", "bad").await.unwrap();
        let m = store.receive("q", VIS).await.unwrap().unwrap();
        store.dead_letter(&m, "unparseable").await.unwrap();

        assert_eq!(store.depth("q").await.unwrap(), 0);
        assert_eq!(store.depth("q-poison").await.unwrap(), 1);
        let poisoned = store.receive("q-poison", VIS).await.unwrap().unwrap();
        assert_eq!(poisoned.body, "bad");
    }
}
