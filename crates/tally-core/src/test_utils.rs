//! Test utilities for tally-core
//!
//! A notifier that records what it was asked to send, and a keyed store
//! wrapper that injects failures into chosen operations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::Group;
use crate::notify::Notifier;
use crate::reminders::PaymentReminder;
use crate::store::{BatchAction, Entity, KeyedStore, Query};

/// One call made to a `RecordingNotifier`
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Summary {
        recipients: Vec<String>,
        /// (name, total expenses) per member
        expenses: Vec<(String, String)>,
        row_errors: Vec<String>,
    },
    ValidationFailure {
        recipients: Vec<String>,
        row_errors: Vec<String>,
    },
    PaymentReminders {
        recipients: Vec<String>,
        reminders: Vec<PaymentReminder>,
    },
}

/// Records every notification; optionally fails them all
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every send fails with `Error::Notification`
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn record(&self, sent: Sent) -> Result<()> {
        if self.fail {
            return Err(Error::Notification("relay down".to_string()));
        }
        self.sent
            .lock()
            .map_err(|_| Error::Notification("recorder poisoned".to_string()))?
            .push(sent);
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send_summary(&self, recipients: &[String], group: &Group, row_errors: &[String]) -> Result<()> {
        self.record(Sent::Summary {
            recipients: recipients.to_vec(),
            expenses: group
                .members
                .iter()
                .map(|p| (p.name.clone(), p.expenses(None).to_string()))
                .collect(),
            row_errors: row_errors.to_vec(),
        })
    }

    async fn send_validation_failure(&self, recipients: &[String], row_errors: &[String]) -> Result<()> {
        self.record(Sent::ValidationFailure {
            recipients: recipients.to_vec(),
            row_errors: row_errors.to_vec(),
        })
    }

    async fn send_payment_reminders(&self, recipients: &[String], reminders: &[PaymentReminder]) -> Result<()> {
        self.record(Sent::PaymentReminders {
            recipients: recipients.to_vec(),
            reminders: reminders.to_vec(),
        })
    }
}

/// Wraps a store and fails selected operations with `Error::Storage`
pub struct FaultyStore {
    inner: Arc<dyn KeyedStore>,
    batches_before_failure: Option<usize>,
    failing_list_table: Option<String>,
    fail_updates: bool,
    batches: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn KeyedStore>) -> Self {
        Self {
            inner,
            batches_before_failure: None,
            failing_list_table: None,
            fail_updates: false,
            batches: AtomicUsize::new(0),
        }
    }

    /// Let `successes` batches through, then fail every later one
    pub fn fail_batches_after(mut self, successes: usize) -> Self {
        self.batches_before_failure = Some(successes);
        self
    }

    /// Fail every listing of `table`
    pub fn fail_list(mut self, table: &str) -> Self {
        self.failing_list_table = Some(table.to_string());
        self
    }

    pub fn fail_updates(mut self) -> Self {
        self.fail_updates = true;
        self
    }

    fn injected(op: &str) -> Error {
        Error::Storage(format!("injected {} failure", op))
    }
}

#[async_trait]
impl KeyedStore for FaultyStore {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn create_table(&self, table: &str) -> Result<()> {
        self.inner.create_table(table).await
    }

    async fn upsert_entity(&self, table: &str, entity: Entity) -> Result<()> {
        self.inner.upsert_entity(table, entity).await
    }

    async fn submit_batch(&self, table: &str, actions: Vec<BatchAction>) -> Result<()> {
        let done = self.batches.fetch_add(1, Ordering::SeqCst);
        if self.batches_before_failure.is_some_and(|n| done >= n) {
            return Err(Self::injected("batch"));
        }
        self.inner.submit_batch(table, actions).await
    }

    async fn list_entities(&self, table: &str, query: &Query) -> Result<Vec<Entity>> {
        if self.failing_list_table.as_deref() == Some(table) {
            return Err(Self::injected("list"));
        }
        self.inner.list_entities(table, query).await
    }

    async fn get_entity(&self, table: &str, partition_key: &str, row_key: &str) -> Result<Option<Entity>> {
        self.inner.get_entity(table, partition_key, row_key).await
    }

    async fn update_entity(&self, table: &str, entity: Entity, if_match: Option<&str>) -> Result<String> {
        if self.fail_updates {
            return Err(Self::injected("update"));
        }
        self.inner.update_entity(table, entity, if_match).await
    }

    async fn delete_entity(&self, table: &str, partition_key: &str, row_key: &str) -> Result<()> {
        self.inner.delete_entity(table, partition_key, row_key).await
    }
}
