//! Tally Core Library
//!
//! Shared-expense ledger ingestion for the `tally` tool:
//! - CSV parsing with per-row validation
//! - Content-derived dedup keys and month-partitioned persistence
//! - Credit card balance reconciliation against a cutoff date
//! - Attribution of transactions to people and debt summaries
//! - Upload intake, work queue and the ingestion worker
//! - Pluggable keyed store, blob store, queue and notification backends
//! - Savings plans and payment reminders

pub mod blob;
pub mod config;
pub mod context;
pub mod dedup;
pub mod error;
pub mod import;
pub mod intake;
pub mod ledger;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod queue;
pub mod reconcile;
pub mod reminders;
pub mod services;
pub mod store;
pub mod worker;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use config::{Config, NotifyBackend, StorageBackend};
pub use context::{CancelHandle, RunContext};
pub use dedup::generate_key;
pub use error::{Error, Result};
pub use import::{parse_csv, ParseOutcome};
pub use intake::{parse_envelope, submit_csv, UploadEnvelope, UploadReceipt};
pub use ledger::Ledger;
pub use models::{
    CardSnapshot, Category, CreditCard, Group, IgnoredFrom, Person, SavingsData, SavingsItem,
    Transaction,
};
pub use notify::{DisabledNotifier, LogNotifier, Notifier, WebhookNotifier};
pub use pipeline::{Pipeline, RunOutcome, RunSummary};
pub use queue::{MemoryQueue, QueueMessage, QueueReceiver, QueueSender};
pub use reconcile::{compute_deltas, reconcile, ReconcileReport};
pub use reminders::{due_reminders, send_reminders, PaymentReminder, ReminderReport};
pub use services::Services;
pub use store::{Entity, KeyedStore, MemoryStore, SqliteStore};
pub use worker::{drain, DrainReport, WorkerOptions};
