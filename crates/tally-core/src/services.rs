//! Backend wiring
//!
//! The only place that looks at `storage.backend`. Everything downstream
//! works against the capability traits.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::blob::{BlobStore, FsBlobStore, MemoryBlobStore};
use crate::config::{Config, StorageBackend};
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::intake::{submit_csv, UploadReceipt};
use crate::ledger::Ledger;
use crate::notify::{self, Notifier};
use crate::pipeline::Pipeline;
use crate::queue::{MemoryQueue, QueueReceiver, QueueSender};
use crate::store::{KeyedStore, MemoryStore, SqliteStore};
use crate::worker::WorkerOptions;

#[derive(Clone)]
pub struct Services {
    pub config: Config,
    pub ledger: Ledger,
    pub blobs: Arc<dyn BlobStore>,
    pub queue_sender: Arc<dyn QueueSender>,
    pub queue_receiver: Arc<dyn QueueReceiver>,
    pub notifier: Arc<dyn Notifier>,
}

impl Services {
    /// Open the configured backends and make sure every table exists
    pub async fn from_config(config: Config, ctx: &RunContext) -> Result<Self> {
        let notifier = notify::from_config(&config.notify, config.ingest.scale_factor)?;

        let store: Arc<dyn KeyedStore>;
        let blobs: Arc<dyn BlobStore>;
        let queue_sender: Arc<dyn QueueSender>;
        let queue_receiver: Arc<dyn QueueReceiver>;

        match config.storage.backend {
            StorageBackend::Memory => {
                let queue = Arc::new(MemoryQueue::new());
                store = Arc::new(MemoryStore::new());
                blobs = Arc::new(MemoryBlobStore::new());
                queue_sender = queue.clone();
                queue_receiver = queue;
            }
            StorageBackend::Sqlite => {
                let db_path = config.database_path()?;
                if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                let sqlite = Arc::new(open_sqlite(&db_path, config.storage.encrypt)?);
                info!(path = %db_path.display(), encrypted = sqlite.is_encrypted(), "Opened database");
                store = sqlite.clone();
                blobs = Arc::new(FsBlobStore::new(config.blob_root()?)?);
                queue_sender = sqlite.clone();
                queue_receiver = sqlite;
            }
        }

        let ledger = Ledger::from_config(store, &config);
        ledger.ensure_tables(ctx).await?;

        Ok(Self {
            config,
            ledger,
            blobs,
            queue_sender,
            queue_receiver,
            notifier,
        })
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            self.blobs.clone(),
            self.ledger.clone(),
            self.notifier.clone(),
            self.config.blob.container.clone(),
        )
        .with_validation_notifications(self.config.ingest.notify_validation_failures)
    }

    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions::from_config(&self.config)
    }

    /// Store an upload and queue it for the worker
    pub async fn submit_upload(&self, ctx: &RunContext, filename: &str, csv_text: &str) -> Result<UploadReceipt> {
        submit_csv(
            self.blobs.as_ref(),
            self.queue_sender.as_ref(),
            ctx,
            &self.config.blob.container,
            &self.config.queue.name,
            self.config.ingest.max_upload_bytes,
            filename,
            csv_text,
        )
        .await
    }
}

fn open_sqlite(path: &Path, encrypt: bool) -> Result<SqliteStore> {
    let path = path
        .to_str()
        .ok_or_else(|| Error::Config(format!("Database path is not UTF-8: {}", path.display())))?;
    if encrypt {
        SqliteStore::new(path)
    } else {
        SqliteStore::new_unencrypted(path)
    }
}
