//! Runtime configuration
//!
//! ## Resolution
//!
//! 1. Embedded defaults (`config/tally.toml`, compiled in)
//! 2. Override file: explicit path, else `~/.local/share/tally/config.toml`
//!    when present. Sections it leaves out keep their defaults.
//! 3. `TALLY_*` environment variables for deployment settings
//!
//! The SQLCipher passphrase is never read from a file; see `TALLY_DB_KEY`.

use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::store::MAX_BATCH_SIZE;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/tally.toml");

pub const ENV_STORAGE_BACKEND: &str = "TALLY_STORAGE_BACKEND";
pub const ENV_DB_PATH: &str = "TALLY_DB_PATH";
pub const ENV_BLOB_ROOT: &str = "TALLY_BLOB_ROOT";
pub const ENV_NOTIFY_BACKEND: &str = "TALLY_NOTIFY_BACKEND";
pub const ENV_WEBHOOK_URL: &str = "TALLY_WEBHOOK_URL";
pub const ENV_WEBHOOK_API_KEY: &str = "TALLY_WEBHOOK_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub tables: TablesConfig,
    pub blob: BlobConfig,
    pub queue: QueueConfig,
    pub ingest: IngestConfig,
    pub notify: NotifyConfig,
    pub reminders: RemindersConfig,
}

/// Selects the keyed store, blob store and queue together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

impl std::str::FromStr for StorageBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(Error::Config(format!("Unknown storage backend: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database file; defaults to `<data dir>/tally.db`
    pub path: Option<PathBuf>,
    pub encrypt: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: None,
            encrypt: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TablesConfig {
    pub transactions: String,
    pub credit_cards: String,
    pub savings: String,
    pub people: String,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            transactions: "transactions".to_string(),
            credit_cards: "creditcards".to_string(),
            savings: "savings".to_string(),
            people: "people".to_string(),
        }
    }
}

impl TablesConfig {
    pub fn all(&self) -> [&str; 4] {
        [
            self.transactions.as_str(),
            self.credit_cards.as_str(),
            self.savings.as_str(),
            self.people.as_str(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    pub container: String,
    /// Filesystem root; defaults to `<data dir>/blobs`
    pub root: Option<PathBuf>,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            container: "rm-analyzer-data".to_string(),
            root: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub name: String,
    pub max_dequeue_count: u32,
    pub visibility_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "process-queue".to_string(),
            max_dequeue_count: 5,
            visibility_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub max_batch_size: usize,
    pub card_update_attempts: u32,
    pub run_timeout_secs: u64,
    pub max_upload_bytes: usize,
    pub notify_validation_failures: bool,
    pub scale_factor: Decimal,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_batch_size: MAX_BATCH_SIZE,
            card_update_attempts: 3,
            run_timeout_secs: 300,
            max_upload_bytes: 10 * 1024 * 1024,
            notify_validation_failures: true,
            scale_factor: Decimal::new(5, 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyBackend {
    Log,
    Webhook,
    Disabled,
}

impl std::str::FromStr for NotifyBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "webhook" => Ok(Self::Webhook),
            "disabled" => Ok(Self::Disabled),
            other => Err(Error::Config(format!("Unknown notify backend: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub backend: NotifyBackend,
    pub webhook_url: Option<String>,
    pub api_key: Option<String>,
    pub sender: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            backend: NotifyBackend::Log,
            webhook_url: None,
            api_key: None,
            sender: "tally@localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemindersConfig {
    pub lead_days: u32,
    pub extra_recipients: Vec<String>,
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            lead_days: 3,
            extra_recipients: Vec::new(),
        }
    }
}

/// Tally's data directory (`~/.local/share/tally` on Linux)
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally"))
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    data_dir().map(|d| d.join("config.toml"))
}

impl Config {
    /// Load configuration (override file, else embedded defaults), then
    /// apply environment overrides
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::load_file(override_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn load_file(override_path: Option<&Path>) -> Result<Self> {
        let path = match override_path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                Some(path.to_path_buf())
            }
            None => default_config_path().filter(|p| p.exists()),
        };

        match path {
            Some(path) => {
                debug!(path = %path.display(), "Loading config override");
                let content = fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_toml(&content)
            }
            None => Self::from_toml(DEFAULT_CONFIG),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))
    }

    /// Defaults with the in-memory backends, for tests and dry runs
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.storage.backend = StorageBackend::Memory;
        config.storage.encrypt = false;
        config
    }

    /// Apply `TALLY_*` overrides using `lookup` to read variables
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(backend) = lookup(ENV_STORAGE_BACKEND) {
            self.storage.backend = backend.parse()?;
        }
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.storage.path = Some(PathBuf::from(path));
        }
        if let Some(root) = lookup(ENV_BLOB_ROOT) {
            self.blob.root = Some(PathBuf::from(root));
        }
        if let Some(backend) = lookup(ENV_NOTIFY_BACKEND) {
            self.notify.backend = backend.parse()?;
        }
        if let Some(url) = lookup(ENV_WEBHOOK_URL) {
            self.notify.webhook_url = Some(url);
        }
        if let Some(key) = lookup(ENV_WEBHOOK_API_KEY) {
            self.notify.api_key = Some(key);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.ingest.max_batch_size == 0 || self.ingest.max_batch_size > MAX_BATCH_SIZE {
            return Err(Error::Config(format!(
                "ingest.max_batch_size must be between 1 and {}",
                MAX_BATCH_SIZE
            )));
        }
        if self.ingest.card_update_attempts == 0 {
            return Err(Error::Config(
                "ingest.card_update_attempts must be at least 1".to_string(),
            ));
        }
        if self.queue.max_dequeue_count == 0 {
            return Err(Error::Config(
                "queue.max_dequeue_count must be at least 1".to_string(),
            ));
        }
        if self.notify.backend == NotifyBackend::Webhook && self.notify.webhook_url.is_none() {
            return Err(Error::Config(format!(
                "notify.backend = \"webhook\" requires notify.webhook_url or {}",
                ENV_WEBHOOK_URL
            )));
        }
        Ok(())
    }

    /// Database file for the sqlite backend
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.storage.path {
            Some(path) => Ok(path.clone()),
            None => data_dir()
                .map(|d| d.join("tally.db"))
                .ok_or_else(|| Error::Config("Could not determine data directory".to_string())),
        }
    }

    /// Root directory for the filesystem blob store
    pub fn blob_root(&self) -> Result<PathBuf> {
        match &self.blob.root {
            Some(root) => Ok(root.clone()),
            None => data_dir()
                .map(|d| d.join("blobs"))
                .ok_or_else(|| Error::Config("Could not determine data directory".to_string())),
        }
    }
}
