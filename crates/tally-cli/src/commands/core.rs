//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `load_config` - Resolve config from file, environment and flags
//! - `open_services` - Open the configured backends
//! - `cmd_init` - Create the database, tables and blob directory

use std::path::Path;

use anyhow::{Context, Result};
use tally_core::{Config, RunContext, Services, StorageBackend};

/// Resolve configuration, then apply `--db` and `--no-encrypt`
pub fn load_config(config_path: Option<&Path>, db_path: Option<&Path>, no_encrypt: bool) -> Result<Config> {
    let mut config = Config::load(config_path).context("Failed to load configuration")?;
    if let Some(db) = db_path {
        config.storage.backend = StorageBackend::Sqlite;
        config.storage.path = Some(db.to_path_buf());
        // Blobs live beside an explicit database unless configured elsewhere
        if config.blob.root.is_none() {
            let parent = db.parent().filter(|p| !p.as_os_str().is_empty());
            config.blob.root = Some(parent.unwrap_or(Path::new(".")).join("blobs"));
        }
    }
    if no_encrypt {
        config.storage.encrypt = false;
    }
    Ok(config)
}

/// Open the configured backends and make sure the tables exist
pub async fn open_services(config: Config) -> Result<Services> {
    let encrypt = config.storage.encrypt;
    Services::from_config(config, &RunContext::background())
        .await
        .with_context(|| {
            if encrypt {
                "Failed to open storage (is TALLY_DB_KEY set?)"
            } else {
                "Failed to open storage (unencrypted)"
            }
        })
}

pub async fn cmd_init(config: Config) -> Result<()> {
    let backend = config.storage.backend;
    let encrypt = config.storage.encrypt;

    match backend {
        StorageBackend::Sqlite => {
            let db_path = config.database_path()?;
            println!("🔧 Initializing database at {}...", db_path.display());
        }
        StorageBackend::Memory => {
            println!("🔧 Initializing in-memory storage (nothing is persisted)...");
        }
    }

    let services = open_services(config).await?;
    println!("   Tables: {}", services.ledger.tables().all().join(", "));

    if backend == StorageBackend::Sqlite {
        println!("   Blobs: {}", services.config.blob_root()?.display());
        if encrypt {
            println!("   🔒 Encryption: ENABLED");
        } else {
            println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
        }
    }

    println!("✅ Storage initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Add people: tally people add Alice --email alice@example.com --account 1234");
    println!("  2. Add cards: tally cards add Visa --account 1234 --limit 5000 --due-day 15");
    println!("  3. Ingest a bank export: tally ingest --file statement.csv");

    Ok(())
}
