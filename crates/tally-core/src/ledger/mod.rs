//! Ledger repository over a keyed store
//!
//! This module is organized by domain:
//! - `transactions` - Month-partitioned, deduplicated transaction writes
//! - `cards` - Credit cards and reconciliation balance updates
//! - `savings` - Per-month savings plans
//! - `people` - Members of the expense-sharing group

use std::sync::Arc;

use tracing::debug;

use crate::config::{Config, TablesConfig};
use crate::context::RunContext;
use crate::error::Result;
use crate::store::{KeyedStore, MAX_BATCH_SIZE};

mod cards;
mod people;
mod savings;
mod transactions;

pub use cards::CARDS_PARTITION;
pub use people::PEOPLE_PARTITION;
pub use savings::{item_row_key, validate_month, ITEM_PREFIX, SUMMARY_ROW};
pub use transactions::{partition_for_date, partition_key, UNKNOWN_PARTITION};

/// Typed access to transactions, cards, savings and people
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn KeyedStore>,
    tables: TablesConfig,
    batch_size: usize,
    card_update_attempts: u32,
}

impl Ledger {
    pub fn new(store: Arc<dyn KeyedStore>, tables: TablesConfig) -> Self {
        Self {
            store,
            tables,
            batch_size: MAX_BATCH_SIZE,
            card_update_attempts: 3,
        }
    }

    /// Ledger using the table names and limits from `config`
    pub fn from_config(store: Arc<dyn KeyedStore>, config: &Config) -> Self {
        Self::new(store, config.tables.clone())
            .with_batch_size(config.ingest.max_batch_size)
            .with_card_update_attempts(config.ingest.card_update_attempts)
    }

    /// Entities per physical batch, clamped to the store limit
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    pub fn with_card_update_attempts(mut self, attempts: u32) -> Self {
        self.card_update_attempts = attempts.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn KeyedStore> {
        &self.store
    }

    pub fn tables(&self) -> &TablesConfig {
        &self.tables
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Create every ledger table. Existing tables are left alone.
    pub async fn ensure_tables(&self, ctx: &RunContext) -> Result<()> {
        for table in self.tables.all() {
            ctx.guard("create table", self.store.create_table(table)).await?;
            debug!(table, "Table ready");
        }
        Ok(())
    }
}
