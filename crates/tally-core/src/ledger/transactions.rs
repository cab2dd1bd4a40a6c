//! Transaction persistence

use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, Utc};
use tracing::{debug, info};

use super::Ledger;
use crate::context::RunContext;
use crate::dedup::{generate_key, OccurrenceCounter};
use crate::error::Result;
use crate::models::{Category, IgnoredFrom, Transaction};
use crate::store::{BatchAction, Entity, Query};

/// Partition for dates without a usable year-month
pub const UNKNOWN_PARTITION: &str = "default_unknown";

/// `default_YYYY-MM` from the first seven characters of an ISO date
pub fn partition_key(iso_date: &str) -> String {
    let ym = iso_date.as_bytes().get(..7);
    match ym {
        Some(b)
            if b[..4].iter().all(u8::is_ascii_digit)
                && b[4] == b'-'
                && b[5..].iter().all(u8::is_ascii_digit) =>
        {
            format!("default_{}", &iso_date[..7])
        }
        _ => UNKNOWN_PARTITION.to_string(),
    }
}

pub fn partition_for_date(date: &NaiveDate) -> String {
    partition_key(&date.format("%Y-%m-%d").to_string())
}

fn transaction_entity(partition: &str, row_key: &str, t: &Transaction, imported_at: &str) -> Entity {
    let mut entity = Entity::new(partition, row_key)
        .with("Date", t.date.format("%Y-%m-%d").to_string())
        .with("Description", t.name.clone())
        .with("Amount", t.amount.to_string())
        .with("AccountNumber", t.account_number)
        .with("Category", t.category.as_str())
        .with("ImportedAt", imported_at);
    if t.ignore != IgnoredFrom::Nothing {
        entity.set("IgnoredFrom", t.ignore.as_str());
    }
    entity
}

fn transaction_from_entity(entity: &Entity) -> Option<Transaction> {
    Some(Transaction {
        date: NaiveDate::parse_from_str(entity.get_str("Date")?, "%Y-%m-%d").ok()?,
        name: entity.get_str("Description")?.to_string(),
        account_number: entity.get_i64("AccountNumber")?,
        amount: entity.get_decimal("Amount")?,
        category: Category::from_label(entity.get_str("Category").unwrap_or_default()),
        ignore: entity
            .get_str("IgnoredFrom")
            .and_then(IgnoredFrom::parse)
            .unwrap_or_default(),
    })
}

impl Ledger {
    /// Persist transactions, skipping any whose dedup key is already stored.
    ///
    /// Returns the transactions written by this call. A failed batch aborts
    /// the call; batches committed before it stay committed.
    pub async fn save_transactions(
        &self,
        ctx: &RunContext,
        transactions: &[Transaction],
    ) -> Result<Vec<Transaction>> {
        if transactions.is_empty() {
            return Ok(Vec::new());
        }

        let table = self.tables.transactions.as_str();
        ctx.guard("create transactions table", self.store.create_table(table))
            .await?;

        // Group by partition, keeping first-seen partition order
        let mut order: Vec<String> = Vec::new();
        let mut partitions: HashMap<String, Vec<&Transaction>> = HashMap::new();
        for t in transactions {
            let pk = partition_for_date(&t.date);
            partitions
                .entry(pk.clone())
                .or_insert_with(|| {
                    order.push(pk);
                    Vec::new()
                })
                .push(t);
        }

        let imported_at = Utc::now().to_rfc3339();
        let mut inserted = Vec::new();

        for pk in order {
            let Some(items) = partitions.remove(&pk) else {
                continue;
            };

            let mut counter = OccurrenceCounter::new();
            let keyed: Vec<(String, &Transaction)> = items
                .into_iter()
                .map(|t| (generate_key(t, counter.next(t)), t))
                .collect();

            let existing: HashSet<String> = ctx
                .guard(
                    "list existing transaction keys",
                    self.store
                        .list_entities(table, &Query::partition(pk.as_str()).select(&[])),
                )
                .await?
                .into_iter()
                .map(|e| e.row_key)
                .collect();

            let total = keyed.len();
            let fresh: Vec<(String, &Transaction)> = keyed
                .into_iter()
                .filter(|(key, _)| !existing.contains(key))
                .collect();
            let skipped = total - fresh.len();

            for chunk in fresh.chunks(self.batch_size) {
                let actions = chunk
                    .iter()
                    .map(|(key, t)| BatchAction::Upsert(transaction_entity(&pk, key, t, &imported_at)))
                    .collect();
                ctx.guard("submit transaction batch", self.store.submit_batch(table, actions))
                    .await?;
                inserted.extend(chunk.iter().map(|(_, t)| (*t).clone()));
                debug!(partition = %pk, size = chunk.len(), "Committed batch");
            }

            info!(partition = %pk, inserted = fresh.len(), skipped, "Saved transactions");
        }

        Ok(inserted)
    }

    /// Stored transactions for one month (`YYYY-MM`), or all when `None`
    pub async fn list_transactions(
        &self,
        ctx: &RunContext,
        month: Option<&str>,
    ) -> Result<Vec<Transaction>> {
        let query = match month {
            Some(m) => Query::partition(format!("default_{}", m)),
            None => Query::all(),
        };
        let entities = ctx
            .guard(
                "list transactions",
                self.store.list_entities(&self.tables.transactions, &query),
            )
            .await?;
        Ok(entities.iter().filter_map(transaction_from_entity).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TablesConfig;
    use crate::error::Error;
    use crate::store::{KeyedStore, MemoryStore, MAX_BATCH_SIZE};
    use crate::test_utils::FaultyStore;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn tx(date: &str, name: &str, amount: Decimal) -> Transaction {
        Transaction {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            name: name.to_string(),
            account_number: 123,
            amount,
            category: Category::Dining,
            ignore: IgnoredFrom::Nothing,
        }
    }

    fn ledger() -> (Ledger, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Ledger::new(store.clone(), TablesConfig::default()), store)
    }

    fn items(count: usize) -> Vec<Transaction> {
        (1..=count)
            .map(|i| tx("2025-08-17", &format!("Item {}", i), Decimal::from(i)))
            .collect()
    }

    #[test]
    fn test_partition_key() {
        assert_eq!(partition_key("2025-08-17"), "default_2025-08");
        assert_eq!(partition_key("2025-08"), "default_2025-08");
        assert_eq!(partition_key("2025"), UNKNOWN_PARTITION);
        assert_eq!(partition_key("+10000-01-01"), UNKNOWN_PARTITION);
        assert_eq!(partition_key("Aug 17"), UNKNOWN_PARTITION);
        assert_eq!(
            partition_for_date(&NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()),
            "default_2024-01"
        );
    }

    #[tokio::test]
    async fn test_second_save_inserts_nothing() {
        let (ledger, store) = ledger();
        let ctx = RunContext::background();
        let batch = vec![
            tx("2025-08-17", "Coffee", dec!(4.50)),
            tx("2025-08-17", "Coffee", dec!(4.50)),
            tx("2025-07-02", "Rent share", dec!(900)),
        ];

        let first = ledger.save_transactions(&ctx, &batch).await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(store.len("transactions"), 3);

        let second = ledger.save_transactions(&ctx, &batch).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(store.len("transactions"), 3);
    }

    #[tokio::test]
    async fn test_extra_duplicate_in_later_upload_is_new() {
        let (ledger, _) = ledger();
        let ctx = RunContext::background();
        let once = vec![tx("2025-08-17", "Coffee", dec!(4.50))];
        let twice = vec![
            tx("2025-08-17", "Coffee", dec!(4.50)),
            tx("2025-08-17", "Coffee", dec!(4.50)),
        ];

        ledger.save_transactions(&ctx, &once).await.unwrap();
        let inserted = ledger.save_transactions(&ctx, &twice).await.unwrap();
        assert_eq!(inserted.len(), 1);
    }

    #[tokio::test]
    async fn test_batches_are_chunked() {
        let (ledger, store) = ledger();
        let ledger = ledger.with_batch_size(2);
        let ctx = RunContext::background();
        let inserted = ledger.save_transactions(&ctx, &items(5)).await.unwrap();
        assert_eq!(inserted.len(), 5);
        assert_eq!(store.len("transactions"), 5);
    }

    #[tokio::test]
    async fn test_failed_batch_keeps_earlier_batches() {
        let inner = Arc::new(MemoryStore::new());
        let faulty = Arc::new(FaultyStore::new(inner.clone()).fail_batches_after(1));
        let ledger = Ledger::new(faulty, TablesConfig::default()).with_batch_size(2);
        let ctx = RunContext::background();
        let batch = items(5);

        let err = ledger.save_transactions(&ctx, &batch).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(inner.len("transactions"), 2);

        // Redelivery against a healthy store writes only what is missing
        let healthy = Ledger::new(inner.clone(), TablesConfig::default()).with_batch_size(2);
        let inserted = healthy.save_transactions(&ctx, &batch).await.unwrap();
        assert_eq!(inserted, batch[2..].to_vec());
        assert_eq!(inner.len("transactions"), 5);
    }

    #[tokio::test]
    async fn test_default_batch_size_boundary() {
        let ctx = RunContext::background();

        // A full batch goes out in one submission
        let inner = Arc::new(MemoryStore::new());
        let one_batch = Ledger::new(
            Arc::new(FaultyStore::new(inner.clone()).fail_batches_after(1)),
            TablesConfig::default(),
        );
        let inserted = one_batch
            .save_transactions(&ctx, &items(MAX_BATCH_SIZE))
            .await
            .unwrap();
        assert_eq!(inserted.len(), MAX_BATCH_SIZE);
        assert_eq!(inner.len("transactions"), MAX_BATCH_SIZE);

        // One more row needs a second submission
        let inner = Arc::new(MemoryStore::new());
        let two_batches = Ledger::new(
            Arc::new(FaultyStore::new(inner.clone()).fail_batches_after(1)),
            TablesConfig::default(),
        );
        let err = two_batches
            .save_transactions(&ctx, &items(MAX_BATCH_SIZE + 1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(inner.len("transactions"), MAX_BATCH_SIZE);

        let (ledger, store) = ledger();
        let inserted = ledger
            .save_transactions(&ctx, &items(MAX_BATCH_SIZE + 1))
            .await
            .unwrap();
        assert_eq!(inserted.len(), MAX_BATCH_SIZE + 1);
        assert_eq!(store.len("transactions"), MAX_BATCH_SIZE + 1);
    }

    #[tokio::test]
    async fn test_entity_layout() {
        let (ledger, store) = ledger();
        let ctx = RunContext::background();
        let mut t = tx("2025-08-17", "Coffee", dec!(4.50));
        t.ignore = IgnoredFrom::Budget;
        ledger.save_transactions(&ctx, &[t.clone()]).await.unwrap();

        let key = generate_key(&t, 0);
        let entity = store
            .get_entity("transactions", "default_2025-08", &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entity.get_str("Date"), Some("2025-08-17"));
        assert_eq!(entity.get_str("Description"), Some("Coffee"));
        assert_eq!(entity.get_str("Amount"), Some("4.50"));
        assert_eq!(entity.get_i64("AccountNumber"), Some(123));
        assert_eq!(entity.get_str("Category"), Some("Dining & Drinks"));
        assert_eq!(entity.get_str("IgnoredFrom"), Some("budget"));
        assert!(entity.get_str("ImportedAt").is_some());

        let listed = ledger.list_transactions(&ctx, Some("2025-08")).await.unwrap();
        assert_eq!(listed, vec![t]);
    }
}
