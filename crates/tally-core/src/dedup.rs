//! Content-derived transaction keys
//!
//! A key is the SHA-256 of `date|name|amount|account|occurrence`. The
//! occurrence index separates rows that are otherwise identical within one
//! batch (two $4.50 coffees on the same day), so both are stored.

use std::collections::HashMap;

use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::models::Transaction;

/// Canonical string form of an amount: trailing zeros dropped, so `4.50`
/// and `4.5` hash the same.
pub fn canonical_amount(amount: Decimal) -> String {
    amount.normalize().to_string()
}

fn signature(t: &Transaction) -> String {
    format!(
        "{}|{}|{}|{}",
        t.date.format("%Y-%m-%d"),
        t.name,
        canonical_amount(t.amount),
        t.account_number
    )
}

/// Generate the dedup key for a transaction at a given occurrence index
pub fn generate_key(t: &Transaction, occurrence: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signature(t).as_bytes());
    hasher.update(b"|");
    hasher.update(occurrence.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Counts prior occurrences of each signature within one batch
#[derive(Debug, Default)]
pub struct OccurrenceCounter {
    seen: HashMap<String, usize>,
}

impl OccurrenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Occurrence index for `t`: 0 the first time its signature is seen
    pub fn next(&mut self, t: &Transaction) -> usize {
        let count = self.seen.entry(signature(t)).or_insert(0);
        let occurrence = *count;
        *count += 1;
        occurrence
    }
}

/// Keys for a batch, in input order
pub fn assign_keys(transactions: &[Transaction]) -> Vec<String> {
    let mut counter = OccurrenceCounter::new();
    transactions
        .iter()
        .map(|t| generate_key(t, counter.next(t)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, IgnoredFrom};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn coffee(amount: Decimal) -> Transaction {
        Transaction {
            date: NaiveDate::from_ymd_opt(2025, 8, 17).unwrap(),
            name: "Coffee".to_string(),
            account_number: 123,
            amount,
            category: Category::Dining,
            ignore: IgnoredFrom::Nothing,
        }
    }

    #[test]
    fn test_key_is_deterministic() {
        let t = coffee(dec!(4.50));
        assert_eq!(generate_key(&t, 0), generate_key(&t, 0));
        assert_eq!(generate_key(&t, 0).len(), 64);
    }

    #[test]
    fn test_known_key_value() {
        let t = coffee(dec!(4.50));
        let mut hasher = Sha256::new();
        hasher.update(b"2025-08-17|Coffee|4.5|123|0");
        assert_eq!(generate_key(&t, 0), hex::encode(hasher.finalize()));
    }

    #[test]
    fn test_amount_scale_does_not_change_key() {
        assert_eq!(generate_key(&coffee(dec!(4.50)), 0), generate_key(&coffee(dec!(4.5)), 0));
        assert_eq!(canonical_amount(dec!(100.00)), "100");
        assert_eq!(canonical_amount(dec!(-0.10)), "-0.1");
    }

    #[test]
    fn test_occurrences_disambiguate_duplicates() {
        let batch = vec![coffee(dec!(4.50)), coffee(dec!(4.50)), coffee(dec!(3.00))];
        let keys = assign_keys(&batch);
        assert_eq!(keys[0], generate_key(&batch[0], 0));
        assert_eq!(keys[1], generate_key(&batch[1], 1));
        assert_eq!(keys[2], generate_key(&batch[2], 0));
        assert_ne!(keys[0], keys[1]);
    }

    #[test]
    fn test_assign_keys_is_order_stable() {
        let batch = vec![coffee(dec!(4.50)), coffee(dec!(4.50))];
        assert_eq!(assign_keys(&batch), assign_keys(&batch));
    }
}
