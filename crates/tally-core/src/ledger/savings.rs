//! Savings plan operations

use std::collections::HashSet;

use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tracing::info;

use super::Ledger;
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::models::{SavingsData, SavingsItem};
use crate::store::{BatchAction, Entity, Query};

pub const SUMMARY_ROW: &str = "SUMMARY";
pub const ITEM_PREFIX: &str = "ITEM_";

/// Row key for a savings item: `ITEM_` + SHA-256 of its name
pub fn item_row_key(name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    format!("{}{}", ITEM_PREFIX, hex::encode(hasher.finalize()))
}

/// Months are partitions and must look like `YYYY-MM`
pub fn validate_month(month: &str) -> Result<()> {
    let valid = month.len() == 7
        && month.is_ascii()
        && month.as_bytes()[4] == b'-'
        && month[..4].bytes().all(|b| b.is_ascii_digit())
        && month[5..]
            .parse::<u32>()
            .map(|m| (1..=12).contains(&m))
            .unwrap_or(false);
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidData(format!(
            "Invalid month format, expected YYYY-MM: {}",
            month
        )))
    }
}

impl Ledger {
    /// Savings for a month. A month never saved has a zero balance and no items.
    pub async fn get_savings(&self, ctx: &RunContext, month: &str) -> Result<SavingsData> {
        validate_month(month)?;
        let entities = ctx
            .guard(
                "list savings",
                self.store
                    .list_entities(&self.tables.savings, &Query::partition(month)),
            )
            .await?;

        let mut data = SavingsData::default();
        let mut items: Vec<(i64, SavingsItem)> = Vec::new();
        for entity in &entities {
            if entity.row_key == SUMMARY_ROW {
                data.starting_balance = entity.get_decimal("StartingBalance").unwrap_or(Decimal::ZERO);
            } else if entity.row_key.starts_with(ITEM_PREFIX) {
                let item = SavingsItem {
                    name: entity.get_str("Name").unwrap_or_default().to_string(),
                    cost: entity.get_decimal("Cost").unwrap_or(Decimal::ZERO),
                };
                items.push((entity.get_i64("Position").unwrap_or(i64::MAX), item));
            }
        }
        items.sort_by_key(|(position, _)| *position);
        data.items = items.into_iter().map(|(_, item)| item).collect();
        Ok(data)
    }

    /// Replace a month's savings with `data`.
    ///
    /// Items missing from `data` are deleted. Writes go out in single-partition
    /// batches; a failed batch leaves earlier batches committed.
    pub async fn save_savings(&self, ctx: &RunContext, month: &str, data: &SavingsData) -> Result<()> {
        validate_month(month)?;

        let mut names = HashSet::new();
        for item in &data.items {
            if item.name.trim().is_empty() {
                return Err(Error::InvalidData("Savings item name is empty".to_string()));
            }
            if !names.insert(item.name.as_str()) {
                return Err(Error::InvalidData(format!(
                    "Duplicate savings item: {}",
                    item.name
                )));
            }
        }

        let table = self.tables.savings.as_str();
        let existing = ctx
            .guard(
                "list savings keys",
                self.store
                    .list_entities(table, &Query::partition(month).select(&[])),
            )
            .await?;

        let mut actions = vec![BatchAction::Upsert(
            Entity::new(month, SUMMARY_ROW).with("StartingBalance", data.starting_balance.to_string()),
        )];

        let mut keep = HashSet::new();
        for (position, item) in data.items.iter().enumerate() {
            let row_key = item_row_key(&item.name);
            keep.insert(row_key.clone());
            actions.push(BatchAction::Upsert(
                Entity::new(month, row_key)
                    .with("Name", item.name.as_str())
                    .with("Cost", item.cost.to_string())
                    .with("Position", position),
            ));
        }

        let mut deleted = 0;
        for entity in existing {
            if entity.row_key.starts_with(ITEM_PREFIX) && !keep.contains(&entity.row_key) {
                actions.push(BatchAction::Delete {
                    partition_key: month.to_string(),
                    row_key: entity.row_key,
                });
                deleted += 1;
            }
        }

        while !actions.is_empty() {
            let rest = actions.split_off(actions.len().min(self.batch_size));
            let chunk = std::mem::replace(&mut actions, rest);
            ctx.guard("submit savings batch", self.store.submit_batch(table, chunk))
                .await?;
        }

        info!(month, items = data.items.len(), deleted, "Saved savings");
        Ok(())
    }
}
