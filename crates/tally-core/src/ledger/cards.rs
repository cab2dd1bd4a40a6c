//! Credit card operations

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use super::Ledger;
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::models::CreditCard;
use crate::store::{Entity, Query};

pub const CARDS_PARTITION: &str = "CREDIT_CARDS";

fn card_entity(card: &CreditCard) -> Entity {
    let mut entity = Entity::new(CARDS_PARTITION, card.id.as_str())
        .with("Name", card.name.as_str())
        .with("AccountNumber", card.account_number)
        .with("CreditLimit", card.credit_limit.to_string())
        .with("DueDay", card.due_day)
        .with("StatementBalance", card.statement_balance.to_string())
        .with("CurrentBalance", card.current_balance.to_string());
    if let Some(date) = card.last_reconciled {
        entity.set("LastReconciled", date.format("%Y-%m-%d").to_string());
    }
    entity
}

/// Missing or unreadable money fields read as zero
fn card_from_entity(entity: &Entity) -> CreditCard {
    let money = |key: &str| entity.get_decimal(key).unwrap_or(Decimal::ZERO);
    CreditCard {
        id: entity.row_key.clone(),
        name: entity.get_str("Name").unwrap_or_default().to_string(),
        account_number: entity.get_i64("AccountNumber").unwrap_or_default(),
        credit_limit: money("CreditLimit"),
        due_day: entity
            .get_i64("DueDay")
            .and_then(|d| u32::try_from(d).ok())
            .unwrap_or_default(),
        statement_balance: money("StatementBalance"),
        current_balance: money("CurrentBalance"),
        last_reconciled: entity
            .get_str("LastReconciled")
            .filter(|s| !s.is_empty())
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()),
    }
}

impl Ledger {
    pub async fn list_cards(&self, ctx: &RunContext) -> Result<Vec<CreditCard>> {
        let entities = ctx
            .guard(
                "list credit cards",
                self.store
                    .list_entities(&self.tables.credit_cards, &Query::partition(CARDS_PARTITION)),
            )
            .await?;
        Ok(entities.iter().map(card_from_entity).collect())
    }

    pub async fn get_card(&self, ctx: &RunContext, id: &str) -> Result<Option<CreditCard>> {
        let entity = ctx
            .guard(
                "get credit card",
                self.store
                    .get_entity(&self.tables.credit_cards, CARDS_PARTITION, id),
            )
            .await?;
        Ok(entity.as_ref().map(card_from_entity))
    }

    /// Create or replace a card (explicit user edit)
    pub async fn save_card(&self, ctx: &RunContext, card: &CreditCard) -> Result<()> {
        if card.id.is_empty() {
            return Err(Error::InvalidData("Credit card id is empty".to_string()));
        }
        if card.due_day == 0 || card.due_day > 31 {
            return Err(Error::InvalidData(format!(
                "Due day must be between 1 and 31, got {}",
                card.due_day
            )));
        }
        ctx.guard(
            "save credit card",
            self.store
                .upsert_entity(&self.tables.credit_cards, card_entity(card)),
        )
        .await
    }

    pub async fn delete_card(&self, ctx: &RunContext, id: &str) -> Result<()> {
        ctx.guard(
            "delete credit card",
            self.store
                .delete_entity(&self.tables.credit_cards, CARDS_PARTITION, id),
        )
        .await
    }

    /// Row key = account number first, then a lookup on the `AccountNumber` field
    async fn find_card_entity(&self, ctx: &RunContext, account_number: i64) -> Result<Option<Entity>> {
        let table = self.tables.credit_cards.as_str();
        let by_key = ctx
            .guard(
                "get credit card",
                self.store
                    .get_entity(table, CARDS_PARTITION, &account_number.to_string()),
            )
            .await?;
        if by_key.is_some() {
            return Ok(by_key);
        }

        let query = Query::partition(CARDS_PARTITION).where_eq("AccountNumber", account_number);
        let matches = ctx
            .guard("find credit card", self.store.list_entities(table, &query))
            .await?;
        Ok(matches.into_iter().next())
    }

    /// Add `delta` to the card's current balance.
    ///
    /// The write is conditional on the etag read just before it; when another
    /// writer got there first the read-modify-write is retried, up to the
    /// configured attempts. Returns the new balance, or `None` when no card
    /// tracks this account.
    pub async fn update_card_balance(
        &self,
        ctx: &RunContext,
        account_number: i64,
        delta: Decimal,
    ) -> Result<Option<Decimal>> {
        let table = self.tables.credit_cards.as_str();

        for attempt in 1..=self.card_update_attempts {
            let Some(mut entity) = self.find_card_entity(ctx, account_number).await? else {
                return Ok(None);
            };

            let current = entity.get_decimal("CurrentBalance").unwrap_or(Decimal::ZERO);
            let new_balance = current + delta;
            let etag = entity.etag.take();
            entity.set("CurrentBalance", new_balance.to_string());

            match ctx
                .guard(
                    "update card balance",
                    self.store.update_entity(table, entity, etag.as_deref()),
                )
                .await
            {
                Ok(_) => {
                    debug!(account_number, %delta, %new_balance, "Updated card balance");
                    return Ok(Some(new_balance));
                }
                Err(Error::PreconditionFailed(msg)) if attempt < self.card_update_attempts => {
                    warn!(account_number, attempt, "Card changed during balance update, retrying: {}", msg);
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::PreconditionFailed(format!(
            "card for account {} kept changing",
            account_number
        )))
    }
}
