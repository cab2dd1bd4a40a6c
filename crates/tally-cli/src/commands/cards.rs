//! Credit card command implementations

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tally_core::{CardSnapshot, CreditCard, RunContext, Services};

use super::{money, truncate};

/// Arguments for `cards add`
pub struct NewCard {
    pub name: String,
    pub account_number: i64,
    pub credit_limit: Decimal,
    pub due_day: u32,
    pub id: Option<String>,
    pub statement_balance: Decimal,
    pub current_balance: Decimal,
    pub reconciled: Option<String>,
}

pub async fn cmd_cards_list(services: &Services) -> Result<Vec<CardSnapshot>> {
    let mut cards = services
        .ledger
        .list_cards(&RunContext::background())
        .await
        .context("Failed to list cards")?;
    cards.sort_by(|a, b| a.due_day.cmp(&b.due_day).then_with(|| a.name.cmp(&b.name)));

    if cards.is_empty() {
        println!("No cards yet. Add one with 'tally cards add'.");
        return Ok(Vec::new());
    }

    println!(
        "   {:<12} │ {:<18} │ {:>8} │ {:>12} │ {:>12} │ {:>6} │ {:>12}",
        "Id", "Name", "Account", "Limit", "Balance", "Util", "Pay to 10%"
    );
    println!("   {}", "─".repeat(100));

    let snapshots: Vec<CardSnapshot> = cards.into_iter().map(CardSnapshot::from).collect();
    for snap in &snapshots {
        let card = &snap.card;
        let target = if snap.target_payment > Decimal::ZERO {
            money(snap.target_payment)
        } else {
            "-".to_string()
        };
        println!(
            "   {:<12} │ {:<18} │ {:>8} │ {:>12} │ {:>12} │ {:>5}% │ {:>12}",
            truncate(&card.id, 12),
            truncate(&card.name, 18),
            card.account_number,
            money(card.credit_limit),
            money(card.current_balance),
            (snap.utilization * Decimal::ONE_HUNDRED).round_dp(1),
            target
        );
        if let Some(date) = card.last_reconciled {
            println!("   {:<12} │ due day {}, reconciled {}", "", card.due_day, date);
        } else {
            println!("   {:<12} │ due day {}", "", card.due_day);
        }
    }

    Ok(snapshots)
}

pub async fn cmd_cards_add(services: &Services, new: NewCard) -> Result<CreditCard> {
    let last_reconciled = match new.reconciled.as_deref() {
        Some(s) => Some(
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .with_context(|| format!("Invalid --reconciled date '{}', expected YYYY-MM-DD", s))?,
        ),
        None => None,
    };

    let card = CreditCard {
        id: new.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        name: new.name,
        account_number: new.account_number,
        credit_limit: new.credit_limit,
        due_day: new.due_day,
        statement_balance: new.statement_balance,
        current_balance: new.current_balance,
        last_reconciled,
    };

    services
        .ledger
        .save_card(&RunContext::background(), &card)
        .await
        .context("Failed to save card")?;

    println!("✓ Saved card '{}' ({})", card.name, card.id);
    println!(
        "  Account {} │ limit {} │ balance {} │ due day {}",
        card.account_number,
        money(card.credit_limit),
        money(card.current_balance),
        card.due_day
    );
    Ok(card)
}

pub async fn cmd_cards_remove(services: &Services, id: &str) -> Result<()> {
    let ctx = RunContext::background();
    let existing = services.ledger.get_card(&ctx, id).await?;
    let Some(card) = existing else {
        anyhow::bail!("Card not found: {}", id);
    };

    services
        .ledger
        .delete_card(&ctx, id)
        .await
        .context("Failed to remove card")?;
    println!("✓ Removed card '{}' ({})", card.name, card.id);
    Ok(())
}
