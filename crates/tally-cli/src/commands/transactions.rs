//! Transaction listing

use anyhow::{Context, Result};
use tally_core::ledger::validate_month;
use tally_core::{RunContext, Services, Transaction};

use super::{money, truncate};

pub async fn cmd_transactions(services: &Services, month: Option<&str>) -> Result<Vec<Transaction>> {
    if let Some(m) = month {
        validate_month(m)?;
    }

    let mut transactions = services
        .ledger
        .list_transactions(&RunContext::background(), month)
        .await
        .context("Failed to list transactions")?;
    transactions.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.name.cmp(&b.name)));

    if transactions.is_empty() {
        println!("No transactions found.");
        return Ok(transactions);
    }

    println!(
        "   {:<10} │ {:<32} │ {:>8} │ {:<20} │ {:>12}",
        "Date", "Description", "Account", "Category", "Amount"
    );
    println!("   {}", "─".repeat(96));
    for t in &transactions {
        let amount = money(t.amount);
        let colored = if t.amount.is_sign_negative() {
            format!("\x1b[32m{:>12}\x1b[0m", amount)
        } else {
            format!("\x1b[31m{:>12}\x1b[0m", amount)
        };
        let marker = if t.counts_toward_split() { " " } else { "*" };
        println!(
            "   {} │ {:<32} │ {:>8} │ {:<20} │ {}{}",
            t.date,
            truncate(&t.name, 32),
            t.account_number,
            truncate(t.category.as_str(), 20),
            colored,
            marker
        );
    }

    let excluded = transactions.iter().filter(|t| !t.counts_toward_split()).count();
    println!();
    println!("   {} transactions", transactions.len());
    if excluded > 0 {
        println!("   * {} excluded from the split (ignored or untracked category)", excluded);
    }
    Ok(transactions)
}
