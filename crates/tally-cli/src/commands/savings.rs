//! Savings plan command implementations

use std::path::Path;

use anyhow::{Context, Result};
use tally_core::{RunContext, SavingsData, Services};

use super::{money, truncate};

pub async fn cmd_savings_show(services: &Services, month: &str) -> Result<SavingsData> {
    let data = services
        .ledger
        .get_savings(&RunContext::background(), month)
        .await
        .with_context(|| format!("Failed to load savings for {}", month))?;

    println!("💰 Savings plan for {}", month);
    println!("   ─────────────────────────────");
    println!("   Starting balance: {:>12}", money(data.starting_balance));
    if data.items.is_empty() {
        println!("   (no items)");
    }
    for item in &data.items {
        println!("   {:<24} │ {:>12}", truncate(&item.name, 24), money(item.cost));
    }
    println!("   ─────────────────────────────");
    println!("   Total cost:       {:>12}", money(data.total_cost()));

    let remaining = data.remaining();
    if remaining.is_sign_negative() {
        println!("   Remaining:        \x1b[31m{:>12}\x1b[0m", money(remaining));
    } else {
        println!("   Remaining:        \x1b[32m{:>12}\x1b[0m", money(remaining));
    }
    Ok(data)
}

pub async fn cmd_savings_set(services: &Services, month: &str, file: &Path) -> Result<SavingsData> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    let data: SavingsData = serde_json::from_str(&content)
        .with_context(|| format!("Invalid savings JSON in {}", file.display()))?;

    services
        .ledger
        .save_savings(&RunContext::background(), month, &data)
        .await
        .with_context(|| format!("Failed to save savings for {}", month))?;

    println!(
        "✓ Saved {} items for {} (remaining {})",
        data.items.len(),
        month,
        money(data.remaining())
    );
    Ok(data)
}
