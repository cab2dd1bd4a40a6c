//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Config loading, service wiring and `init`
//! - `ingest` - Upload, synchronous ingest and the queue worker
//! - `cards` - Credit card management
//! - `people` - Group membership
//! - `savings` - Monthly savings plans
//! - `transactions` - Stored transaction listing
//! - `remind` - Payment reminders

pub mod cards;
pub mod core;
pub mod ingest;
pub mod people;
pub mod remind;
pub mod savings;
pub mod transactions;

// Re-export command functions for main.rs
pub use cards::*;
pub use core::*;
pub use ingest::*;
pub use people::*;
pub use remind::*;
pub use savings::*;
pub use transactions::*;

use rust_decimal::Decimal;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// `$1,234.50` style, with a leading minus for credits
pub fn money(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let text = format!("{:.2}", rounded.abs());
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::new();
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{}${}.{}", sign, grouped, cents)
}
