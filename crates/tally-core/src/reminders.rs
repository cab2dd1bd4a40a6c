//! Nightly payment reminders
//!
//! A card whose due day falls `lead_days` from today and which still needs a
//! payment to reach 10% utilization produces a reminder. All reminders for a
//! night go out in one notification.

use chrono::{Datelike, Days, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::RemindersConfig;
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::models::CreditCard;
use crate::notify::Notifier;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReminder {
    pub card_name: String,
    pub account_number: i64,
    pub due_date: NaiveDate,
    pub current_balance: Decimal,
    pub target_payment: Decimal,
    pub utilization: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReminderReport {
    pub reminders: Vec<PaymentReminder>,
    pub recipients: Vec<String>,
    pub sent: bool,
}

fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(31, |last| last.day())
}

/// Reminders for cards due `lead_days` after `today`.
///
/// A due day past the end of a short month counts as that month's last day.
pub fn due_reminders(cards: &[CreditCard], today: NaiveDate, lead_days: u32) -> Vec<PaymentReminder> {
    let Some(due_date) = today.checked_add_days(Days::new(u64::from(lead_days))) else {
        return Vec::new();
    };
    let last_day = days_in_month(due_date);

    cards
        .iter()
        .filter(|card| card.due_day.min(last_day) == due_date.day())
        .filter(|card| card.target_payment() > Decimal::ZERO)
        .map(|card| PaymentReminder {
            card_name: card.name.clone(),
            account_number: card.account_number,
            due_date,
            current_balance: card.current_balance,
            target_payment: card.target_payment(),
            utilization: card.utilization(),
        })
        .collect()
}

/// Look up due cards and notify every person plus the configured extras
pub async fn send_reminders(
    ledger: &Ledger,
    notifier: &dyn Notifier,
    ctx: &RunContext,
    today: NaiveDate,
    config: &RemindersConfig,
) -> Result<ReminderReport> {
    let cards = ledger.list_cards(ctx).await?;
    let reminders = due_reminders(&cards, today, config.lead_days);
    if reminders.is_empty() {
        info!(%today, cards = cards.len(), "No payment reminders due");
        return Ok(ReminderReport::default());
    }

    let mut recipients: Vec<String> = ledger
        .list_people(ctx)
        .await?
        .into_iter()
        .map(|p| p.email)
        .filter(|e| !e.is_empty())
        .collect();
    for extra in &config.extra_recipients {
        if !recipients.contains(extra) {
            recipients.push(extra.clone());
        }
    }

    if recipients.is_empty() {
        warn!(reminders = reminders.len(), "Payment reminders due but nobody to send them to");
        return Ok(ReminderReport {
            reminders,
            recipients,
            sent: false,
        });
    }

    ctx.guard(
        "send payment reminders",
        notifier.send_payment_reminders(&recipients, &reminders),
    )
    .await
    .map_err(|e| match e {
        Error::Notification(_) | Error::Cancelled(_) | Error::DeadlineExceeded(_) => e,
        other => Error::Notification(other.to_string()),
    })?;

    info!(reminders = reminders.len(), recipients = recipients.len(), "Sent payment reminders");
    Ok(ReminderReport {
        reminders,
        recipients,
        sent: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn card(due_day: u32, current: Decimal) -> CreditCard {
        CreditCard {
            id: format!("card-{}", due_day),
            name: format!("Due {}", due_day),
            account_number: i64::from(due_day),
            credit_limit: dec!(1000),
            due_day,
            statement_balance: dec!(0),
            current_balance: current,
            last_reconciled: None,
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_due_in_lead_days() {
        let cards = vec![card(18, dec!(500)), card(19, dec!(500))];
        let reminders = due_reminders(&cards, date("2025-08-15"), 3);
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].card_name, "Due 18");
        assert_eq!(reminders[0].due_date, date("2025-08-18"));
        assert_eq!(reminders[0].target_payment, dec!(400));
    }

    #[test]
    fn test_no_reminder_when_target_payment_not_positive() {
        // 100 balance on a 1000 limit is already at 10%
        let cards = vec![card(18, dec!(100)), card(18, dec!(50))];
        assert!(due_reminders(&cards, date("2025-08-15"), 3).is_empty());
    }

    #[test]
    fn test_wraps_month_and_clamps_short_months() {
        let cards = vec![card(31, dec!(800)), card(2, dec!(800))];
        // 2025-09-27 + 3 days = 2025-09-30, the last day of September
        let reminders = due_reminders(&cards, date("2025-09-27"), 3);
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].card_name, "Due 31");

        // 2025-12-30 + 3 days = 2026-01-02
        let reminders = due_reminders(&cards, date("2025-12-30"), 3);
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].due_date, date("2026-01-02"));
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(date("2024-02-10")), 29);
        assert_eq!(days_in_month(date("2025-02-10")), 28);
        assert_eq!(days_in_month(date("2025-12-01")), 31);
    }
}
