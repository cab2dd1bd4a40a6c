//! Payment reminder command

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use tally_core::reminders::send_reminders;
use tally_core::{ReminderReport, RunContext, Services};

use super::money;

pub async fn cmd_remind(services: &Services, date: Option<&str>) -> Result<ReminderReport> {
    let today = match date {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))?,
        None => Local::now().date_naive(),
    };

    let report = send_reminders(
        &services.ledger,
        services.notifier.as_ref(),
        &RunContext::background(),
        today,
        &services.config.reminders,
    )
    .await
    .context("Failed to send payment reminders")?;

    if report.reminders.is_empty() {
        println!(
            "No card payments due in {} days.",
            services.config.reminders.lead_days
        );
        return Ok(report);
    }

    println!("⏰ Payments due");
    for r in &report.reminders {
        println!(
            "   {} │ {:<20} │ pay {} (balance {})",
            r.due_date,
            r.card_name,
            money(r.target_payment),
            money(r.current_balance)
        );
    }
    if report.sent {
        println!("✉️  Sent to {}", report.recipients.join(", "));
    } else {
        println!("⚠️  Nobody to notify. Add people or reminders.extra_recipients.");
    }
    Ok(report)
}
