//! Notifications for ingestion results and payment reminders
//!
//! Backends:
//! - `LogNotifier` writes the rendered email to the log
//! - `WebhookNotifier` hands it to an HTTP mail relay
//! - `DisabledNotifier` drops everything
//!
//! Sending is not idempotent. A redelivered queue message can send the same
//! summary twice.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::config::{NotifyBackend, NotifyConfig};
use crate::error::{Error, Result};
use crate::models::Group;
use crate::reminders::PaymentReminder;

pub mod render;
mod webhook;

pub use render::RenderedEmail;
pub use webhook::WebhookNotifier;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Expense summary for a completed run, with any skipped rows
    async fn send_summary(&self, recipients: &[String], group: &Group, row_errors: &[String]) -> Result<()>;

    /// Upload that produced no valid transactions
    async fn send_validation_failure(&self, recipients: &[String], row_errors: &[String]) -> Result<()>;

    async fn send_payment_reminders(&self, recipients: &[String], reminders: &[PaymentReminder]) -> Result<()>;
}

/// Build the configured notifier
pub fn from_config(config: &NotifyConfig, scale_factor: Decimal) -> Result<Arc<dyn Notifier>> {
    match config.backend {
        NotifyBackend::Log => Ok(Arc::new(LogNotifier::new(scale_factor))),
        NotifyBackend::Disabled => Ok(Arc::new(DisabledNotifier)),
        NotifyBackend::Webhook => {
            let url = config.webhook_url.as_deref().ok_or_else(|| {
                Error::Config("Webhook notifier requires notify.webhook_url".to_string())
            })?;
            Ok(Arc::new(WebhookNotifier::new(
                url,
                config.api_key.clone(),
                &config.sender,
                scale_factor,
            )?))
        }
    }
}

/// Writes rendered emails to the log at info level
pub struct LogNotifier {
    scale_factor: Decimal,
}

impl LogNotifier {
    pub fn new(scale_factor: Decimal) -> Self {
        Self { scale_factor }
    }

    fn deliver(&self, recipients: &[String], email: RenderedEmail) {
        if recipients.is_empty() {
            warn!(subject = %email.subject, "No recipients, notification dropped");
            return;
        }
        info!(
            to = %recipients.join(", "),
            subject = %email.subject,
            "Notification\n{}",
            email.text
        );
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send_summary(&self, recipients: &[String], group: &Group, row_errors: &[String]) -> Result<()> {
        self.deliver(recipients, render::render_summary(group, row_errors, self.scale_factor));
        Ok(())
    }

    async fn send_validation_failure(&self, recipients: &[String], row_errors: &[String]) -> Result<()> {
        self.deliver(recipients, render::render_validation_failure(row_errors));
        Ok(())
    }

    async fn send_payment_reminders(&self, recipients: &[String], reminders: &[PaymentReminder]) -> Result<()> {
        self.deliver(recipients, render::render_payment_reminders(reminders));
        Ok(())
    }
}

pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn send_summary(&self, recipients: &[String], _group: &Group, _row_errors: &[String]) -> Result<()> {
        debug!(recipients = recipients.len(), "Notifications disabled, summary dropped");
        Ok(())
    }

    async fn send_validation_failure(&self, recipients: &[String], _row_errors: &[String]) -> Result<()> {
        debug!(recipients = recipients.len(), "Notifications disabled, validation failure dropped");
        Ok(())
    }

    async fn send_payment_reminders(&self, recipients: &[String], _reminders: &[PaymentReminder]) -> Result<()> {
        debug!(recipients = recipients.len(), "Notifications disabled, reminders dropped");
        Ok(())
    }
}
