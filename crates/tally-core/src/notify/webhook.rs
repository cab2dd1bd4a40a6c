//! HTTP mail relay notifier
//!
//! POSTs a JSON envelope `{from, to, subject, text, html}` to a configured
//! URL, with an optional bearer token. Any non-2xx status is a failure.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use super::render::{self, RenderedEmail};
use super::Notifier;
use crate::error::{Error, Result};
use crate::models::Group;
use crate::reminders::PaymentReminder;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct EmailEnvelope<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    text: &'a str,
    html: &'a str,
}

pub struct WebhookNotifier {
    http_client: Client,
    url: String,
    api_key: Option<String>,
    sender: String,
    scale_factor: Decimal,
}

impl WebhookNotifier {
    pub fn new(url: &str, api_key: Option<String>, sender: &str, scale_factor: Decimal) -> Result<Self> {
        let http_client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http_client,
            url: url.to_string(),
            api_key,
            sender: sender.to_string(),
            scale_factor,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn deliver(&self, recipients: &[String], email: RenderedEmail) -> Result<()> {
        if recipients.is_empty() {
            warn!(subject = %email.subject, "No recipients, notification dropped");
            return Ok(());
        }

        let envelope = EmailEnvelope {
            from: &self.sender,
            to: recipients,
            subject: &email.subject,
            text: &email.text,
            html: &email.html,
        };

        debug!(url = %self.url, subject = %email.subject, recipients = recipients.len(), "Posting notification");

        let mut request = self.http_client.post(&self.url).json(&envelope);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Notification(format!("Mail relay unreachable: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Notification(format!(
                "Mail relay rejected message ({}): {}",
                status, body
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send_summary(&self, recipients: &[String], group: &Group, row_errors: &[String]) -> Result<()> {
        self.deliver(recipients, render::render_summary(group, row_errors, self.scale_factor))
            .await
    }

    async fn send_validation_failure(&self, recipients: &[String], row_errors: &[String]) -> Result<()> {
        self.deliver(recipients, render::render_validation_failure(row_errors))
            .await
    }

    async fn send_payment_reminders(&self, recipients: &[String], reminders: &[PaymentReminder]) -> Result<()> {
        self.deliver(recipients, render::render_payment_reminders(reminders))
            .await
    }
}
