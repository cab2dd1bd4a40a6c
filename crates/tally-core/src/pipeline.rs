//! Ingestion pipeline
//!
//! One run per queued upload, strictly in order:
//!
//! 1. Resolve the queue message to a blob name (malformed → terminal)
//! 2. Download the CSV (failure → retryable)
//! 3. Parse. Errors with no valid rows end the run as a validation failure;
//!    an empty file ends it silently
//! 4. Persist with dedup (failure → retryable)
//! 5. Reconcile card balances for newly inserted transactions. A failure to
//!    list cards skips this step
//! 6. Attribute the full parsed set to people and send the summary. A send
//!    failure fails the run; earlier side effects stay
//!
//! Re-running the same CSV inserts nothing and moves no balances. The
//! summary may be sent again.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::blob::BlobStore;
use crate::context::RunContext;
use crate::error::Result;
use crate::import::{parse_csv, ParseOutcome};
use crate::intake::parse_envelope;
use crate::ledger::Ledger;
use crate::models::Group;
use crate::notify::Notifier;
use crate::queue::QueueMessage;
use crate::reconcile::{reconcile, ReconcileReport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub parsed: usize,
    pub inserted: usize,
    pub row_errors: Vec<String>,
    /// `None` when nothing new was inserted or cards could not be listed
    pub reconciliation: Option<ReconcileReport>,
    pub attributed: usize,
    pub notified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum RunOutcome {
    /// No rows and no errors
    Empty,
    /// Row errors and no valid rows; the message is consumed
    ValidationFailed { row_errors: Vec<String>, notified: bool },
    Completed(RunSummary),
}

pub struct Pipeline {
    blobs: Arc<dyn BlobStore>,
    ledger: Ledger,
    notifier: Arc<dyn Notifier>,
    container: String,
    notify_validation_failures: bool,
}

impl Pipeline {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        ledger: Ledger,
        notifier: Arc<dyn Notifier>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            blobs,
            ledger,
            notifier,
            container: container.into(),
            notify_validation_failures: true,
        }
    }

    pub fn with_validation_notifications(mut self, enabled: bool) -> Self {
        self.notify_validation_failures = enabled;
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Process one queue message
    pub async fn process_message(&self, ctx: &RunContext, message: &QueueMessage) -> Result<RunOutcome> {
        let envelope = parse_envelope(&message.body)?;
        info!(
            message_id = %message.id,
            blob_name = %envelope.blob_name,
            dequeue_count = message.dequeue_count,
            "Processing upload"
        );
        self.process_blob(ctx, &envelope.blob_name).await
    }

    /// Download a stored upload and ingest it
    pub async fn process_blob(&self, ctx: &RunContext, blob_name: &str) -> Result<RunOutcome> {
        let csv_text = ctx
            .guard(
                "download blob",
                self.blobs.download_text(&self.container, blob_name),
            )
            .await?;
        self.process_csv(ctx, &csv_text).await
    }

    /// Ingest CSV text already in hand
    pub async fn process_csv(&self, ctx: &RunContext, csv_text: &str) -> Result<RunOutcome> {
        let ParseOutcome {
            transactions,
            row_errors,
        } = parse_csv(csv_text);

        if transactions.is_empty() {
            if row_errors.is_empty() {
                info!("Upload has no transactions");
                return Ok(RunOutcome::Empty);
            }
            let notified = self.notify_validation_failure(ctx, &row_errors).await;
            return Ok(RunOutcome::ValidationFailed { row_errors, notified });
        }
        if !row_errors.is_empty() {
            warn!(skipped = row_errors.len(), "Some rows failed validation");
        }

        let inserted = self.ledger.save_transactions(ctx, &transactions).await?;

        let reconciliation = if inserted.is_empty() {
            None
        } else {
            match self.ledger.list_cards(ctx).await {
                Ok(cards) => Some(reconcile(&self.ledger, ctx, &inserted, &cards).await),
                Err(e) => {
                    warn!("Failed to list credit cards, skipping reconciliation: {}", e);
                    None
                }
            }
        };

        let people = self.ledger.list_people(ctx).await?;
        let mut group = Group::new(people);
        let attributed = group.add_transactions(&transactions);

        let mut summary = RunSummary {
            parsed: transactions.len(),
            inserted: inserted.len(),
            row_errors,
            reconciliation,
            attributed,
            notified: false,
        };

        if !group.has_transactions() {
            info!(parsed = summary.parsed, inserted = summary.inserted, "No attributable transactions");
            return Ok(RunOutcome::Completed(summary));
        }

        let recipients = group.emails();
        ctx.guard(
            "send summary",
            self.notifier
                .send_summary(&recipients, &group, &summary.row_errors),
        )
        .await?;
        summary.notified = true;

        info!(
            parsed = summary.parsed,
            inserted = summary.inserted,
            attributed,
            recipients = recipients.len(),
            "Ingestion complete"
        );
        Ok(RunOutcome::Completed(summary))
    }

    /// Best effort; the message is consumed whatever happens here
    async fn notify_validation_failure(&self, ctx: &RunContext, row_errors: &[String]) -> bool {
        warn!(errors = row_errors.len(), "Upload failed validation");
        if !self.notify_validation_failures {
            return false;
        }

        let recipients: Vec<String> = match self.ledger.list_people(ctx).await {
            Ok(people) => Group::new(people).emails(),
            Err(e) => {
                warn!("Failed to list people for validation failure notice: {}", e);
                return false;
            }
        };
        if recipients.is_empty() {
            return false;
        }

        match ctx
            .guard(
                "send validation failure",
                self.notifier.send_validation_failure(&recipients, row_errors),
            )
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send validation failure notice: {}", e);
                false
            }
        }
    }
}
