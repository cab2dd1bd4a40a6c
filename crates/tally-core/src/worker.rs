//! Queue worker
//!
//! Pulls upload messages and runs the pipeline for each one under its own
//! deadline. Settlement per message:
//!
//! - success (including validation failures and empty files): complete
//! - terminal error: dead-letter, so the body can be inspected
//! - retryable error: abandon, so the queue redelivers it
//! - received more than `max_dequeue_count` times: dead-letter unprocessed

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::pipeline::{Pipeline, RunOutcome};
use crate::queue::{QueueMessage, QueueReceiver};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOptions {
    pub queue: String,
    pub visibility_timeout: Duration,
    pub max_dequeue_count: u32,
    pub run_timeout: Duration,
    /// Stop a drain after this many receives
    pub max_messages: Option<usize>,
}

impl WorkerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            queue: config.queue.name.clone(),
            visibility_timeout: Duration::from_secs(config.queue.visibility_timeout_secs),
            max_dequeue_count: config.queue.max_dequeue_count,
            run_timeout: Duration::from_secs(config.ingest.run_timeout_secs),
            max_messages: None,
        }
    }

    pub fn with_max_messages(mut self, max: usize) -> Self {
        self.max_messages = Some(max);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub received: usize,
    pub completed: usize,
    pub validation_failures: usize,
    pub abandoned: usize,
    pub dead_lettered: usize,
    pub inserted: usize,
}

impl DrainReport {
    pub fn merge(&mut self, other: &DrainReport) {
        self.received += other.received;
        self.completed += other.completed;
        self.validation_failures += other.validation_failures;
        self.abandoned += other.abandoned;
        self.dead_lettered += other.dead_lettered;
        self.inserted += other.inserted;
    }
}

/// Process messages until the queue has nothing visible, the receive limit
/// is reached, or `ctx` is cancelled.
///
/// Queue errors (receive, settle) end the drain with that error.
pub async fn drain(
    pipeline: &Pipeline,
    receiver: &dyn QueueReceiver,
    options: &WorkerOptions,
    ctx: &RunContext,
) -> Result<DrainReport> {
    let mut report = DrainReport::default();

    loop {
        if ctx.is_cancelled() {
            info!(received = report.received, "Drain cancelled");
            break;
        }
        if options.max_messages.is_some_and(|max| report.received >= max) {
            break;
        }

        let Some(message) = ctx
            .guard(
                "receive message",
                receiver.receive(&options.queue, options.visibility_timeout),
            )
            .await?
        else {
            debug!(queue = %options.queue, "Queue empty");
            break;
        };
        report.received += 1;

        if message.dequeue_count > options.max_dequeue_count {
            let reason = format!(
                "received {} times, limit is {}",
                message.dequeue_count, options.max_dequeue_count
            );
            receiver.dead_letter(&message, &reason).await?;
            report.dead_lettered += 1;
            continue;
        }

        let run_ctx = ctx.clone().with_timeout(options.run_timeout);
        let result = pipeline.process_message(&run_ctx, &message).await;
        settle(receiver, &message, result, &mut report).await?;
    }

    info!(
        received = report.received,
        completed = report.completed,
        abandoned = report.abandoned,
        dead_lettered = report.dead_lettered,
        "Drained queue"
    );
    Ok(report)
}

async fn settle(
    receiver: &dyn QueueReceiver,
    message: &QueueMessage,
    result: Result<RunOutcome>,
    report: &mut DrainReport,
) -> Result<()> {
    match result {
        Ok(outcome) => {
            match &outcome {
                RunOutcome::Completed(summary) => report.inserted += summary.inserted,
                RunOutcome::ValidationFailed { .. } => report.validation_failures += 1,
                RunOutcome::Empty => {}
            }
            receiver.complete(message).await?;
            report.completed += 1;
        }
        Err(e) if e.is_retryable() => {
            warn!(message_id = %message.id, dequeue_count = message.dequeue_count, "Run failed, will retry: {}", e);
            receiver.abandon(message).await?;
            report.abandoned += 1;
        }
        Err(e) => {
            error!(message_id = %message.id, "Run failed permanently: {}", e);
            receiver.dead_letter(message, &e.to_string()).await?;
            report.dead_lettered += 1;
        }
    }
    Ok(())
}

/// Drain repeatedly, sleeping `poll_interval` between drains, until `ctx`
/// is cancelled
pub async fn run(
    pipeline: &Pipeline,
    receiver: &dyn QueueReceiver,
    options: &WorkerOptions,
    ctx: &RunContext,
    poll_interval: Duration,
) -> Result<DrainReport> {
    info!(queue = %options.queue, poll_secs = poll_interval.as_secs(), "Worker started");
    let mut total = DrainReport::default();

    loop {
        let report = drain(pipeline, receiver, options, ctx).await?;
        total.merge(&report);

        let idle = ctx
            .guard("poll interval", async {
                tokio::time::sleep(poll_interval).await;
                Ok(())
            })
            .await;
        match idle {
            Ok(()) => {}
            Err(Error::Cancelled(_)) => break,
            Err(e) => return Err(e),
        }
    }

    info!(received = total.received, completed = total.completed, "Worker stopped");
    Ok(total)
}
