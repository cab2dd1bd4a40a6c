//! Upload, ingest and worker command implementations

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tally_core::intake::upload_blob_name;
use tally_core::worker::{self, DrainReport};
use tally_core::{RunContext, RunOutcome, Services};
use tracing::info;

use super::money;

fn read_csv(file: &Path) -> Result<(String, String)> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.csv")
        .to_string();
    Ok((filename, text))
}

pub async fn cmd_upload(services: &Services, file: &Path) -> Result<()> {
    let (filename, text) = read_csv(file)?;
    let receipt = services
        .submit_upload(&RunContext::background(), &filename, &text)
        .await
        .context("Failed to queue upload")?;

    println!("📤 Uploaded {} ({} bytes)", filename, receipt.bytes);
    println!("   Blob: {}", receipt.blob_name);
    println!("   Queued as message {}", receipt.message_id);
    println!();
    println!("Run 'tally worker --once' to process it.");
    Ok(())
}

/// Store the file as a blob and run the pipeline on it without the queue
pub async fn cmd_ingest(services: &Services, file: &Path) -> Result<RunOutcome> {
    let (filename, text) = read_csv(file)?;
    if text.len() > services.config.ingest.max_upload_bytes {
        anyhow::bail!(
            "{} is {} bytes, limit is {}",
            filename,
            text.len(),
            services.config.ingest.max_upload_bytes
        );
    }

    let ctx = RunContext::background()
        .with_timeout(Duration::from_secs(services.config.ingest.run_timeout_secs));
    let blob_name = upload_blob_name(&filename, Utc::now());
    services
        .blobs
        .upload_text(&services.config.blob.container, &blob_name, &text)
        .await
        .context("Failed to store upload")?;

    println!("📥 Ingesting {}...", filename);
    let outcome = services
        .pipeline()
        .process_blob(&ctx, &blob_name)
        .await
        .context("Ingestion failed")?;
    print_outcome(&outcome);
    Ok(outcome)
}

fn print_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Empty => println!("   File has no transactions."),
        RunOutcome::ValidationFailed { row_errors, notified } => {
            println!("❌ No valid rows ({} errors):", row_errors.len());
            for err in row_errors {
                println!("   {}", err);
            }
            if *notified {
                println!("   Sent the error list to the group.");
            }
        }
        RunOutcome::Completed(summary) => {
            println!();
            println!("📊 Ingestion Results");
            println!("   ─────────────────────────────");
            println!("   Parsed:      {}", summary.parsed);
            println!("   New:         {}", summary.inserted);
            println!("   Duplicates:  {}", summary.parsed - summary.inserted);
            println!("   Attributed:  {}", summary.attributed);

            if let Some(report) = &summary.reconciliation {
                for update in &report.applied {
                    println!(
                        "   💳 Account {}: {} → {}",
                        update.account_number,
                        money(update.delta),
                        money(update.new_balance)
                    );
                }
                for failure in &report.failed {
                    println!("   ⚠️  Account {}: {}", failure.account_number, failure.error);
                }
                if report.skipped_before_cutoff > 0 {
                    println!(
                        "   Skipped {} transactions dated before a card's last reconciliation",
                        report.skipped_before_cutoff
                    );
                }
            }

            if !summary.row_errors.is_empty() {
                println!();
                println!("⚠️  {} rows skipped:", summary.row_errors.len());
                for err in &summary.row_errors {
                    println!("   {}", err);
                }
            }
            if summary.notified {
                println!();
                println!("✉️  Summary sent.");
            }
        }
    }
}

fn print_drain(report: &DrainReport) {
    println!(
        "   Received {} │ completed {} │ retried {} │ poisoned {} │ new transactions {}",
        report.received, report.completed, report.abandoned, report.dead_lettered, report.inserted
    );
}

pub async fn cmd_worker(services: &Services, once: bool, poll_secs: u64) -> Result<DrainReport> {
    let pipeline = services.pipeline();
    let options = services.worker_options();
    let receiver = services.queue_receiver.as_ref();

    if once {
        println!("⚙️  Draining {}...", options.queue);
        let report = worker::drain(&pipeline, receiver, &options, &RunContext::background()).await?;
        print_drain(&report);
        return Ok(report);
    }

    let (ctx, handle) = RunContext::cancellable();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            handle.cancel();
        }
    });

    println!("⚙️  Watching {} (Ctrl-C to stop)...", options.queue);
    let report = worker::run(
        &pipeline,
        receiver,
        &options,
        &ctx,
        Duration::from_secs(poll_secs.max(1)),
    )
    .await?;
    print_drain(&report);
    Ok(report)
}
