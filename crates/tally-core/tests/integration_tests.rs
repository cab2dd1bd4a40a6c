//! Integration tests for tally-core
//!
//! These tests exercise the full upload → queue → pipeline → store →
//! reconcile → notify workflow against both storage backends.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use tally_core::{
    config::RemindersConfig,
    drain, generate_key, parse_csv,
    queue::poison_queue_name,
    send_reminders,
    test_utils::{RecordingNotifier, Sent},
    Config, CreditCard, Group, Ledger, Person, QueueReceiver, QueueSender, RunContext, RunOutcome,
    Services, StorageBackend,
};

/// Header plus a representative month for a two-person household
fn august_csv() -> &'static str {
    "Date,Name,Account Number,Amount,Category,Ignored From
2025-08-02,Whole Foods,1111,120.00,Groceries,
2025-08-03,Vet Clinic,1111,30.00,Pets,
2025-08-05,Electric Co,2222,50.00,Bills & Utilities,
2025-08-07,Bonus Refund,1111,-10.00,Other,
2025-08-09,Birthday Gift,2222,80.00,Shared Purchases,everything
2025-08-17,Coffee,1111,4.50,Dining & Drinks,
2025-08-17,Coffee,1111,4.50,Dining & Drinks,"
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn visa(last_reconciled: &str) -> CreditCard {
    CreditCard {
        id: "visa".to_string(),
        name: "Household Visa".to_string(),
        account_number: 1111,
        credit_limit: dec!(1000),
        due_day: 20,
        statement_balance: dec!(0),
        current_balance: dec!(500),
        last_reconciled: Some(date(last_reconciled)),
    }
}

/// Services on the chosen backend, with a recording notifier swapped in
async fn services(backend: StorageBackend, dir: &tempfile::TempDir) -> (Services, Arc<RecordingNotifier>) {
    let mut config = Config::in_memory();
    if backend == StorageBackend::Sqlite {
        config.storage.backend = StorageBackend::Sqlite;
        config.storage.path = Some(dir.path().join("tally.db"));
        config.blob.root = Some(dir.path().join("blobs"));
    }

    let mut services = Services::from_config(config, &RunContext::background())
        .await
        .expect("Failed to open services");
    let notifier = Arc::new(RecordingNotifier::new());
    services.notifier = notifier.clone();

    let ctx = RunContext::background();
    services
        .ledger
        .save_person(&ctx, &Person::new("Alice", "alice@example.com", vec![1111]))
        .await
        .expect("Failed to save Alice");
    services
        .ledger
        .save_person(&ctx, &Person::new("Bob", "bob@example.com", vec![2222]))
        .await
        .expect("Failed to save Bob");

    (services, notifier)
}

async fn balance(ledger: &Ledger) -> Decimal {
    ledger
        .get_card(&RunContext::background(), "visa")
        .await
        .unwrap()
        .expect("card exists")
        .current_balance
}

// =============================================================================
// End-to-end ingestion
// =============================================================================

async fn full_flow(backend: StorageBackend) {
    let dir = tempfile::tempdir().unwrap();
    let (services, notifier) = services(backend, &dir).await;
    let ctx = RunContext::background();
    services.ledger.save_card(&ctx, &visa("2025-08-03")).await.unwrap();

    let pipeline = services.pipeline();
    let options = services.worker_options();

    // First upload
    services
        .submit_upload(&ctx, "august.csv", august_csv())
        .await
        .expect("Failed to submit upload");
    let report = drain(&pipeline, services.queue_receiver.as_ref(), &options, &ctx)
        .await
        .expect("Drain failed");
    assert_eq!(report.completed, 1);
    assert_eq!(report.inserted, 7);

    // 2025-08-02 predates the cutoff; the rest of account 1111 applies:
    // 30 - 10 + 4.50 + 4.50 = 29.00
    assert_eq!(balance(&services.ledger).await, dec!(529.00));

    let stored = services.ledger.list_transactions(&ctx, Some("2025-08")).await.unwrap();
    assert_eq!(stored.len(), 7);

    // Same file again: nothing new, no balance change, summary sent again
    services.submit_upload(&ctx, "august-again.csv", august_csv()).await.unwrap();
    let report = drain(&pipeline, services.queue_receiver.as_ref(), &options, &ctx)
        .await
        .unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(report.inserted, 0);
    assert_eq!(balance(&services.ledger).await, dec!(529.00));

    let sent = notifier.sent();
    assert_eq!(sent.len(), 2);
    let Sent::Summary { recipients, row_errors, .. } = &sent[0] else {
        panic!("expected a summary, got {:?}", sent[0]);
    };
    assert_eq!(
        recipients,
        &vec!["alice@example.com".to_string(), "bob@example.com".to_string()]
    );
    assert!(row_errors.is_empty());
}

#[tokio::test]
async fn test_full_flow_memory_backend() {
    full_flow(StorageBackend::Memory).await;
}

#[tokio::test]
async fn test_full_flow_sqlite_backend() {
    full_flow(StorageBackend::Sqlite).await;
}

#[tokio::test]
async fn test_sqlite_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = RunContext::background();
    {
        let (services, _) = services(StorageBackend::Sqlite, &dir).await;
        services.submit_upload(&ctx, "august.csv", august_csv()).await.unwrap();
    }

    // Reopen: the queued upload and its blob are still there
    let (services, _) = services(StorageBackend::Sqlite, &dir).await;
    assert_eq!(
        services.queue_receiver.depth(&services.config.queue.name).await.unwrap(),
        1
    );
    let report = drain(
        &services.pipeline(),
        services.queue_receiver.as_ref(),
        &services.worker_options(),
        &ctx,
    )
    .await
    .unwrap();
    assert_eq!(report.inserted, 7);
}

// =============================================================================
// Deduplication
// =============================================================================

#[test]
fn test_identical_rows_get_distinct_keys() {
    let parsed = parse_csv(
        "Date,Name,Account Number,Amount,Category,Ignored From
2025-08-17,Coffee,123,4.50,Dining & Drinks,
2025-08-17,Coffee,123,4.50,Dining & Drinks,",
    );
    assert_eq!(parsed.transactions.len(), 2);
    assert!(parsed.row_errors.is_empty());

    let first = generate_key(&parsed.transactions[0], 0);
    let second = generate_key(&parsed.transactions[1], 1);
    assert_ne!(first, second);
    assert_eq!(first, generate_key(&parsed.transactions[1], 0));
}

#[tokio::test]
async fn test_third_copy_in_later_upload_is_inserted() {
    let dir = tempfile::tempdir().unwrap();
    let (services, _) = services(StorageBackend::Memory, &dir).await;
    let pipeline = services.pipeline();
    let ctx = RunContext::background();

    let two = "Date,Name,Account Number,Amount,Category,Ignored From
2025-08-17,Coffee,1111,4.50,Dining & Drinks,
2025-08-17,Coffee,1111,4.50,Dining & Drinks,";
    let three = format!("{}\n2025-08-17,Coffee,1111,4.50,Dining & Drinks,", two);

    let RunOutcome::Completed(first) = pipeline.process_csv(&ctx, two).await.unwrap() else {
        panic!("expected completed run");
    };
    let RunOutcome::Completed(second) = pipeline.process_csv(&ctx, &three).await.unwrap() else {
        panic!("expected completed run");
    };
    assert_eq!(first.inserted, 2);
    assert_eq!(second.inserted, 1);
}

// =============================================================================
// Validation and poison handling
// =============================================================================

#[tokio::test]
async fn test_row_isolation_and_validation_failure() {
    let dir = tempfile::tempdir().unwrap();
    let (services, notifier) = services(StorageBackend::Memory, &dir).await;
    let pipeline = services.pipeline();
    let ctx = RunContext::background();

    let mixed = "Date,Name,Account Number,Amount,Category,Ignored From
2025-08-01,Market,1111,10.00,Groceries,
2025-08-02,Market,1111,bad,Groceries,
2025-08-03,Market,1111,12.00,Groceries,";
    let RunOutcome::Completed(summary) = pipeline.process_csv(&ctx, mixed).await.unwrap() else {
        panic!("expected completed run");
    };
    assert_eq!(summary.parsed, 2);
    assert_eq!(summary.row_errors.len(), 1);
    assert!(summary.row_errors[0].starts_with("Row 3:"));
    assert!(summary.row_errors[0].contains("invalid Amount"));

    let outcome = pipeline
        .process_csv(&ctx, "Date,Name,Account Number,Amount,Category,Ignored From\n2025-08-01,Market,1111,10")
        .await
        .unwrap();
    assert!(matches!(outcome, RunOutcome::ValidationFailed { notified: true, .. }));
    let sent = notifier.sent();
    let Some(Sent::ValidationFailure { row_errors, .. }) = sent.last() else {
        panic!("expected a validation failure notice, got {:?}", sent);
    };
    assert_eq!(row_errors, &vec!["Row 2: not enough fields".to_string()]);
}

#[tokio::test]
async fn test_poison_messages_on_sqlite_queue() {
    let dir = tempfile::tempdir().unwrap();
    let (services, _) = services(StorageBackend::Sqlite, &dir).await;
    let ctx = RunContext::background();
    let queue = services.config.queue.name.clone();

    services.queue_sender.enqueue(&queue, "not json").await.unwrap();
    services
        .queue_sender
        .enqueue(&queue, r#"{"blobName":"uploads/never-uploaded.csv"}"#)
        .await
        .unwrap();

    let report = drain(
        &services.pipeline(),
        services.queue_receiver.as_ref(),
        &services.worker_options(),
        &ctx,
    )
    .await
    .unwrap();

    // Malformed: dead-lettered at once. Missing blob: 5 attempts, then poison.
    assert_eq!(report.dead_lettered, 2);
    assert_eq!(report.abandoned, 5);
    assert_eq!(services.queue_receiver.depth(&queue).await.unwrap(), 0);
    assert_eq!(
        services
            .queue_receiver
            .depth(&poison_queue_name(&queue))
            .await
            .unwrap(),
        2
    );
}

// =============================================================================
// Domain scenarios
// =============================================================================

#[test]
fn test_debt_scenario() {
    let parsed = parse_csv(
        "Date,Name,Account Number,Amount,Category,Ignored From
2025-08-01,Market,1,150,Groceries,
2025-08-01,Market,2,50,Groceries,",
    );
    let mut group = Group::new(vec![
        Person::new("Alice", "alice@example.com", vec![1]),
        Person::new("Bob", "bob@example.com", vec![2]),
    ]);
    group.add_transactions(&parsed.transactions);

    assert_eq!(group.expenses(), dec!(200));
    assert_eq!(group.debt(&group.members[0], dec!(0.5)), dec!(-50));
    assert_eq!(group.debt(&group.members[1], dec!(0.5)), dec!(50));
}

#[test]
fn test_target_payment_scenario() {
    let mut card = visa("2025-08-01");
    card.current_balance = dec!(500);
    card.statement_balance = dec!(0);
    assert_eq!(card.target_payment(), dec!(400));
    assert_eq!(card.utilization(), dec!(0.5));
}

#[tokio::test]
async fn test_payment_reminders_go_to_everyone() {
    let dir = tempfile::tempdir().unwrap();
    let (services, notifier) = services(StorageBackend::Memory, &dir).await;
    let ctx = RunContext::background();
    services.ledger.save_card(&ctx, &visa("2025-08-01")).await.unwrap();

    let config = RemindersConfig {
        lead_days: 3,
        extra_recipients: vec!["ops@example.com".to_string(), "alice@example.com".to_string()],
    };
    let report = send_reminders(
        &services.ledger,
        services.notifier.as_ref(),
        &ctx,
        date("2025-08-17"),
        &config,
    )
    .await
    .unwrap();

    assert!(report.sent);
    assert_eq!(report.reminders.len(), 1);
    assert_eq!(report.reminders[0].target_payment, dec!(400));

    let sent = notifier.sent();
    let [Sent::PaymentReminders { recipients, reminders }] = sent.as_slice() else {
        panic!("expected one reminder notice, got {:?}", sent);
    };
    assert_eq!(reminders.len(), 1);
    assert_eq!(
        recipients,
        &vec![
            "alice@example.com".to_string(),
            "bob@example.com".to_string(),
            "ops@example.com".to_string(),
        ]
    );
}
