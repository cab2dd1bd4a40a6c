//! CLI command tests
//!
//! Every test runs against the in-memory backends.

use std::io::Write;
use std::path::PathBuf;

use rust_decimal_macros::dec;
use tally_core::{Config, RunContext, RunOutcome, Services, StorageBackend};
use tempfile::TempDir;

use crate::commands::{self, money, truncate, NewCard};

const AUGUST: &str = "Date,Name,Account Number,Amount,Category,Ignored From
2025-08-02,Whole Foods,1111,120.00,Groceries,
2025-08-03,Vet Clinic,1111,30.00,Pets,
2025-08-05,Electric Co,2222,50.00,Bills & Utilities,
2025-08-07,Bonus Refund,1111,-10.00,Other,
2025-08-09,Birthday Gift,2222,80.00,Shared Purchases,everything
2025-08-17,Coffee,1111,4.50,Dining & Drinks,
2025-08-17,Coffee,1111,4.50,Dining & Drinks,";

async fn setup_services() -> Services {
    commands::open_services(Config::in_memory()).await.unwrap()
}

fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

fn visa(reconciled: Option<&str>) -> NewCard {
    NewCard {
        name: "Household Visa".to_string(),
        account_number: 1111,
        credit_limit: dec!(1000),
        due_day: 20,
        id: Some("visa".to_string()),
        statement_balance: dec!(0),
        current_balance: dec!(500),
        reconciled: reconciled.map(str::to_string),
    }
}

async fn add_household(services: &Services) {
    commands::cmd_people_add(services, "Alice", "alice@example.com", vec![1111])
        .await
        .unwrap();
    commands::cmd_people_add(services, "Bob", "bob@example.com", vec![2222])
        .await
        .unwrap();
}

// ========== Helper Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("Coffee", 10), "Coffee");
    assert_eq!(truncate("Whole Foods Market", 10), "Whole F...");
    assert_eq!(truncate("Café Crème Brûlée", 8), "Café ...");
}

#[test]
fn test_money() {
    assert_eq!(money(dec!(4.5)), "$4.50");
    assert_eq!(money(dec!(-50)), "-$50.00");
    assert_eq!(money(dec!(1234567.891)), "$1,234,567.89");
    assert_eq!(money(dec!(0)), "$0.00");
    assert_eq!(money(dec!(-0.001)), "$0.00");
}

// ========== Config Tests ==========

#[test]
fn test_load_config_db_flag_selects_sqlite() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("tally.db");
    let config = commands::load_config(None, Some(&db), true).unwrap();

    assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    assert_eq!(config.storage.path.as_deref(), Some(db.as_path()));
    assert!(!config.storage.encrypt);
    if std::env::var("TALLY_BLOB_ROOT").is_err() {
        assert_eq!(config.blob.root, Some(dir.path().join("blobs")));
    }
}

#[test]
fn test_load_config_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    let result = commands::load_config(Some(&dir.path().join("nope.toml")), None, false);
    assert!(result.is_err());
}

#[tokio::test]
async fn test_cmd_init_sqlite() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("data").join("tally.db");
    let mut config = commands::load_config(None, Some(&db), true).unwrap();
    config.blob.root = Some(dir.path().join("blobs"));

    commands::cmd_init(config).await.unwrap();
    assert!(db.exists());
}

// ========== Ingest Tests ==========

#[tokio::test]
async fn test_cmd_ingest_reconciles_and_attributes() {
    let services = setup_services().await;
    let dir = TempDir::new().unwrap();
    add_household(&services).await;
    commands::cmd_cards_add(&services, visa(Some("2025-08-01")))
        .await
        .unwrap();

    let file = write_file(&dir, "august.csv", AUGUST);
    let outcome = commands::cmd_ingest(&services, &file).await.unwrap();

    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run, got {:?}", outcome);
    };
    assert_eq!(summary.parsed, 7);
    assert_eq!(summary.inserted, 7);
    assert!(summary.notified);

    let card = services
        .ledger
        .get_card(&RunContext::background(), "visa")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(card.current_balance, dec!(649.00));
}

#[tokio::test]
async fn test_cmd_ingest_twice_inserts_nothing_new() {
    let services = setup_services().await;
    let dir = TempDir::new().unwrap();
    let file = write_file(&dir, "august.csv", AUGUST);

    commands::cmd_ingest(&services, &file).await.unwrap();
    let outcome = commands::cmd_ingest(&services, &file).await.unwrap();

    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run, got {:?}", outcome);
    };
    assert_eq!(summary.inserted, 0);
    assert!(summary.reconciliation.is_none());
}

#[tokio::test]
async fn test_cmd_ingest_all_rows_invalid() {
    let services = setup_services().await;
    let dir = TempDir::new().unwrap();
    let file = write_file(
        &dir,
        "bad.csv",
        "Date,Name,Account Number,Amount,Category,Ignored From\nnot-a-date,Coffee,1111,4.50,Dining & Drinks,",
    );

    let outcome = commands::cmd_ingest(&services, &file).await.unwrap();
    assert!(matches!(outcome, RunOutcome::ValidationFailed { .. }));
}

#[tokio::test]
async fn test_cmd_ingest_missing_file() {
    let services = setup_services().await;
    let result = commands::cmd_ingest(&services, &PathBuf::from("/nonexistent/file.csv")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_cmd_ingest_rejects_oversized_file() {
    let mut config = Config::in_memory();
    config.ingest.max_upload_bytes = 16;
    let services = commands::open_services(config).await.unwrap();
    let dir = TempDir::new().unwrap();
    let file = write_file(&dir, "august.csv", AUGUST);

    assert!(commands::cmd_ingest(&services, &file).await.is_err());
}

#[tokio::test]
async fn test_cmd_upload_then_worker_once() {
    let services = setup_services().await;
    let dir = TempDir::new().unwrap();
    let file = write_file(&dir, "august.csv", AUGUST);

    commands::cmd_upload(&services, &file).await.unwrap();
    let report = commands::cmd_worker(&services, true, 30).await.unwrap();

    assert_eq!(report.received, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(report.inserted, 7);

    let stored = services
        .ledger
        .list_transactions(&RunContext::background(), Some("2025-08"))
        .await
        .unwrap();
    assert_eq!(stored.len(), 7);
}

#[tokio::test]
async fn test_cmd_worker_once_on_empty_queue() {
    let services = setup_services().await;
    let report = commands::cmd_worker(&services, true, 30).await.unwrap();
    assert_eq!(report.received, 0);
}

// ========== Cards Tests ==========

#[tokio::test]
async fn test_cmd_cards_add_list_remove() {
    let services = setup_services().await;
    assert!(commands::cmd_cards_list(&services).await.unwrap().is_empty());

    commands::cmd_cards_add(&services, visa(None)).await.unwrap();
    let cards = commands::cmd_cards_list(&services).await.unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].utilization, dec!(0.5));
    assert_eq!(cards[0].target_payment, dec!(400));

    commands::cmd_cards_remove(&services, "visa").await.unwrap();
    assert!(commands::cmd_cards_list(&services).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cmd_cards_add_generates_id() {
    let services = setup_services().await;
    let mut new = visa(Some("2025-08-01"));
    new.id = None;

    let card = commands::cmd_cards_add(&services, new).await.unwrap();
    assert!(!card.id.is_empty());
    assert_eq!(card.last_reconciled.map(|d| d.to_string()), Some("2025-08-01".to_string()));
}

#[tokio::test]
async fn test_cmd_cards_add_rejects_bad_input() {
    let services = setup_services().await;

    let mut bad_date = visa(Some("08/01/2025"));
    bad_date.id = Some("a".to_string());
    assert!(commands::cmd_cards_add(&services, bad_date).await.is_err());

    let mut bad_day = visa(None);
    bad_day.due_day = 32;
    assert!(commands::cmd_cards_add(&services, bad_day).await.is_err());
}

#[tokio::test]
async fn test_cmd_cards_remove_unknown() {
    let services = setup_services().await;
    assert!(commands::cmd_cards_remove(&services, "missing").await.is_err());
}

// ========== People Tests ==========

#[tokio::test]
async fn test_cmd_people_add_and_list() {
    let services = setup_services().await;
    add_household(&services).await;

    let people = commands::cmd_people_list(&services).await.unwrap();
    assert_eq!(people.len(), 2);
    assert!(people
        .iter()
        .any(|p| p.name == "Alice" && p.account_numbers == vec![1111]));
}

// ========== Savings Tests ==========

#[tokio::test]
async fn test_cmd_savings_set_and_show() {
    let services = setup_services().await;
    let dir = TempDir::new().unwrap();
    let file = write_file(
        &dir,
        "plan.json",
        r#"{"startingBalance": "2000", "items": [{"name": "Rent", "cost": "1200"}, {"name": "Car", "cost": "300.50"}]}"#,
    );

    commands::cmd_savings_set(&services, "2025-08", &file).await.unwrap();
    let data = commands::cmd_savings_show(&services, "2025-08").await.unwrap();

    assert_eq!(data.starting_balance, dec!(2000));
    assert_eq!(data.items.len(), 2);
    assert_eq!(data.remaining(), dec!(499.50));
}

#[tokio::test]
async fn test_cmd_savings_show_unsaved_month() {
    let services = setup_services().await;
    let data = commands::cmd_savings_show(&services, "2025-09").await.unwrap();
    assert!(data.items.is_empty());
    assert_eq!(data.starting_balance, dec!(0));
}

#[tokio::test]
async fn test_cmd_savings_rejects_bad_input() {
    let services = setup_services().await;
    let dir = TempDir::new().unwrap();
    let bad_json = write_file(&dir, "plan.json", "{ not json");

    assert!(commands::cmd_savings_set(&services, "2025-08", &bad_json).await.is_err());
    assert!(commands::cmd_savings_show(&services, "August").await.is_err());
}

// ========== Transactions Tests ==========

#[tokio::test]
async fn test_cmd_transactions_by_month() {
    let services = setup_services().await;
    let dir = TempDir::new().unwrap();
    let file = write_file(&dir, "august.csv", AUGUST);
    commands::cmd_ingest(&services, &file).await.unwrap();

    let august = commands::cmd_transactions(&services, Some("2025-08")).await.unwrap();
    assert_eq!(august.len(), 7);
    assert!(august.windows(2).all(|w| w[0].date >= w[1].date));

    let july = commands::cmd_transactions(&services, Some("2025-07")).await.unwrap();
    assert!(july.is_empty());

    let all = commands::cmd_transactions(&services, None).await.unwrap();
    assert_eq!(all.len(), 7);
}

#[tokio::test]
async fn test_cmd_transactions_invalid_month() {
    let services = setup_services().await;
    assert!(commands::cmd_transactions(&services, Some("2025-13")).await.is_err());
}

// ========== Remind Tests ==========

#[tokio::test]
async fn test_cmd_remind_sends_to_people() {
    let services = setup_services().await;
    add_household(&services).await;
    commands::cmd_cards_add(&services, visa(None)).await.unwrap();

    let report = commands::cmd_remind(&services, Some("2025-08-17")).await.unwrap();
    assert_eq!(report.reminders.len(), 1);
    assert_eq!(report.reminders[0].target_payment, dec!(400));
    assert!(report.sent);
    assert_eq!(report.recipients.len(), 2);
}

#[tokio::test]
async fn test_cmd_remind_nothing_due() {
    let services = setup_services().await;
    commands::cmd_cards_add(&services, visa(None)).await.unwrap();

    let report = commands::cmd_remind(&services, Some("2025-08-01")).await.unwrap();
    assert!(report.reminders.is_empty());
    assert!(!report.sent);
}

#[tokio::test]
async fn test_cmd_remind_without_recipients() {
    let services = setup_services().await;
    commands::cmd_cards_add(&services, visa(None)).await.unwrap();

    let report = commands::cmd_remind(&services, Some("2025-08-17")).await.unwrap();
    assert_eq!(report.reminders.len(), 1);
    assert!(!report.sent);
}

#[tokio::test]
async fn test_cmd_remind_bad_date() {
    let services = setup_services().await;
    assert!(commands::cmd_remind(&services, Some("tomorrow")).await.is_err());
}
