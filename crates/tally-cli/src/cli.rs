//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

/// Tally - Shared-expense ledger
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Ingest bank CSVs, split shared expenses, track card balances", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to ~/.local/share/tally/config.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database path (overrides storage.path)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set TALLY_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database, tables and blob directory
    Init,

    /// Store a CSV and queue it for the worker
    Upload {
        /// CSV file to upload
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Store a CSV and process it right away
    Ingest {
        /// CSV file to ingest
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Process queued uploads
    Worker {
        /// Drain the queue once and exit
        #[arg(long)]
        once: bool,

        /// Seconds to wait between polls
        #[arg(long, default_value = "30")]
        poll_secs: u64,
    },

    /// Manage credit cards (list, add, remove)
    Cards {
        #[command(subcommand)]
        action: Option<CardsAction>,
    },

    /// Manage people in the group (list, add)
    People {
        #[command(subcommand)]
        action: Option<PeopleAction>,
    },

    /// Show or replace a month's savings plan
    Savings {
        #[command(subcommand)]
        action: SavingsAction,
    },

    /// List stored transactions
    Transactions {
        /// Month to list (YYYY-MM); all months when omitted
        #[arg(short, long)]
        month: Option<String>,
    },

    /// Send payment reminders for cards due soon
    Remind {
        /// Pretend today is this date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum CardsAction {
    /// List cards with utilization and target payment
    List,

    /// Add or replace a card
    Add {
        /// Card name
        name: String,

        /// Account number the bank export uses for this card
        #[arg(short, long)]
        account: i64,

        /// Credit limit
        #[arg(short, long)]
        limit: Decimal,

        /// Day of month the payment is due (1-31)
        #[arg(short, long)]
        due_day: u32,

        /// Card id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Last statement balance
        #[arg(long, default_value = "0")]
        statement_balance: Decimal,

        /// Current balance
        #[arg(long, default_value = "0")]
        current_balance: Decimal,

        /// Balance is correct as of this date (YYYY-MM-DD); earlier
        /// transactions will not move it
        #[arg(long)]
        reconciled: Option<String>,
    },

    /// Remove a card by id
    Remove {
        /// Card id
        id: String,
    },
}

#[derive(Subcommand)]
pub enum PeopleAction {
    /// List people and their accounts
    List,

    /// Add or replace a person (keyed by email)
    Add {
        /// Display name
        name: String,

        /// Email address
        #[arg(short, long)]
        email: String,

        /// Account number owned by this person (repeatable)
        #[arg(short, long = "account")]
        accounts: Vec<i64>,
    },
}

#[derive(Subcommand)]
pub enum SavingsAction {
    /// Show a month's savings plan
    Show {
        /// Month (YYYY-MM)
        month: String,
    },

    /// Replace a month's savings plan from a JSON file
    ///
    /// Format: {"startingBalance": "2000", "items": [{"name": "Rent", "cost": "1200"}]}
    Set {
        /// Month (YYYY-MM)
        month: String,

        /// JSON file with the plan
        #[arg(short, long)]
        file: PathBuf,
    },
}
