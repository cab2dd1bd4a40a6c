//! Tally CLI - Shared-expense ledger
//!
//! Usage:
//!   tally init                    Create the database and tables
//!   tally ingest --file CSV       Import a bank export right away
//!   tally upload --file CSV       Queue a bank export for the worker
//!   tally worker --once           Process queued uploads
//!   tally remind                  Send payment reminders

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = commands::load_config(cli.config.as_deref(), cli.db.as_deref(), cli.no_encrypt)?;

    if let Commands::Init = cli.command {
        return commands::cmd_init(config).await;
    }

    let services = commands::open_services(config).await?;

    match cli.command {
        Commands::Init => Ok(()),
        Commands::Upload { file } => commands::cmd_upload(&services, &file).await,
        Commands::Ingest { file } => commands::cmd_ingest(&services, &file).await.map(|_| ()),
        Commands::Worker { once, poll_secs } => {
            commands::cmd_worker(&services, once, poll_secs).await.map(|_| ())
        }
        Commands::Cards { action } => match action {
            None | Some(CardsAction::List) => commands::cmd_cards_list(&services).await.map(|_| ()),
            Some(CardsAction::Add {
                name,
                account,
                limit,
                due_day,
                id,
                statement_balance,
                current_balance,
                reconciled,
            }) => {
                let new = commands::NewCard {
                    name,
                    account_number: account,
                    credit_limit: limit,
                    due_day,
                    id,
                    statement_balance,
                    current_balance,
                    reconciled,
                };
                commands::cmd_cards_add(&services, new).await.map(|_| ())
            }
            Some(CardsAction::Remove { id }) => commands::cmd_cards_remove(&services, &id).await,
        },
        Commands::People { action } => match action {
            None | Some(PeopleAction::List) => commands::cmd_people_list(&services).await.map(|_| ()),
            Some(PeopleAction::Add {
                name,
                email,
                accounts,
            }) => commands::cmd_people_add(&services, &name, &email, accounts)
                .await
                .map(|_| ()),
        },
        Commands::Savings { action } => match action {
            SavingsAction::Show { month } => {
                commands::cmd_savings_show(&services, &month).await.map(|_| ())
            }
            SavingsAction::Set { month, file } => {
                commands::cmd_savings_set(&services, &month, &file).await.map(|_| ())
            }
        },
        Commands::Transactions { month } => {
            commands::cmd_transactions(&services, month.as_deref()).await.map(|_| ())
        }
        Commands::Remind { date } => {
            commands::cmd_remind(&services, date.as_deref()).await.map(|_| ())
        }
    }
}
