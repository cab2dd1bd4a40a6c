//! Balance reconciliation
//!
//! Newly inserted transactions move card balances: charges add to the
//! current balance, payments and credits subtract. Transactions dated
//! before a card's `last_reconciled` are already reflected in its balance
//! and are skipped.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::context::RunContext;
use crate::ledger::Ledger;
use crate::models::{CreditCard, Transaction};

/// Per-account deltas computed from one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceDeltas {
    /// Ordered by account number
    pub deltas: BTreeMap<i64, Decimal>,
    /// Transactions dropped by a card's reconciliation cutoff
    pub skipped_before_cutoff: usize,
}

/// Sum new transaction amounts per account, honouring each card's cutoff
pub fn compute_deltas(new_transactions: &[Transaction], cards: &[CreditCard]) -> BalanceDeltas {
    let by_account: HashMap<i64, &CreditCard> = cards.iter().map(|c| (c.account_number, c)).collect();

    let mut result = BalanceDeltas::default();
    for t in new_transactions {
        let cutoff = by_account
            .get(&t.account_number)
            .and_then(|card| card.last_reconciled);
        if cutoff.is_some_and(|cutoff| t.date < cutoff) {
            result.skipped_before_cutoff += 1;
            continue;
        }
        *result.deltas.entry(t.account_number).or_insert(Decimal::ZERO) += t.amount;
    }
    result
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceUpdate {
    pub account_number: i64,
    pub delta: Decimal,
    pub new_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceFailure {
    pub account_number: i64,
    pub delta: Decimal,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub applied: Vec<BalanceUpdate>,
    /// Accounts with a delta but no tracked card
    pub untracked: Vec<i64>,
    pub failed: Vec<BalanceFailure>,
    pub skipped_before_cutoff: usize,
}

/// Apply deltas from newly inserted transactions to card balances.
///
/// Each account is updated independently; one failure is logged and
/// recorded without stopping the others.
pub async fn reconcile(
    ledger: &Ledger,
    ctx: &RunContext,
    new_transactions: &[Transaction],
    cards: &[CreditCard],
) -> ReconcileReport {
    let BalanceDeltas {
        deltas,
        skipped_before_cutoff,
    } = compute_deltas(new_transactions, cards);

    let mut report = ReconcileReport {
        skipped_before_cutoff,
        ..ReconcileReport::default()
    };

    for (account_number, delta) in deltas {
        match ledger.update_card_balance(ctx, account_number, delta).await {
            Ok(Some(new_balance)) => report.applied.push(BalanceUpdate {
                account_number,
                delta,
                new_balance,
            }),
            Ok(None) => {
                debug!(account_number, %delta, "No tracked card for account");
                report.untracked.push(account_number);
            }
            Err(e) => {
                error!(account_number, %delta, "Failed to update card balance: {}", e);
                report.failed.push(BalanceFailure {
                    account_number,
                    delta,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        applied = report.applied.len(),
        untracked = report.untracked.len(),
        failed = report.failed.len(),
        skipped_before_cutoff,
        "Reconciled balances"
    );
    report
}
