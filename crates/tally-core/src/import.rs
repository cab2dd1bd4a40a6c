//! CSV import for bank-exported transaction files
//!
//! Columns are matched by trimmed header name, so exports with reordered or
//! extra columns still import. Bad rows never fail the batch: each one is
//! dropped and described in `row_errors`.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use rust_decimal::Decimal;
use tracing::debug;

use crate::models::{Category, IgnoredFrom, Transaction};

pub const COL_DATE: &str = "Date";
pub const COL_NAME: &str = "Name";
pub const COL_ACCOUNT: &str = "Account Number";
pub const COL_AMOUNT: &str = "Amount";
pub const COL_CATEGORY: &str = "Category";
pub const COL_IGNORED_FROM: &str = "Ignored From";

/// Header written by `tally` exports and expected by the parser
pub const HEADER: &str = "Date,Name,Account Number,Amount,Category,Ignored From";

/// Parsed transactions plus one message per rejected row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    pub transactions: Vec<Transaction>,
    pub row_errors: Vec<String>,
}

impl ParseOutcome {
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty() && self.row_errors.is_empty()
    }

    /// Every row was rejected
    pub fn is_validation_failure(&self) -> bool {
        self.transactions.is_empty() && !self.row_errors.is_empty()
    }
}

/// Parse raw CSV text into transactions and row errors.
///
/// Row numbers in error messages are 1-based and count the header line.
pub fn parse_csv(raw: &str) -> ParseOutcome {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(raw.as_bytes());

    let mut outcome = ParseOutcome::default();
    let mut header: Option<(HashMap<String, usize>, usize)> = None;

    for (idx, result) in rdr.records().enumerate() {
        let row = idx + 1;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                outcome.row_errors.push(format!("Row {}: {}", row, e));
                continue;
            }
        };

        let Some((columns, width)) = header.as_ref() else {
            header = Some((header_index(&record), record.len()));
            continue;
        };

        if record.len() < *width {
            outcome.row_errors.push(format!("Row {}: not enough fields", row));
            continue;
        }

        match parse_row(columns, &record) {
            Ok(transaction) => outcome.transactions.push(transaction),
            Err(msg) => outcome.row_errors.push(format!("Row {}: {}", row, msg)),
        }
    }

    debug!(
        transactions = outcome.transactions.len(),
        row_errors = outcome.row_errors.len(),
        "Parsed CSV"
    );
    outcome
}

fn header_index(header: &StringRecord) -> HashMap<String, usize> {
    header
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_string(), i))
        .collect()
}

fn column<'a>(columns: &HashMap<String, usize>, record: &'a StringRecord, name: &str) -> &'a str {
    columns
        .get(name)
        .and_then(|&i| record.get(i))
        .map(str::trim)
        .unwrap_or("")
}

fn parse_row(columns: &HashMap<String, usize>, record: &StringRecord) -> Result<Transaction, String> {
    let field = |name: &str| column(columns, record, name);

    let date_str = field(COL_DATE);
    if date_str.is_empty() {
        return Err(format!("missing {}", COL_DATE));
    }
    let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|_| format!("invalid {} format: {}", COL_DATE, date_str))?;

    let name = field(COL_NAME);
    if name.is_empty() {
        return Err(format!("missing {}", COL_NAME));
    }

    let account_str = field(COL_ACCOUNT);
    if account_str.is_empty() {
        return Err(format!("missing {}", COL_ACCOUNT));
    }
    let account_number = account_str
        .parse::<i64>()
        .map_err(|_| format!("invalid {}: {}", COL_ACCOUNT, account_str))?;

    let amount_str = field(COL_AMOUNT);
    if amount_str.is_empty() {
        return Err(format!("missing {}", COL_AMOUNT));
    }
    let amount = parse_amount(amount_str).ok_or_else(|| format!("invalid {}: {}", COL_AMOUNT, amount_str))?;

    let ignored_str = field(COL_IGNORED_FROM);
    let ignore = IgnoredFrom::parse(ignored_str)
        .ok_or_else(|| format!("invalid {}: {}", COL_IGNORED_FROM, ignored_str))?;

    Ok(Transaction {
        date,
        name: name.to_string(),
        account_number,
        amount,
        category: Category::from_label(field(COL_CATEGORY)),
        ignore,
    })
}

/// Parse a money amount exactly. Plain and scientific notation are accepted.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}
