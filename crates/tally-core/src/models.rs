//! Domain models for Tally

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Spending category of a transaction
///
/// Labels outside the fixed set are kept verbatim as `Unclassified` rather
/// than rejected, so an export with a new bank category still imports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Dining,
    Groceries,
    Pets,
    Bills,
    SharedPurchases,
    SharedSubscriptions,
    Travel,
    Other,
    Unclassified(String),
}

impl Category {
    /// Categories that show up as columns in the expense summary
    pub const TRACKED: [Category; 7] = [
        Category::Dining,
        Category::Groceries,
        Category::Pets,
        Category::Bills,
        Category::SharedPurchases,
        Category::SharedSubscriptions,
        Category::Travel,
    ];

    pub fn from_label(label: &str) -> Self {
        match label {
            "Dining & Drinks" => Self::Dining,
            "Groceries" => Self::Groceries,
            "Pets" => Self::Pets,
            "Bills & Utilities" => Self::Bills,
            "Shared Purchases" => Self::SharedPurchases,
            "Shared Subscriptions" => Self::SharedSubscriptions,
            "Travel & Vacation" => Self::Travel,
            "Other" => Self::Other,
            other => Self::Unclassified(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Dining => "Dining & Drinks",
            Self::Groceries => "Groceries",
            Self::Pets => "Pets",
            Self::Bills => "Bills & Utilities",
            Self::SharedPurchases => "Shared Purchases",
            Self::SharedSubscriptions => "Shared Subscriptions",
            Self::Travel => "Travel & Vacation",
            Self::Other => "Other",
            Self::Unclassified(label) => label,
        }
    }

    /// True for the fixed spending categories (not `Other`, not unclassified)
    pub fn is_tracked(&self) -> bool {
        !matches!(self, Self::Other | Self::Unclassified(_))
    }
}

impl From<String> for Category {
    fn from(label: String) -> Self {
        Self::from_label(&label)
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.as_str().to_string()
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Exclusion flag from the `Ignored From` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IgnoredFrom {
    #[default]
    #[serde(rename = "")]
    Nothing,
    #[serde(rename = "budget")]
    Budget,
    #[serde(rename = "everything")]
    Everything,
}

impl IgnoredFrom {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nothing => "",
            Self::Budget => "budget",
            Self::Everything => "everything",
        }
    }

    /// Parse a column value; empty means no exclusion. Case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "" => Some(Self::Nothing),
            "budget" => Some(Self::Budget),
            "everything" => Some(Self::Everything),
            _ => None,
        }
    }
}

impl std::fmt::Display for IgnoredFrom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nothing => write!(f, "none"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// A single ledger entry parsed from one CSV row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub date: NaiveDate,
    pub name: String,
    pub account_number: i64,
    /// Positive = charge/expense, negative = credit/payment
    pub amount: Decimal,
    pub category: Category,
    #[serde(default)]
    pub ignore: IgnoredFrom,
}

impl Transaction {
    /// Whether this transaction participates in the expense split
    pub fn counts_toward_split(&self) -> bool {
        self.ignore == IgnoredFrom::Nothing && self.category.is_tracked()
    }
}

/// A party in the expense-sharing group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub name: String,
    pub email: String,
    pub account_numbers: Vec<i64>,
    /// Attributed during a run; never persisted
    #[serde(skip)]
    pub transactions: Vec<Transaction>,
}

impl Person {
    pub fn new(name: impl Into<String>, email: impl Into<String>, account_numbers: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            account_numbers,
            transactions: Vec::new(),
        }
    }

    pub fn owns(&self, account_number: i64) -> bool {
        self.account_numbers.contains(&account_number)
    }

    pub fn add_transaction(&mut self, transaction: Transaction) {
        self.transactions.push(transaction);
    }

    /// Total of attributed amounts, optionally restricted to one category
    pub fn expenses(&self, category: Option<&Category>) -> Decimal {
        self.transactions
            .iter()
            .filter(|t| category.map_or(true, |c| &t.category == c))
            .map(|t| t.amount)
            .sum()
    }

    pub fn oldest_transaction(&self) -> Option<NaiveDate> {
        self.transactions.iter().map(|t| t.date).min()
    }

    pub fn newest_transaction(&self) -> Option<NaiveDate> {
        self.transactions.iter().map(|t| t.date).max()
    }
}

/// All persons sharing one ledger, built fresh for each ingestion run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Group {
    pub members: Vec<Person>,
}

impl Group {
    pub fn new(members: Vec<Person>) -> Self {
        Self { members }
    }

    /// Attribute transactions to their owners by account number.
    ///
    /// When two people list the same account the first one listed wins.
    /// Only transactions that count toward the split are attributed.
    /// Returns the number of transactions attributed.
    pub fn add_transactions(&mut self, transactions: &[Transaction]) -> usize {
        let mut owners: HashMap<i64, usize> = HashMap::new();
        for (idx, person) in self.members.iter().enumerate() {
            for account in &person.account_numbers {
                owners.entry(*account).or_insert(idx);
            }
        }

        let mut attributed = 0;
        for t in transactions.iter().filter(|t| t.counts_toward_split()) {
            if let Some(&idx) = owners.get(&t.account_number) {
                self.members[idx].add_transaction(t.clone());
                attributed += 1;
            }
        }
        attributed
    }

    pub fn has_transactions(&self) -> bool {
        self.members.iter().any(|p| !p.transactions.is_empty())
    }

    /// Total expenses across all members
    pub fn expenses(&self) -> Decimal {
        self.members.iter().map(|p| p.expenses(None)).sum()
    }

    /// `p1`'s expenses minus `p2`'s, optionally within one category
    pub fn expenses_difference(&self, p1: &Person, p2: &Person, category: Option<&Category>) -> Decimal {
        p1.expenses(category) - p2.expenses(category)
    }

    /// How much `person` owes the rest of the group.
    ///
    /// `share = total × scale_factor`; debt = share − person's expenses.
    /// Positive means the person owes, negative means they are owed.
    pub fn debt(&self, person: &Person, scale_factor: Decimal) -> Decimal {
        self.expenses() * scale_factor - person.expenses(None)
    }

    /// Non-empty member emails in member order
    pub fn emails(&self) -> Vec<String> {
        self.members
            .iter()
            .filter(|p| !p.email.is_empty())
            .map(|p| p.email.clone())
            .collect()
    }

    /// Oldest and newest attributed transaction dates
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let oldest = self.members.iter().filter_map(|p| p.oldest_transaction()).min()?;
        let newest = self.members.iter().filter_map(|p| p.newest_transaction()).max()?;
        Some((oldest, newest))
    }
}

/// Utilization the target payment aims for
pub const TARGET_UTILIZATION: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

/// A tracked credit card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditCard {
    pub id: String,
    pub name: String,
    pub account_number: i64,
    pub credit_limit: Decimal,
    /// Day of month the payment is due
    pub due_day: u32,
    pub statement_balance: Decimal,
    pub current_balance: Decimal,
    /// Transactions dated strictly before this are excluded from balance updates
    #[serde(default)]
    pub last_reconciled: Option<NaiveDate>,
}

impl CreditCard {
    /// `current_balance / credit_limit`, zero when there is no limit
    pub fn utilization(&self) -> Decimal {
        if self.credit_limit.is_zero() {
            return Decimal::ZERO;
        }
        self.current_balance / self.credit_limit
    }

    /// Payment needed to bring utilization down to 10%
    pub fn target_payment(&self) -> Decimal {
        self.current_balance - self.statement_balance - self.credit_limit * TARGET_UTILIZATION
    }
}

/// Read-side view of a card including the derived fields
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSnapshot {
    #[serde(flatten)]
    pub card: CreditCard,
    pub utilization: Decimal,
    pub target_payment: Decimal,
}

impl From<CreditCard> for CardSnapshot {
    fn from(card: CreditCard) -> Self {
        Self {
            utilization: card.utilization(),
            target_payment: card.target_payment(),
            card,
        }
    }
}

/// A named cost in a month's savings plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavingsItem {
    pub name: String,
    pub cost: Decimal,
}

/// One month of savings data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsData {
    pub starting_balance: Decimal,
    #[serde(default)]
    pub items: Vec<SavingsItem>,
}

impl SavingsData {
    pub fn total_cost(&self) -> Decimal {
        self.items.iter().map(|i| i.cost).sum()
    }

    /// Balance left after every item is paid
    pub fn remaining(&self) -> Decimal {
        self.starting_balance - self.total_cost()
    }
}
