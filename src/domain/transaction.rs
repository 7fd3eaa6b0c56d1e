use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Amounts are integers in the currency's smallest unit (cents, points, ...).
/// Integer arithmetic keeps balance sums exact regardless of summation order.
pub type Cents = i64;

pub type TransactionId = Uuid;

/// A recorded ledger entry. Transactions are immutable once created: the ledger
/// is append-only and corrections are made by recording another transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Store-assigned insertion counter, the tie-breaker for equal timestamps
    pub sequence: i64,
    pub user_id: String,
    /// Signed amount; negative values are debits
    pub amount: Cents,
    pub currency: String,
    /// Assigned by the store, non-decreasing in insertion order
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    /// True when this entry belongs to the `(user_id, currency)` partition.
    pub fn is_in_partition(&self, user_id: &str, currency: &str) -> bool {
        self.user_id == user_id && self.currency == currency
    }
}

/// Incoming, not yet validated request to record a transaction.
///
/// The amount arrives as a floating-point number (as decoded from JSON or a
/// command line) and is only converted to whole minor units by the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub user_id: String,
    pub amount: f64,
    pub currency: String,
}

impl TransactionRequest {
    pub fn new(user_id: impl Into<String>, amount: f64, currency: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            amount,
            currency: currency.into(),
        }
    }
}

/// A request that passed validation and is ready to be appended to the ledger.
/// The store trusts its format and only enforces structural constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub user_id: String,
    pub amount: Cents,
    pub currency: String,
}

impl NewTransaction {
    pub fn new(user_id: impl Into<String>, amount: Cents, currency: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            amount,
            currency: currency.into(),
        }
    }
}

/// Balance of one currency partition for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub user_id: String,
    pub currency: String,
    pub balance: Cents,
}

/// One entry of a user's per-currency balance sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyBalance {
    pub currency: String,
    pub balance: Cents,
}
