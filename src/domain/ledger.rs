use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use super::{is_valid_currency, Cents, CurrencyBalance, Transaction};

/// Summing a partition left the 64-bit signed range.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("balance overflow for user {user_id} in currency {currency}")]
pub struct BalanceOverflow {
    pub user_id: String,
    pub currency: String,
}

/// Exact sum of `amounts`, or `None` when the total does not fit in `Cents`.
///
/// Accumulates in `i128`, so intermediate totals never overflow and the result
/// does not depend on the order of the amounts.
pub fn exact_sum(amounts: impl IntoIterator<Item = Cents>) -> Option<Cents> {
    let total: i128 = amounts.into_iter().map(i128::from).sum();
    Cents::try_from(total).ok()
}

/// Compute the balance of one `(user_id, currency)` partition.
/// Balance = exact sum of the partition's amounts; 0 when it is empty.
pub fn compute_balance(
    transactions: &[Transaction],
    user_id: &str,
    currency: &str,
) -> Result<Cents, BalanceOverflow> {
    exact_sum(
        transactions
            .iter()
            .filter(|t| t.is_in_partition(user_id, currency))
            .map(|t| t.amount),
    )
    .ok_or_else(|| BalanceOverflow {
        user_id: user_id.to_string(),
        currency: currency.to_string(),
    })
}

/// Compute one balance per currency the user has ever transacted in, ordered by
/// currency. Currencies netting to zero are kept.
pub fn compute_all_balances(
    transactions: &[Transaction],
    user_id: &str,
) -> Result<Vec<CurrencyBalance>, BalanceOverflow> {
    fold_balances(
        user_id,
        transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| (t.currency.as_str(), t.amount)),
    )
}

/// Group `(currency, amount)` pairs of one user into per-currency balances,
/// ordered by currency.
pub fn fold_balances<'a>(
    user_id: &str,
    entries: impl IntoIterator<Item = (&'a str, Cents)>,
) -> Result<Vec<CurrencyBalance>, BalanceOverflow> {
    let mut totals: BTreeMap<&str, i128> = BTreeMap::new();
    for (currency, amount) in entries {
        *totals.entry(currency).or_insert(0) += i128::from(amount);
    }

    totals
        .into_iter()
        .map(|(currency, total)| {
            let balance = Cents::try_from(total).map_err(|_| BalanceOverflow {
                user_id: user_id.to_string(),
                currency: currency.to_string(),
            })?;
            Ok(CurrencyBalance {
                currency: currency.to_string(),
                balance,
            })
        })
        .collect()
}

/// Listing order: newest timestamp first, higher sequence first on ties.
pub fn newest_first(a: &Transaction, b: &Transaction) -> Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then_with(|| b.sequence.cmp(&a.sequence))
}

/// Statistics for ledger integrity verification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityStats {
    pub transaction_count: i64,
    /// Sequence numbers are not a contiguous run
    pub has_sequence_gaps: bool,
    /// Rows whose timestamp is earlier than their predecessor in sequence order
    pub timestamp_regressions: i64,
    /// Rows whose currency is empty, too long or outside `[a-z0-9_]`
    pub invalid_currencies: i64,
}

impl IntegrityStats {
    pub fn is_healthy(&self) -> bool {
        !self.has_sequence_gaps && self.timestamp_regressions == 0 && self.invalid_currencies == 0
    }
}

/// Build integrity statistics from the full ledger.
pub fn integrity_stats(transactions: &[Transaction]) -> IntegrityStats {
    let mut by_sequence: Vec<&Transaction> = transactions.iter().collect();
    by_sequence.sort_by_key(|t| t.sequence);

    let has_sequence_gaps = match (by_sequence.first(), by_sequence.last()) {
        (Some(first), Some(last)) => {
            (last.sequence - first.sequence + 1) != by_sequence.len() as i64
        }
        _ => false,
    };

    let timestamp_regressions = by_sequence
        .windows(2)
        .filter(|pair| pair[1].timestamp < pair[0].timestamp)
        .count() as i64;

    let invalid_currencies = transactions
        .iter()
        .filter(|t| !is_valid_currency(&t.currency))
        .count() as i64;

    IntegrityStats {
        transaction_count: transactions.len() as i64,
        has_sequence_gaps,
        timestamp_regressions,
        invalid_currencies,
    }
}
