use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Cents, CurrencyBalance, IntegrityStats, NewTransaction, Transaction, TransactionId};

use super::{CallContext, StoreError};

/// The append-only transaction log.
///
/// The store is the sole writer of the log. Entries are created exactly once and
/// never updated or deleted.
#[async_trait]
pub trait TransactionLog: Send + Sync {
    /// Append a validated transaction, assigning its id, sequence and timestamp.
    ///
    /// Atomic: either the whole row is durably stored or nothing is.
    async fn create(
        &self,
        ctx: &CallContext,
        new: &NewTransaction,
    ) -> Result<Transaction, StoreError>;

    /// Exact lookup. A malformed id fails with `InvalidId` before any lookup.
    async fn get_by_id(&self, ctx: &CallContext, id: &str) -> Result<Transaction, StoreError>;

    /// Transactions of `user_id`, optionally restricted to one currency, newest
    /// first with ties broken by sequence. `limit <= 0` returns every matching
    /// row; a negative `offset` is `InvalidPagination`. Unknown users yield an
    /// empty list.
    async fn list_by_user(
        &self,
        ctx: &CallContext,
        user_id: &str,
        currency: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Structural health of the whole log.
    async fn integrity_stats(&self, ctx: &CallContext) -> Result<IntegrityStats, StoreError>;
}

/// Balances derived from the log. Nothing here is stored independently, so a
/// balance can never drift from the transactions it summarizes.
#[async_trait]
pub trait BalanceView: Send + Sync {
    /// Exact sum of the partition's amounts, 0 when it has no transactions.
    async fn get_balance(
        &self,
        ctx: &CallContext,
        user_id: &str,
        currency: &str,
    ) -> Result<Cents, StoreError>;

    /// One entry per currency the user ever transacted in, ordered by currency.
    async fn get_all_balances(
        &self,
        ctx: &CallContext,
        user_id: &str,
    ) -> Result<Vec<CurrencyBalance>, StoreError>;
}

/// Full ledger capability set, implemented by every backing store.
pub trait LedgerStore: TransactionLog + BalanceView {}

impl<T: TransactionLog + BalanceView> LedgerStore for T {}

/// Parse a transaction id, accepting any textual form `uuid` understands.
pub fn parse_transaction_id(id: &str) -> Result<TransactionId, StoreError> {
    Uuid::parse_str(id).map_err(|_| StoreError::InvalidId(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transaction_id_forms() {
        let id = Uuid::new_v4();

        assert_eq!(parse_transaction_id(&id.to_string()), Ok(id));
        assert_eq!(parse_transaction_id(&id.simple().to_string()), Ok(id));
        assert_eq!(parse_transaction_id(&id.to_string().to_uppercase()), Ok(id));
    }

    #[test]
    fn test_parse_transaction_id_rejects_garbage() {
        for bad in ["", "abc", "550e8400-e29b-41d4-a716-44665544zzzz"] {
            assert_eq!(
                parse_transaction_id(bad),
                Err(StoreError::InvalidId(bad.to_string()))
            );
        }
    }
}
