use thiserror::Error;

use crate::domain::{BalanceOverflow, PageError, TransactionId};

/// Failures surfaced by a ledger store.
///
/// Stores never retry and never log these; the caller decides how to react.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("transaction not found: {0}")]
    NotFound(TransactionId),

    #[error("invalid transaction id: {0:?}")]
    InvalidId(String),

    #[error("invalid pagination: {0}")]
    InvalidPagination(#[from] PageError),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("operation canceled")]
    Canceled,

    #[error("operation timed out")]
    Timeout,

    #[error("balance overflow for user {user_id} in currency {currency}")]
    BalanceOverflow { user_id: String, currency: String },

    #[error("corrupt ledger row: {0}")]
    Corrupt(String),
}

impl From<BalanceOverflow> for StoreError {
    fn from(err: BalanceOverflow) -> Self {
        StoreError::BalanceOverflow {
            user_id: err.user_id,
            currency: err.currency,
        }
    }
}

/// Map an sqlx error to a store error, naming the failed operation.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            StoreError::Unavailable(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("timed out acquiring a connection in {}", operation))
        }
        sqlx::Error::ColumnDecode { index, source } => {
            StoreError::Corrupt(format!("cannot decode column {} in {}: {}", index, operation, source))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// SQLite reports `SUM()` leaving the integer range as "integer overflow".
pub(crate) fn is_integer_overflow(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.message().contains("integer overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_closed_is_unavailable() {
        let err = map_sqlx_error("create", sqlx::Error::PoolClosed);

        assert_eq!(
            err,
            StoreError::Unavailable("connection pool closed in create".to_string())
        );
    }

    #[test]
    fn test_page_error_converts() {
        let err: StoreError = PageError::NegativeOffset(-3).into();

        assert_eq!(err, StoreError::InvalidPagination(PageError::NegativeOffset(-3)));
    }

    #[test]
    fn test_overflow_converts() {
        let err: StoreError = BalanceOverflow {
            user_id: "u1".into(),
            currency: "usd".into(),
        }
        .into();

        assert!(matches!(err, StoreError::BalanceOverflow { .. }));
    }
}
