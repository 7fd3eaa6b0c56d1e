use thiserror::Error;

use crate::domain::ValidationError;
use crate::storage::StoreError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AppError {
    /// True for caller mistakes (bad input, unknown id); false for environmental
    /// failures the caller may retry.
    pub fn is_client_error(&self) -> bool {
        match self {
            AppError::Validation(_) => true,
            AppError::Store(err) => matches!(
                err,
                StoreError::NotFound(_) | StoreError::InvalidId(_) | StoreError::InvalidPagination(_)
            ),
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(err) => match err {
                ValidationError::UserIdEmpty => "user_id_empty",
                ValidationError::UserIdInvalid => "user_id_invalid",
                ValidationError::CurrencyEmpty => "currency_empty",
                ValidationError::CurrencyInvalid => "currency_invalid",
                ValidationError::AmountInvalid => "amount_invalid",
            },
            AppError::Store(err) => match err {
                StoreError::NotFound(_) => "not_found",
                StoreError::InvalidId(_) => "invalid_id",
                StoreError::InvalidPagination(_) => "invalid_pagination",
                StoreError::Unavailable(_) => "store_unavailable",
                StoreError::Canceled => "canceled",
                StoreError::Timeout => "timeout",
                StoreError::BalanceOverflow { .. } => "balance_overflow",
                StoreError::Corrupt(_) => "corrupt",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::domain::PageError;

    #[test]
    fn test_client_errors() {
        assert!(AppError::from(ValidationError::CurrencyInvalid).is_client_error());
        assert!(AppError::from(StoreError::NotFound(Uuid::nil())).is_client_error());
        assert!(AppError::from(StoreError::InvalidId("x".into())).is_client_error());
        assert!(AppError::from(StoreError::from(PageError::NegativeOffset(-1))).is_client_error());
    }

    #[test]
    fn test_server_errors() {
        assert!(!AppError::from(StoreError::Timeout).is_client_error());
        assert!(!AppError::from(StoreError::Canceled).is_client_error());
        assert!(!AppError::from(StoreError::Unavailable("down".into())).is_client_error());
    }

    #[test]
    fn test_codes_and_messages() {
        let err = AppError::from(ValidationError::UserIdEmpty);

        assert_eq!(err.code(), "user_id_empty");
        assert_eq!(err.to_string(), "user_id cannot be empty");
        assert_eq!(AppError::from(StoreError::Timeout).code(), "timeout");
    }

    #[test]
    fn test_store_error_reported_once() {
        let err = AppError::from(StoreError::InvalidId("not-a-uuid".into()));

        assert_eq!(err.to_string(), r#"invalid transaction id: "not-a-uuid""#);
        assert_eq!(
            format!("{:#}", anyhow::Error::from(err)),
            r#"invalid transaction id: "not-a-uuid""#
        );
    }

    #[test]
    fn test_validation_error_reported_once() {
        let err = anyhow::Error::from(AppError::from(ValidationError::CurrencyInvalid));

        assert_eq!(
            format!("{:#}", err),
            "currency must be lower-case alphanumeric or underscore and max 32 characters"
        );
    }
}
