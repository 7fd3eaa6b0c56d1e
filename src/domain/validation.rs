use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

use super::{Cents, NewTransaction, TransactionRequest};

/// Longest accepted currency code.
pub const MAX_CURRENCY_LEN: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("user_id cannot be empty")]
    UserIdEmpty,

    #[error("user_id must be a valid UUID")]
    UserIdInvalid,

    #[error("currency cannot be empty")]
    CurrencyEmpty,

    #[error("currency must be lower-case alphanumeric or underscore and max 32 characters")]
    CurrencyInvalid,

    #[error("amount must be a finite whole number of minor units")]
    AmountInvalid,
}

/// Which user identifiers a validator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserIdPolicy {
    /// Canonical lower-case UUID (8-4-4-4-12 hex groups)
    #[default]
    Uuid,
    /// Any non-empty string
    Opaque,
}

impl UserIdPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserIdPolicy::Uuid => "uuid",
            UserIdPolicy::Opaque => "opaque",
        }
    }
}

impl FromStr for UserIdPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uuid" => Ok(UserIdPolicy::Uuid),
            "opaque" => Ok(UserIdPolicy::Opaque),
            _ => Err(format!("unknown user id policy: {s} (expected uuid or opaque)")),
        }
    }
}

impl std::fmt::Display for UserIdPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// True for `^[a-z0-9_]{1,32}$`.
pub fn is_valid_currency(currency: &str) -> bool {
    !currency.is_empty()
        && currency.len() <= MAX_CURRENCY_LEN
        && currency
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// True only for the canonical lower-case hyphenated form,
/// e.g. `550e8400-e29b-41d4-a716-446655440000`.
pub fn is_canonical_uuid(id: &str) -> bool {
    Uuid::try_parse(id).is_ok_and(|uuid| uuid.hyphenated().to_string() == id)
}

/// Stateless rule-checker for incoming transaction requests.
///
/// Holds its policy as plain configuration, so a validator can be shared freely
/// and several validators with different policies can coexist in one process.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    user_id_policy: UserIdPolicy,
}

impl Validator {
    pub fn new(user_id_policy: UserIdPolicy) -> Self {
        Self { user_id_policy }
    }

    pub fn user_id_policy(&self) -> UserIdPolicy {
        self.user_id_policy
    }

    /// Validate a request and convert it into a ledger-ready transaction.
    ///
    /// Checks run in order user id, currency, amount; the first failure wins.
    pub fn validate_transaction_request(
        &self,
        req: &TransactionRequest,
    ) -> Result<NewTransaction, ValidationError> {
        self.validate_user_id(&req.user_id)?;
        self.validate_currency(&req.currency)?;
        let amount = self.validate_amount(req.amount)?;

        Ok(NewTransaction {
            user_id: req.user_id.clone(),
            amount,
            currency: req.currency.clone(),
        })
    }

    pub fn validate_user_id(&self, user_id: &str) -> Result<(), ValidationError> {
        if user_id.is_empty() {
            return Err(ValidationError::UserIdEmpty);
        }
        match self.user_id_policy {
            UserIdPolicy::Opaque => Ok(()),
            UserIdPolicy::Uuid if is_canonical_uuid(user_id) => Ok(()),
            UserIdPolicy::Uuid => Err(ValidationError::UserIdInvalid),
        }
    }

    pub fn validate_currency(&self, currency: &str) -> Result<(), ValidationError> {
        if currency.is_empty() {
            return Err(ValidationError::CurrencyEmpty);
        }
        if !is_valid_currency(currency) {
            return Err(ValidationError::CurrencyInvalid);
        }
        Ok(())
    }

    /// Convert a floating-point amount to whole minor units.
    /// NaN, infinities, fractions and values outside the i64 range are rejected.
    pub fn validate_amount(&self, amount: f64) -> Result<Cents, ValidationError> {
        // i64::MAX as f64 rounds up to 2^63, which is itself out of range.
        let in_range = amount >= i64::MIN as f64 && amount < i64::MAX as f64;
        if !amount.is_finite() || amount.fract() != 0.0 || !in_range {
            return Err(ValidationError::AmountInvalid);
        }
        Ok(amount as Cents)
    }
}
