use std::sync::Arc;

use tracing::instrument;

use crate::config::StoreConfig;
use crate::domain::{
    Balance, CurrencyBalance, IntegrityStats, Transaction, TransactionRequest, ValidationError,
    Validator,
};
use crate::storage::{CallContext, InMemoryLedger, LedgerStore, SqliteLedger};

use super::AppError;

/// Application service providing the ledger's public operations.
/// This is the primary interface for any client (CLI, HTTP handler, tests).
///
/// Requests flow validator → store → balance view; no ledger rule lives in the
/// clients.
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    validator: Validator,
}

/// Filter for listing a user's transactions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionQuery {
    pub user_id: String,
    pub currency: Option<String>,
    /// `<= 0` returns every matching row
    pub limit: i64,
    pub offset: i64,
}

impl TransactionQuery {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// Restrict to one currency. An empty string means no filter.
    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        let currency = currency.into();
        self.currency = (!currency.is_empty()).then_some(currency);
        self
    }

    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

impl LedgerService {
    /// Create a new ledger service over any store.
    pub fn new(store: Arc<dyn LedgerStore>, validator: Validator) -> Self {
        Self { store, validator }
    }

    /// Initialize a SQLite-backed service (connect + migrate).
    pub async fn init(config: &StoreConfig, validator: Validator) -> Result<Self, AppError> {
        let store = SqliteLedger::init(config).await?;
        Ok(Self::new(Arc::new(store), validator))
    }

    /// Service over a fresh in-memory ledger.
    pub fn in_memory(validator: Validator) -> Self {
        Self::new(Arc::new(InMemoryLedger::new()), validator)
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Validate and record a new transaction.
    #[instrument(skip(self, ctx, req), fields(user_id = %req.user_id, currency = %req.currency))]
    pub async fn create_transaction(
        &self,
        ctx: &CallContext,
        req: &TransactionRequest,
    ) -> Result<Transaction, AppError> {
        let new = self.validator.validate_transaction_request(req)?;
        Ok(self.store.create(ctx, &new).await?)
    }

    /// Get a transaction by id.
    #[instrument(skip(self, ctx))]
    pub async fn get_transaction(
        &self,
        ctx: &CallContext,
        id: &str,
    ) -> Result<Transaction, AppError> {
        Ok(self.store.get_by_id(ctx, id).await?)
    }

    /// List a user's transactions, newest first.
    #[instrument(skip(self, ctx))]
    pub async fn list_transactions(
        &self,
        ctx: &CallContext,
        query: &TransactionQuery,
    ) -> Result<Vec<Transaction>, AppError> {
        require_user_id(&query.user_id)?;
        Ok(self
            .store
            .list_by_user(
                ctx,
                &query.user_id,
                query.currency.as_deref(),
                query.limit,
                query.offset,
            )
            .await?)
    }

    /// Balance of one currency for a user; 0 when nothing was recorded.
    #[instrument(skip(self, ctx))]
    pub async fn get_balance(
        &self,
        ctx: &CallContext,
        user_id: &str,
        currency: &str,
    ) -> Result<Balance, AppError> {
        require_user_id(user_id)?;
        if currency.is_empty() {
            return Err(ValidationError::CurrencyEmpty.into());
        }
        let balance = self.store.get_balance(ctx, user_id, currency).await?;
        Ok(Balance {
            user_id: user_id.to_string(),
            currency: currency.to_string(),
            balance,
        })
    }

    /// Balances for every currency the user has transacted in.
    #[instrument(skip(self, ctx))]
    pub async fn get_all_balances(
        &self,
        ctx: &CallContext,
        user_id: &str,
    ) -> Result<Vec<CurrencyBalance>, AppError> {
        require_user_id(user_id)?;
        Ok(self.store.get_all_balances(ctx, user_id).await?)
    }

    /// Check ledger integrity.
    #[instrument(skip(self, ctx))]
    pub async fn check_integrity(&self, ctx: &CallContext) -> Result<IntegrityStats, AppError> {
        Ok(self.store.integrity_stats(ctx).await?)
    }
}

/// Reads only require a user id to be present; an id the ledger has never seen
/// simply has no transactions.
fn require_user_id(user_id: &str) -> Result<(), ValidationError> {
    if user_id.is_empty() {
        return Err(ValidationError::UserIdEmpty);
    }
    Ok(())
}
