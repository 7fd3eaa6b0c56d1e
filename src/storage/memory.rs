use std::sync::{RwLock, RwLockReadGuard};

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::{
    compute_all_balances, compute_balance, integrity_stats, newest_first, Cents,
    CurrencyBalance, IntegrityStats, NewTransaction, Page, Transaction,
};

use super::{parse_transaction_id, BalanceView, CallContext, StoreError, TransactionLog};

/// In-memory append-only ledger.
///
/// Intended for tests/dev. Not optimized for performance: reads scan the log.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    log: RwLock<Vec<Transaction>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Transaction>>, StoreError> {
        self.log
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn append(&self, new: &NewTransaction) -> Result<Transaction, StoreError> {
        let mut log = self
            .log
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;

        let now = Utc::now().trunc_subsecs(6);
        let (sequence, timestamp) = match log.last() {
            Some(last) => (last.sequence + 1, now.max(last.timestamp)),
            None => (1, now),
        };

        let transaction = Transaction {
            id: Uuid::new_v4(),
            sequence,
            user_id: new.user_id.clone(),
            amount: new.amount,
            currency: new.currency.clone(),
            timestamp,
        };
        log.push(transaction.clone());

        debug!(id = %transaction.id, sequence, "transaction recorded");
        Ok(transaction)
    }
}

#[async_trait]
impl TransactionLog for InMemoryLedger {
    #[instrument(skip(self, ctx, new), fields(user_id = %new.user_id, currency = %new.currency))]
    async fn create(
        &self,
        ctx: &CallContext,
        new: &NewTransaction,
    ) -> Result<Transaction, StoreError> {
        ctx.run(async { self.append(new) }).await
    }

    #[instrument(skip(self, ctx))]
    async fn get_by_id(&self, ctx: &CallContext, id: &str) -> Result<Transaction, StoreError> {
        let id = parse_transaction_id(id)?;
        ctx.run(async {
            self.read()?
                .iter()
                .find(|t| t.id == id)
                .cloned()
                .ok_or(StoreError::NotFound(id))
        })
        .await
    }

    #[instrument(skip(self, ctx))]
    async fn list_by_user(
        &self,
        ctx: &CallContext,
        user_id: &str,
        currency: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, StoreError> {
        let page = Page::new(limit, offset)?;
        ctx.run(async {
            let mut matching: Vec<Transaction> = self
                .read()?
                .iter()
                .filter(|t| t.user_id == user_id && currency.is_none_or(|c| t.currency == c))
                .cloned()
                .collect();
            matching.sort_by(newest_first);
            Ok(page.apply(matching))
        })
        .await
    }

    #[instrument(skip(self, ctx))]
    async fn integrity_stats(&self, ctx: &CallContext) -> Result<IntegrityStats, StoreError> {
        ctx.run(async { Ok(integrity_stats(&self.read()?)) }).await
    }
}

#[async_trait]
impl BalanceView for InMemoryLedger {
    #[instrument(skip(self, ctx))]
    async fn get_balance(
        &self,
        ctx: &CallContext,
        user_id: &str,
        currency: &str,
    ) -> Result<Cents, StoreError> {
        ctx.run(async { Ok(compute_balance(&self.read()?, user_id, currency)?) })
            .await
    }

    #[instrument(skip(self, ctx))]
    async fn get_all_balances(
        &self,
        ctx: &CallContext,
        user_id: &str,
    ) -> Result<Vec<CurrencyBalance>, StoreError> {
        ctx.run(async { Ok(compute_all_balances(&self.read()?, user_id)?) })
            .await
    }
}
