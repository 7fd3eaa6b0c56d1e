// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use ledger_service::application::LedgerService;
use ledger_service::config::StoreConfig;
use ledger_service::domain::{Cents, Transaction, TransactionRequest, UserIdPolicy, Validator};
use ledger_service::storage::{CallContext, InMemoryLedger, SqliteLedger};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Helper to create a SQLite store in a temporary directory
pub async fn test_store() -> Result<(Arc<SqliteLedger>, TempDir)> {
    let temp_dir = TempDir::new()?;
    let store = SqliteLedger::init(&test_config(&temp_dir)).await?;
    Ok((Arc::new(store), temp_dir))
}

pub fn test_config(temp_dir: &TempDir) -> StoreConfig {
    StoreConfig::for_path(db_path(temp_dir).to_str().unwrap())
}

pub fn db_path(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("test.db")
}

/// Raw pool on the same database file, bypassing the store
pub async fn raw_pool(temp_dir: &TempDir) -> Result<SqlitePool> {
    let url = format!("sqlite:{}", db_path(temp_dir).display());
    Ok(SqlitePool::connect(&url).await?)
}

/// One ledger service per backing store, so every property runs against both.
/// The temp dir keeps the SQLite file alive for the duration of the test.
pub struct Backend {
    pub name: &'static str,
    pub service: LedgerService,
    _temp: Option<TempDir>,
}

pub async fn backends(policy: UserIdPolicy) -> Result<Vec<Backend>> {
    let (store, temp_dir) = test_store().await?;
    Ok(vec![
        Backend {
            name: "sqlite",
            service: LedgerService::new(store, Validator::new(policy)),
            _temp: Some(temp_dir),
        },
        Backend {
            name: "memory",
            service: LedgerService::new(Arc::new(InMemoryLedger::new()), Validator::new(policy)),
            _temp: None,
        },
    ])
}

pub fn ctx() -> CallContext {
    CallContext::background()
}

/// Record one transaction per amount, in order
pub async fn seed(
    service: &LedgerService,
    user_id: &str,
    currency: &str,
    amounts: &[Cents],
) -> Result<Vec<Transaction>> {
    let mut created = Vec::with_capacity(amounts.len());
    for &amount in amounts {
        let request = TransactionRequest::new(user_id, amount as f64, currency);
        created.push(service.create_transaction(&ctx(), &request).await?);
    }
    Ok(created)
}
