use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::domain::{
    exact_sum, fold_balances, Cents, CurrencyBalance, IntegrityStats, NewTransaction, Page,
    Transaction,
};

use super::error::{is_integer_overflow, map_sqlx_error};
use super::{parse_transaction_id, BalanceView, CallContext, StoreError, TransactionLog};
use super::MIGRATION_001_INITIAL;

const TRANSACTION_COLUMNS: &str = "id, sequence, user_id, amount, currency, timestamp";

/// Durable ledger store backed by SQLite.
///
/// The connection pool is acquired in [`SqliteLedger::connect`] and owned
/// exclusively by this store until [`SqliteLedger::close`]. All consistency is
/// delegated to SQLite: `create` runs as one database transaction and readers
/// only ever see committed rows.
#[derive(Debug, Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Create a new store with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the database described by `config`.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| map_sqlx_error("connect", e))?
            .create_if_missing(config.create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        Ok(Self::new(pool))
    }

    /// Run database migrations. Safe to run repeatedly.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migration_001", e))?;
        Ok(())
    }

    /// Initialize a store (connect + migrate).
    pub async fn init(config: &StoreConfig) -> Result<Self, StoreError> {
        let store = Self::connect(config).await?;
        store.migrate().await?;
        Ok(store)
    }

    /// Release every pooled connection. Later operations fail as unavailable.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn insert_transaction(&self, new: &NewTransaction) -> Result<Transaction, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Writing first takes the database write lock up front, so concurrent
        // creators queue on the busy timeout instead of failing on lock upgrade.
        let sequence: i64 = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'transaction_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("next_sequence", e))
        .and_then(|row| column(&row, "value"))?;

        let latest: Option<String> =
            sqlx::query("SELECT MAX(timestamp) AS latest FROM transactions")
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("latest_timestamp", e))
                .and_then(|row| column(&row, "latest"))?;

        let now = Utc::now().trunc_subsecs(6);
        let timestamp = match latest {
            Some(latest) => now.max(parse_timestamp(&latest)?),
            None => now,
        };
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO transactions (id, sequence, user_id, amount, currency, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(sequence)
        .bind(&new.user_id)
        .bind(new.amount)
        .bind(&new.currency)
        .bind(format_timestamp(timestamp))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_transaction", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        debug!(%id, sequence, "transaction recorded");

        Ok(Transaction {
            id,
            sequence,
            user_id: new.user_id.clone(),
            amount: new.amount,
            currency: new.currency.clone(),
            timestamp,
        })
    }

    async fn fetch_transaction(&self, id: Uuid) -> Result<Transaction, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_by_id", e))?;

        match row {
            Some(row) => row_to_transaction(&row),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn fetch_user_transactions(
        &self,
        user_id: &str,
        currency: Option<&str>,
        page: Page,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut query = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE user_id = ?");
        if currency.is_some() {
            query.push_str(" AND currency = ?");
        }
        query.push_str(" ORDER BY timestamp DESC, sequence DESC LIMIT ? OFFSET ?");

        let mut sql_query = sqlx::query(&query).bind(user_id);
        if let Some(currency) = currency {
            sql_query = sql_query.bind(currency);
        }

        let rows = sql_query
            .bind(page.sql_limit())
            .bind(page.sql_offset())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_by_user", e))?;

        rows.iter().map(row_to_transaction).collect()
    }

    async fn sum_partition(&self, user_id: &str, currency: &str) -> Result<Cents, StoreError> {
        let summed = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount), 0) AS balance
            FROM transactions
            WHERE user_id = ? AND currency = ?
            "#,
        )
        .bind(user_id)
        .bind(currency)
        .fetch_one(&self.pool)
        .await;

        match summed {
            Ok(row) => column(&row, "balance"),
            // SQLite's SUM fails as soon as a running total leaves i64, even when
            // the final total fits. Redo the sum exactly.
            Err(e) if is_integer_overflow(&e) => {
                let amounts = self.partition_amounts(user_id, currency).await?;
                exact_sum(amounts).ok_or_else(|| StoreError::BalanceOverflow {
                    user_id: user_id.to_string(),
                    currency: currency.to_string(),
                })
            }
            Err(e) => Err(map_sqlx_error("get_balance", e)),
        }
    }

    async fn partition_amounts(
        &self,
        user_id: &str,
        currency: &str,
    ) -> Result<Vec<Cents>, StoreError> {
        let rows = sqlx::query("SELECT amount FROM transactions WHERE user_id = ? AND currency = ?")
            .bind(user_id)
            .bind(currency)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_balance", e))?;

        rows.iter().map(|row| column(row, "amount")).collect()
    }

    async fn sum_by_currency(&self, user_id: &str) -> Result<Vec<CurrencyBalance>, StoreError> {
        let summed = sqlx::query(
            r#"
            SELECT currency, SUM(amount) AS balance
            FROM transactions
            WHERE user_id = ?
            GROUP BY currency
            ORDER BY currency
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await;

        let rows = match summed {
            Ok(rows) => rows,
            Err(e) if is_integer_overflow(&e) => return self.fold_user_balances(user_id).await,
            Err(e) => return Err(map_sqlx_error("get_all_balances", e)),
        };

        rows.iter()
            .map(|row| {
                Ok(CurrencyBalance {
                    currency: column(row, "currency")?,
                    balance: column(row, "balance")?,
                })
            })
            .collect()
    }

    /// Exact per-currency fold in Rust, for when SQLite's SUM overflowed.
    async fn fold_user_balances(&self, user_id: &str) -> Result<Vec<CurrencyBalance>, StoreError> {
        let rows = sqlx::query("SELECT currency, amount FROM transactions WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_all_balances", e))?;

        let entries = rows
            .iter()
            .map(|row| {
                let currency: String = column(row, "currency")?;
                let amount: Cents = column(row, "amount")?;
                Ok((currency, amount))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(fold_balances(
            user_id,
            entries.iter().map(|(currency, amount)| (currency.as_str(), *amount)),
        )?)
    }

    async fn collect_integrity_stats(&self) -> Result<IntegrityStats, StoreError> {
        let counts = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS count,
                MIN(sequence) AS min_seq,
                MAX(sequence) AS max_seq
            FROM transactions
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("integrity_counts", e))?;

        let transaction_count: i64 = column(&counts, "count")?;
        let min_seq: Option<i64> = column(&counts, "min_seq")?;
        let max_seq: Option<i64> = column(&counts, "max_seq")?;

        let has_sequence_gaps = match (min_seq, max_seq) {
            (Some(min), Some(max)) => (max - min + 1) != transaction_count,
            _ => false,
        };

        let regressions = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM (
                SELECT timestamp, LAG(timestamp) OVER (ORDER BY sequence) AS previous
                FROM transactions
            )
            WHERE timestamp < previous
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("integrity_timestamps", e))?;

        let invalid = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM transactions
            WHERE length(currency) NOT BETWEEN 1 AND 32
               OR currency GLOB '*[^a-z0-9_]*'
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("integrity_currencies", e))?;

        Ok(IntegrityStats {
            transaction_count,
            has_sequence_gaps,
            timestamp_regressions: column(&regressions, "count")?,
            invalid_currencies: column(&invalid, "count")?,
        })
    }
}

#[async_trait]
impl TransactionLog for SqliteLedger {
    #[instrument(skip(self, ctx, new), fields(user_id = %new.user_id, currency = %new.currency))]
    async fn create(
        &self,
        ctx: &CallContext,
        new: &NewTransaction,
    ) -> Result<Transaction, StoreError> {
        ctx.run(self.insert_transaction(new)).await
    }

    #[instrument(skip(self, ctx))]
    async fn get_by_id(&self, ctx: &CallContext, id: &str) -> Result<Transaction, StoreError> {
        let id = parse_transaction_id(id)?;
        ctx.run(self.fetch_transaction(id)).await
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
        ctx.run(self.fetch_user_transactions(user_id, currency, page))
            .await
    }

    #[instrument(skip(self, ctx))]
    async fn integrity_stats(&self, ctx: &CallContext) -> Result<IntegrityStats, StoreError> {
        ctx.run(self.collect_integrity_stats()).await
    }
}

#[async_trait]
impl BalanceView for SqliteLedger {
    #[instrument(skip(self, ctx))]
    async fn get_balance(
        &self,
        ctx: &CallContext,
        user_id: &str,
        currency: &str,
    ) -> Result<Cents, StoreError> {
        ctx.run(self.sum_partition(user_id, currency)).await
    }

    #[instrument(skip(self, ctx))]
    async fn get_all_balances(
        &self,
        ctx: &CallContext,
        user_id: &str,
    ) -> Result<Vec<CurrencyBalance>, StoreError> {
        ctx.run(self.sum_by_currency(user_id)).await
    }
}

/// Fixed-width RFC 3339 in UTC with microseconds, so text order is time order.
fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("invalid timestamp {value:?}: {e}")))
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Corrupt(format!("cannot read column {name}: {e}")))
}

fn row_to_transaction(row: &SqliteRow) -> Result<Transaction, StoreError> {
    let id_str: String = column(row, "id")?;
    let timestamp_str: String = column(row, "timestamp")?;

    Ok(Transaction {
        id: Uuid::parse_str(&id_str)
            .map_err(|_| StoreError::Corrupt(format!("invalid transaction id {id_str:?}")))?,
        sequence: column(row, "sequence")?,
        user_id: column(row, "user_id")?,
        amount: column(row, "amount")?,
        currency: column(row, "currency")?,
        timestamp: parse_timestamp(&timestamp_str)?,
    })
}
