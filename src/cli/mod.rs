use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::application::{AppError, LedgerService, TransactionQuery};
use crate::config::StoreConfig;
use crate::domain::{Transaction, TransactionRequest, UserIdPolicy, Validator};
use crate::io::{write_balances_csv, write_json, write_transactions_csv};
use crate::storage::{CallContext, SqliteLedger};

/// Ledger - append-only multi-currency transaction ledger
#[derive(Parser)]
#[command(name = "ledger")]
#[command(about = "Record transactions per user and currency and report balances")]
#[command(version)]
pub struct Cli {
    /// Database connection string
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:ledger.db")]
    pub database: String,

    /// Maximum pooled database connections
    #[arg(long, env = "LEDGER_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Deadline for each ledger operation, in milliseconds
    #[arg(long, env = "LEDGER_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Accepted user ids: uuid (canonical lower-case) or opaque (any non-empty string)
    #[arg(long, env = "LEDGER_USER_ID_POLICY", default_value = "uuid")]
    pub user_id_policy: UserIdPolicy,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Record a transaction
    Create {
        /// Owner of the transaction
        #[arg(long)]
        user: String,

        /// Amount in minor units (e.g. cents); negative for debits
        #[arg(long, allow_hyphen_values = true)]
        amount: f64,

        /// Currency code: lower-case letters, digits and underscore
        #[arg(long)]
        currency: String,
    },

    /// Show a transaction by id
    Show {
        /// Transaction ID
        id: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// List a user's transactions, newest first
    List {
        #[arg(long)]
        user: String,

        /// Only transactions in this currency
        #[arg(long)]
        currency: Option<String>,

        /// Maximum number of transactions (0 for all)
        #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
        limit: i64,

        /// Number of transactions to skip
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        offset: i64,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Show balance for one currency or all currencies of a user
    Balance {
        #[arg(long)]
        user: String,

        /// Currency (omit for all currencies)
        #[arg(long)]
        currency: Option<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Verify ledger integrity
    Check,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl Cli {
    fn store_config(&self) -> StoreConfig {
        StoreConfig::new(&self.database).with_max_connections(self.max_connections)
    }

    fn call_context(&self) -> CallContext {
        match self.timeout_ms {
            Some(ms) => CallContext::with_timeout(Duration::from_millis(ms)),
            None => CallContext::background(),
        }
    }

    pub async fn run(self) -> Result<()> {
        let config = self.store_config();

        let store = match self.command {
            Commands::Init => SqliteLedger::init(&config).await,
            _ => SqliteLedger::connect(&config.clone().with_create_if_missing(false)).await,
        }
        .map_err(AppError::from)
        .with_context(|| format!("Failed to open ledger database {}", self.database))?;
        let store = Arc::new(store);

        let service = LedgerService::new(store.clone(), Validator::new(self.user_id_policy));
        let ctx = self.call_context();

        let result = self.dispatch(&service, &ctx).await;
        store.close().await;
        result
    }

    async fn dispatch(self, service: &LedgerService, ctx: &CallContext) -> Result<()> {
        match self.command {
            Commands::Init => {
                println!("Database initialized: {}", self.database);
            }

            Commands::Create {
                user,
                amount,
                currency,
            } => {
                let request = TransactionRequest::new(user, amount, currency);
                let transaction = service.create_transaction(ctx, &request).await?;
                println!(
                    "Recorded transaction: {} {} for {} ({}, #{})",
                    transaction.amount,
                    transaction.currency,
                    transaction.user_id,
                    transaction.id,
                    transaction.sequence
                );
            }

            Commands::Show { id, format } => {
                let transaction = service.get_transaction(ctx, &id).await?;
                print_transactions(&[transaction], format)?;
            }

            Commands::List {
                user,
                currency,
                limit,
                offset,
                format,
            } => {
                let mut query = TransactionQuery::for_user(user).page(limit, offset);
                if let Some(currency) = currency {
                    query = query.currency(currency);
                }
                let transactions = service.list_transactions(ctx, &query).await?;
                print_transactions(&transactions, format)?;
            }

            Commands::Balance {
                user,
                currency,
                format,
            } => {
                run_balance_command(service, ctx, &user, currency.as_deref(), format).await?;
            }

            Commands::Check => {
                run_check_command(service, ctx).await?;
            }
        }

        Ok(())
    }
}

fn print_transactions(transactions: &[Transaction], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => write_json(stdout(), transactions)?,
        OutputFormat::Csv => {
            write_transactions_csv(stdout(), transactions)?;
        }
        OutputFormat::Table => {
            if transactions.is_empty() {
                println!("No transactions found.");
                return Ok(());
            }
            println!(
                "{:<28} {:>6} {:<20} {:>14} ID",
                "TIMESTAMP", "SEQ", "CURRENCY", "AMOUNT"
            );
            println!("{}", "-".repeat(108));
            for t in transactions {
                println!(
                    "{:<28} {:>6} {:<20} {:>14} {}",
                    t.timestamp.format("%Y-%m-%d %H:%M:%S%.6f"),
                    t.sequence,
                    truncate(&t.currency, 20),
                    t.amount,
                    t.id
                );
            }
        }
    }
    Ok(())
}

async fn run_balance_command(
    service: &LedgerService,
    ctx: &CallContext,
    user: &str,
    currency: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    match currency {
        Some(currency) => {
            let balance = service.get_balance(ctx, user, currency).await?;
            match format {
                OutputFormat::Json => write_json(stdout(), &balance)?,
                OutputFormat::Csv => {
                    write_balances_csv(
                        stdout(),
                        user,
                        &[crate::domain::CurrencyBalance {
                            currency: balance.currency.clone(),
                            balance: balance.balance,
                        }],
                    )?;
                }
                OutputFormat::Table => {
                    println!("{} {}: {}", balance.user_id, balance.currency, balance.balance);
                }
            }
        }
        None => {
            let balances = service.get_all_balances(ctx, user).await?;
            match format {
                OutputFormat::Json => write_json(stdout(), &balances)?,
                OutputFormat::Csv => {
                    write_balances_csv(stdout(), user, &balances)?;
                }
                OutputFormat::Table => {
                    if balances.is_empty() {
                        println!("No balances found.");
                    } else {
                        println!("{:<32} {:>14}", "CURRENCY", "BALANCE");
                        println!("{}", "-".repeat(47));
                        for entry in balances {
                            println!("{:<32} {:>14}", entry.currency, entry.balance);
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

async fn run_check_command(service: &LedgerService, ctx: &CallContext) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let stats = service.check_integrity(ctx).await?;

    println!("Transactions:          {}", stats.transaction_count);
    println!(
        "Sequence gaps:         {}",
        if stats.has_sequence_gaps { "yes" } else { "no" }
    );
    println!("Timestamp regressions: {}", stats.timestamp_regressions);
    println!("Invalid currencies:    {}", stats.invalid_currencies);
    println!();

    if stats.is_healthy() {
        println!("Ledger is consistent.");
        Ok(())
    } else {
        anyhow::bail!("ledger integrity check failed")
    }
}

/// Shorten to at most `max_len` characters, marking the cut with `...`.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
