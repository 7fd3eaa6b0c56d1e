use std::io::Write;

use anyhow::Result;
use serde::Serialize;

use crate::domain::{CurrencyBalance, Transaction};

/// Write transactions as CSV, one row per transaction in the given order.
pub fn write_transactions_csv<W: Write>(writer: W, transactions: &[Transaction]) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record(["id", "sequence", "timestamp", "user_id", "currency", "amount"])?;

    for transaction in transactions {
        csv_writer.write_record(&[
            transaction.id.to_string(),
            transaction.sequence.to_string(),
            transaction.timestamp.to_rfc3339(),
            transaction.user_id.clone(),
            transaction.currency.clone(),
            transaction.amount.to_string(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(transactions.len())
}

/// Write per-currency balances as CSV.
pub fn write_balances_csv<W: Write>(
    writer: W,
    user_id: &str,
    balances: &[CurrencyBalance],
) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record(["user_id", "currency", "balance"])?;

    for entry in balances {
        csv_writer.write_record(&[
            user_id.to_string(),
            entry.currency.clone(),
            entry.balance.to_string(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(balances.len())
}

/// Write any serializable value as pretty JSON followed by a newline.
pub fn write_json<W: Write, T: Serialize + ?Sized>(mut writer: W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer)?;
    Ok(())
}
