use std::collections::HashMap;

use anyhow::Context;
use chrono::Utc;
use futures::stream::{BoxStream, StreamExt};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    AccountKind, BatchError, Currency, EntryRole, LedgerEntry, MinorUnits, TransactionId, WalletId,
    validate_batch,
};

use super::repository::{format_ts, parse_currency, parse_ts};

const ENTRY_COLUMNS: &str =
    "sequence, id, transaction_id, wallet_id, account, role, amount, currency, description, created_at";

const SELECT_ENTRIES_FOR_WALLET: &str = r#"
    SELECT sequence, id, transaction_id, wallet_id, account, role, amount, currency, description, created_at
    FROM ledger_entries
    WHERE wallet_id = ?
    ORDER BY sequence
"#;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger entries already posted for transaction {0}")]
    DuplicateTransaction(TransactionId),

    #[error("Invalid entry batch: {0}")]
    InvalidBatch(#[from] BatchError),

    #[error("Ledger storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Debit and credit magnitudes booked in one currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrencyTotals {
    pub currency: Currency,
    pub debits: MinorUnits,
    pub credits: MinorUnits,
}

/// Append-only store of ledger entries. No update or delete exists; the
/// schema rejects both with triggers.
#[derive(Clone)]
pub struct LedgerStore {
    pool: SqlitePool,
}

impl LedgerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================
    // Appends
    // ========================

    /// Append one transaction's entries atomically. Assigns sequence numbers.
    pub async fn append_entries(
        &self,
        transaction_id: TransactionId,
        entries: &mut [LedgerEntry],
    ) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await.context("Failed to begin append")?;
        Self::append_entries_in(&mut tx, transaction_id, entries).await?;
        tx.commit().await.context("Failed to commit ledger append")?;
        Ok(())
    }

    /// Append inside a caller-owned database transaction. Nothing is visible
    /// until the caller commits.
    pub async fn append_entries_in(
        conn: &mut SqliteConnection,
        transaction_id: TransactionId,
        entries: &mut [LedgerEntry],
    ) -> Result<(), LedgerError> {
        validate_batch(transaction_id, entries)?;

        let posting = sqlx::query(
            r#"
            INSERT INTO ledger_postings (transaction_id, entry_count, posted_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(transaction_id.to_string())
        .bind(entries.len() as i64)
        .bind(format_ts(Utc::now()))
        .execute(&mut *conn)
        .await;

        if let Err(err) = posting {
            let duplicate = matches!(&err, sqlx::Error::Database(db) if db.is_unique_violation());
            if duplicate {
                return Err(LedgerError::DuplicateTransaction(transaction_id));
            }
            return Err(anyhow::Error::new(err)
                .context("Failed to record ledger posting")
                .into());
        }

        for entry in entries.iter_mut() {
            let row = sqlx::query(
                r#"
                INSERT INTO ledger_entries (id, transaction_id, wallet_id, account, role, amount, currency, description, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING sequence
                "#,
            )
            .bind(entry.id.to_string())
            .bind(entry.transaction_id.to_string())
            .bind(entry.wallet_id.map(|id| id.to_string()))
            .bind(entry.account.as_str())
            .bind(entry.role.as_str())
            .bind(entry.amount)
            .bind(entry.currency.code())
            .bind(&entry.description)
            .bind(format_ts(entry.created_at))
            .fetch_one(&mut *conn)
            .await
            .context("Failed to append ledger entry")?;
            entry.sequence = row.get("sequence");
        }

        Ok(())
    }

    // ========================
    // Reads
    // ========================

    /// Lazily stream a wallet's entries in sequence order. Each call issues a
    /// fresh query, so the stream can be restarted by calling again.
    pub fn entries_for(&self, wallet_id: WalletId) -> BoxStream<'_, Result<LedgerEntry, LedgerError>> {
        sqlx::query(SELECT_ENTRIES_FOR_WALLET)
            .bind(wallet_id.to_string())
            .fetch(&self.pool)
            .map(|row| -> Result<LedgerEntry, LedgerError> {
                let row = row.context("Failed to read ledger entry")?;
                Ok(Self::row_to_entry(&row)?)
            })
            .boxed()
    }

    /// All entries produced by one transaction, in sequence order.
    pub async fn entries_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM ledger_entries WHERE transaction_id = ? ORDER BY sequence",
            ENTRY_COLUMNS
        ))
        .bind(transaction_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch entries for transaction")?;

        Ok(rows.iter().map(Self::row_to_entry).collect::<anyhow::Result<Vec<_>>>()?)
    }

    /// Ledger-truth balance: the sum of every signed entry for the wallet,
    /// computed from scratch.
    pub async fn sum_balance(&self, wallet_id: WalletId) -> Result<MinorUnits, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount), 0) as balance
            FROM ledger_entries
            WHERE wallet_id = ?
            "#,
        )
        .bind(wallet_id.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum wallet balance")?;

        Ok(row.get("balance"))
    }

    /// Ledger balances of every wallet with at least one entry, read on the
    /// given connection (typically inside a snapshot transaction).
    pub async fn balances_in(conn: &mut SqliteConnection) -> Result<HashMap<WalletId, MinorUnits>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT wallet_id, SUM(amount) as balance
            FROM ledger_entries
            WHERE wallet_id IS NOT NULL
            GROUP BY wallet_id
            "#,
        )
        .fetch_all(&mut *conn)
        .await
        .context("Failed to compute ledger balances")?;

        let mut balances = HashMap::new();
        for row in rows {
            let wallet_id_str: String = row.get("wallet_id");
            let wallet_id = Uuid::parse_str(&wallet_id_str).context("Invalid wallet ID")?;
            balances.insert(wallet_id, row.get("balance"));
        }
        Ok(balances)
    }

    /// Per-currency debit and credit magnitudes across all entries.
    pub async fn currency_totals_in(conn: &mut SqliteConnection) -> Result<Vec<CurrencyTotals>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT
                currency,
                COALESCE(SUM(CASE WHEN amount < 0 THEN -amount ELSE 0 END), 0) as debits,
                COALESCE(SUM(CASE WHEN amount > 0 THEN amount ELSE 0 END), 0) as credits
            FROM ledger_entries
            GROUP BY currency
            ORDER BY currency
            "#,
        )
        .fetch_all(&mut *conn)
        .await
        .context("Failed to compute currency totals")?;

        let mut totals = Vec::with_capacity(rows.len());
        for row in rows {
            let currency_str: String = row.get("currency");
            totals.push(CurrencyTotals {
                currency: parse_currency(&currency_str)?,
                debits: row.get("debits"),
                credits: row.get("credits"),
            });
        }
        Ok(totals)
    }

    pub async fn entry_count_in(conn: &mut SqliteConnection) -> Result<i64, LedgerError> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM ledger_entries")
            .fetch_one(&mut *conn)
            .await
            .context("Failed to count ledger entries")?;
        Ok(row.get("count"))
    }

    /// Number of entries booked against one wallet.
    pub async fn wallet_entry_count(&self, wallet_id: WalletId) -> Result<i64, LedgerError> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM ledger_entries WHERE wallet_id = ?")
            .bind(wallet_id.to_string())
            .fetch_one(&self.pool)
            .await
            .context("Failed to count wallet entries")?;
        Ok(row.get("count"))
    }

    fn row_to_entry(row: &SqliteRow) -> anyhow::Result<LedgerEntry> {
        let id_str: String = row.get("id");
        let transaction_str: String = row.get("transaction_id");
        let wallet_str: Option<String> = row.get("wallet_id");
        let account_str: String = row.get("account");
        let role_str: String = row.get("role");
        let currency_str: String = row.get("currency");
        let created_at_str: String = row.get("created_at");

        Ok(LedgerEntry {
            id: Uuid::parse_str(&id_str).context("Invalid entry ID")?,
            sequence: row.get("sequence"),
            transaction_id: Uuid::parse_str(&transaction_str).context("Invalid transaction ID")?,
            wallet_id: wallet_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid wallet ID")?,
            account: AccountKind::from_str(&account_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid account kind: {}", account_str))?,
            role: EntryRole::from_str(&role_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid entry role: {}", role_str))?,
            amount: row.get("amount"),
            currency: parse_currency(&currency_str)?,
            description: row.get("description"),
            created_at: parse_ts(&created_at_str, "created_at")?,
        })
    }
}
