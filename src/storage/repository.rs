use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    Currency, MinorUnits, OwnerId, RateSource, SpendWindow, Transaction, TransactionId,
    TransactionKind, TransactionStatus, Wallet, WalletId,
};

use super::MIGRATION_001_INITIAL;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 8;

const WALLET_COLUMNS: &str = "id, owner_id, currency, balance, daily_limit, spent_in_period, period_start, active, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, kind, status, source_wallet_id, target_wallet_id, source_amount, source_currency, target_amount, target_currency, exchange_rate, rate_source, rate_captured_at, description, external_ref, idempotency_key, failure_reason, created_at, completed_at";

/// Timestamps are stored as fixed-width RFC3339 text so that string order
/// matches time order in SQL comparisons.
pub(crate) fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(s: &str, what: &'static str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid {} timestamp", what))?
        .with_timezone(&Utc))
}

pub(crate) fn parse_currency(s: &str) -> Result<Currency> {
    Currency::from_code(s).ok_or_else(|| anyhow::anyhow!("Invalid currency: {}", s))
}

fn parse_optional_id(s: Option<String>, what: &'static str) -> Result<Option<Uuid>> {
    s.map(|s| Uuid::parse_str(&s))
        .transpose()
        .with_context(|| format!("Invalid {} ID", what))
}

/// Aggregated activity for one wallet over a time range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityTotals {
    pub topped_up: MinorUnits,
    pub withdrawn: MinorUnits,
    pub transferred_out: MinorUnits,
    pub transferred_in: MinorUnits,
    pub completed_count: i64,
    pub failed_count: i64,
}

/// Wallet count and summed cached balance in one currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrencyWalletTotals {
    pub currency: Currency,
    pub wallets: i64,
    pub balance: MinorUnits,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionCounts {
    pub total: i64,
    pub completed: i64,
    pub failed: i64,
    pub recent: i64,
}

/// Repository for wallets and transaction records. Ledger entries live in
/// [`super::LedgerStore`].
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    /// Creates the database file if it doesn't exist.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a database (connect + migrate).
    pub async fn init(database_url: &str, max_connections: u32) -> Result<Self> {
        let repo = Self::connect(database_url, max_connections).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a database transaction.
    pub async fn begin(&self) -> Result<sqlx::Transaction<'static, Sqlite>> {
        self.pool.begin().await.context("Failed to begin transaction")
    }

    // ========================
    // Wallet operations
    // ========================

    /// Save a new wallet to the database. Returns `false` when the owner
    /// already holds a wallet in that currency.
    pub async fn save_wallet(&self, wallet: &Wallet) -> Result<bool> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO wallets (id, owner_id, currency, balance, daily_limit, spent_in_period, period_start, active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(wallet.id.to_string())
        .bind(wallet.owner_id.to_string())
        .bind(wallet.currency.code())
        .bind(wallet.balance)
        .bind(wallet.daily_limit)
        .bind(wallet.spent_in_period)
        .bind(format_ts(wallet.period_start))
        .bind(wallet.active)
        .bind(format_ts(wallet.created_at))
        .bind(format_ts(wallet.updated_at))
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Ok(false),
            Err(err) => Err(anyhow::Error::new(err).context("Failed to save wallet")),
        }
    }

    /// Get a wallet by ID.
    pub async fn get_wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Self::get_wallet_in(&mut conn, id).await
    }

    /// Get a wallet by ID inside an open database transaction.
    pub async fn get_wallet_in(conn: &mut SqliteConnection, id: WalletId) -> Result<Option<Wallet>> {
        let row = sqlx::query(&format!("SELECT {} FROM wallets WHERE id = ?", WALLET_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to fetch wallet")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_wallet(&row)?)),
            None => Ok(None),
        }
    }

    /// Get an owner's wallet in the given currency.
    pub async fn get_wallet_by_owner_currency(
        &self,
        owner_id: OwnerId,
        currency: Currency,
    ) -> Result<Option<Wallet>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM wallets WHERE owner_id = ? AND currency = ?",
            WALLET_COLUMNS
        ))
        .bind(owner_id.to_string())
        .bind(currency.code())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch wallet by owner and currency")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_wallet(&row)?)),
            None => Ok(None),
        }
    }

    /// List an owner's wallets, oldest first.
    pub async fn list_wallets_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Wallet>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM wallets WHERE owner_id = ? ORDER BY created_at, id",
            WALLET_COLUMNS
        ))
        .bind(owner_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list wallets for owner")?;

        rows.iter().map(Self::row_to_wallet).collect()
    }

    /// List every wallet.
    /// One page of every wallet in the system, newest first.
    pub async fn list_wallets_page(&self, offset: i64, limit: i64) -> Result<Vec<Wallet>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM wallets ORDER BY created_at DESC, id LIMIT ? OFFSET ?",
            WALLET_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list wallets")?;

        rows.iter().map(Self::row_to_wallet).collect()
    }

    pub async fn count_wallets(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM wallets")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count wallets")?;
        Ok(row.get("count"))
    }

    /// Wallet count and summed cached balance per currency.
    pub async fn wallet_totals_by_currency(&self) -> Result<Vec<CurrencyWalletTotals>> {
        let rows = sqlx::query(
            r#"
            SELECT currency, COUNT(*) as wallets, COALESCE(SUM(balance), 0) as balance
            FROM wallets
            GROUP BY currency
            ORDER BY currency
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to total wallets by currency")?;

        let mut totals = Vec::with_capacity(rows.len());
        for row in rows {
            let currency_str: String = row.get("currency");
            totals.push(CurrencyWalletTotals {
                currency: parse_currency(&currency_str)?,
                wallets: row.get("wallets"),
                balance: row.get("balance"),
            });
        }
        Ok(totals)
    }

    /// List every wallet inside an open database transaction.
    pub async fn list_wallets_in(conn: &mut SqliteConnection) -> Result<Vec<Wallet>> {
        let rows = sqlx::query(&format!("SELECT {} FROM wallets ORDER BY created_at, id", WALLET_COLUMNS))
            .fetch_all(&mut *conn)
            .await
            .context("Failed to list wallets")?;

        rows.iter().map(Self::row_to_wallet).collect()
    }

    /// Persist a wallet's spend window.
    pub async fn save_spend_window_in(
        conn: &mut SqliteConnection,
        wallet_id: WalletId,
        window: &SpendWindow,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE wallets
            SET spent_in_period = ?, period_start = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(window.spent)
        .bind(format_ts(window.period_start))
        .bind(format_ts(now))
        .bind(wallet_id.to_string())
        .execute(&mut *conn)
        .await
        .context("Failed to save spend window")?;
        Ok(())
    }

    /// Set a wallet's daily limit together with its (possibly rolled) window.
    pub async fn update_daily_limit(
        &self,
        wallet_id: WalletId,
        window: &SpendWindow,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE wallets
            SET daily_limit = ?, spent_in_period = ?, period_start = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(window.limit)
        .bind(window.spent)
        .bind(format_ts(window.period_start))
        .bind(format_ts(now))
        .bind(wallet_id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to update daily limit")?;
        Ok(())
    }

    /// Activate or deactivate a wallet. Wallets are never deleted.
    pub async fn set_wallet_active(&self, wallet_id: WalletId, active: bool, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE wallets SET active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(format_ts(now))
            .bind(wallet_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update wallet status")?;
        Ok(())
    }

    // ========================
    // Cached balance
    // ========================

    /// Read the cached balance column.
    pub async fn cached_balance(&self, wallet_id: WalletId) -> Result<Option<MinorUnits>> {
        let row = sqlx::query("SELECT balance FROM wallets WHERE id = ?")
            .bind(wallet_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read cached balance")?;
        Ok(row.map(|r| r.get("balance")))
    }

    /// Add a signed delta to the cached balance, returning the new value.
    pub async fn apply_balance_delta(
        &self,
        wallet_id: WalletId,
        delta: MinorUnits,
        now: DateTime<Utc>,
    ) -> Result<Option<MinorUnits>> {
        let row = sqlx::query(
            r#"
            UPDATE wallets
            SET balance = balance + ?, updated_at = ?
            WHERE id = ?
            RETURNING balance
            "#,
        )
        .bind(delta)
        .bind(format_ts(now))
        .bind(wallet_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to apply balance delta")?;
        Ok(row.map(|r| r.get("balance")))
    }

    /// Replace the cached balance. Callers hold the wallet's lock.
    pub async fn overwrite_balance(
        &self,
        wallet_id: WalletId,
        value: MinorUnits,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE wallets SET balance = ?, updated_at = ? WHERE id = ?")
            .bind(value)
            .bind(format_ts(now))
            .bind(wallet_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to overwrite cached balance")?;
        Ok(())
    }

    fn row_to_wallet(row: &SqliteRow) -> Result<Wallet> {
        let id_str: String = row.get("id");
        let owner_str: String = row.get("owner_id");
        let currency_str: String = row.get("currency");
        let period_start_str: String = row.get("period_start");
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(Wallet {
            id: Uuid::parse_str(&id_str).context("Invalid wallet ID")?,
            owner_id: Uuid::parse_str(&owner_str).context("Invalid owner ID")?,
            currency: parse_currency(&currency_str)?,
            balance: row.get("balance"),
            daily_limit: row.get("daily_limit"),
            spent_in_period: row.get("spent_in_period"),
            period_start: parse_ts(&period_start_str, "period_start")?,
            active: row.get::<i32, _>("active") != 0,
            created_at: parse_ts(&created_at_str, "created_at")?,
            updated_at: parse_ts(&updated_at_str, "updated_at")?,
        })
    }

    // ========================
    // Transaction operations
    // ========================

    /// Save a transaction record (any status) outside the commit path.
    pub async fn save_transaction(&self, txn: &Transaction) -> Result<()> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Self::save_transaction_in(&mut conn, txn).await
    }

    /// Save a transaction record inside an open database transaction.
    pub async fn save_transaction_in(conn: &mut SqliteConnection, txn: &Transaction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, kind, status, source_wallet_id, target_wallet_id, source_amount, source_currency, target_amount, target_currency, exchange_rate, rate_source, rate_captured_at, description, external_ref, idempotency_key, failure_reason, created_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(txn.id.to_string())
        .bind(txn.kind.as_str())
        .bind(txn.status.as_str())
        .bind(txn.source_wallet.map(|id| id.to_string()))
        .bind(txn.target_wallet.map(|id| id.to_string()))
        .bind(txn.source_amount)
        .bind(txn.source_currency.code())
        .bind(txn.target_amount)
        .bind(txn.target_currency.code())
        .bind(txn.exchange_rate.to_string())
        .bind(txn.rate_source.as_str())
        .bind(format_ts(txn.rate_captured_at))
        .bind(&txn.description)
        .bind(&txn.external_ref)
        .bind(&txn.idempotency_key)
        .bind(&txn.failure_reason)
        .bind(format_ts(txn.created_at))
        .bind(txn.completed_at.map(format_ts))
        .execute(&mut *conn)
        .await
        .context("Failed to save transaction")?;
        Ok(())
    }

    /// Move a PENDING transaction to COMPLETED. Returns false if it was not pending.
    pub async fn mark_completed(&self, id: TransactionId, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'COMPLETED', completed_at = ?
            WHERE id = ? AND status = 'PENDING'
            "#,
        )
        .bind(format_ts(at))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to mark transaction completed")?;
        Ok(result.rows_affected() == 1)
    }

    /// Get a transaction by ID.
    pub async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!("SELECT {} FROM transactions WHERE id = ?", TRANSACTION_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch transaction")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_transaction(&row)?)),
            None => Ok(None),
        }
    }

    /// Find the transaction recorded under an idempotency key.
    pub async fn get_transaction_by_idempotency_key(&self, key: &str) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE idempotency_key = ?",
            TRANSACTION_COLUMNS
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch transaction by idempotency key")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_transaction(&row)?)),
            None => Ok(None),
        }
    }

    /// One page of transactions touching any of the given wallets, newest first.
    pub async fn list_transactions_for_wallets(
        &self,
        wallet_ids: &[WalletId],
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Transaction>> {
        if wallet_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; wallet_ids.len()].join(", ");
        let query = format!(
            "SELECT {} FROM transactions WHERE source_wallet_id IN ({p}) OR target_wallet_id IN ({p}) ORDER BY created_at DESC, id LIMIT ? OFFSET ?",
            TRANSACTION_COLUMNS,
            p = placeholders
        );

        let ids: Vec<String> = wallet_ids.iter().map(|id| id.to_string()).collect();
        let mut sql_query = sqlx::query(&query);
        for id in ids.iter().chain(ids.iter()) {
            sql_query = sql_query.bind(id);
        }

        let rows = sql_query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// Count transactions touching any of the given wallets.
    pub async fn count_transactions_for_wallets(&self, wallet_ids: &[WalletId]) -> Result<i64> {
        if wallet_ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; wallet_ids.len()].join(", ");
        let query = format!(
            "SELECT COUNT(*) as count FROM transactions WHERE source_wallet_id IN ({p}) OR target_wallet_id IN ({p})",
            p = placeholders
        );

        let ids: Vec<String> = wallet_ids.iter().map(|id| id.to_string()).collect();
        let mut sql_query = sqlx::query(&query);
        for id in ids.iter().chain(ids.iter()) {
            sql_query = sql_query.bind(id);
        }

        let row = sql_query
            .fetch_one(&self.pool)
            .await
            .context("Failed to count transactions")?;
        Ok(row.get("count"))
    }

    /// One page of every transaction in the system, newest first.
    pub async fn list_transactions_page(&self, offset: i64, limit: i64) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transactions ORDER BY created_at DESC, id LIMIT ? OFFSET ?",
            TRANSACTION_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    pub async fn count_transactions(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM transactions")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count transactions")?;
        Ok(row.get("count"))
    }

    /// System-wide transaction counts; `recent` counts those created at or after `since`.
    pub async fn transaction_counts(&self, since: DateTime<Utc>) -> Result<TransactionCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) as total,
                COALESCE(SUM(CASE WHEN status = 'COMPLETED' THEN 1 ELSE 0 END), 0) as completed,
                COALESCE(SUM(CASE WHEN status = 'FAILED' THEN 1 ELSE 0 END), 0) as failed,
                COALESCE(SUM(CASE WHEN created_at >= ? THEN 1 ELSE 0 END), 0) as recent
            FROM transactions
            "#,
        )
        .bind(format_ts(since))
        .fetch_one(&self.pool)
        .await
        .context("Failed to count transactions")?;

        Ok(TransactionCounts {
            total: row.get("total"),
            completed: row.get("completed"),
            failed: row.get("failed"),
            recent: row.get("recent"),
        })
    }

    /// PENDING transactions whose ledger batch is already posted: committed
    /// but never completed.
    pub async fn list_stranded_transactions(&self) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM transactions t
            WHERE t.status = 'PENDING'
              AND EXISTS (SELECT 1 FROM ledger_postings p WHERE p.transaction_id = t.id)
            ORDER BY t.created_at
            "#,
            TRANSACTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list stranded transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// Aggregate a wallet's activity in `[from, to)`. Amounts are counted in
    /// the wallet's own currency: the source amount when it pays out, the
    /// target amount when it receives.
    pub async fn activity_totals(
        &self,
        wallet_id: WalletId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<ActivityTotals> {
        let wallet_id_str = wallet_id.to_string();

        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'COMPLETED' AND kind = 'TOP_UP' AND target_wallet_id = ? THEN target_amount ELSE 0 END), 0) as topped_up,
                COALESCE(SUM(CASE WHEN status = 'COMPLETED' AND kind = 'WITHDRAWAL' AND source_wallet_id = ? THEN source_amount ELSE 0 END), 0) as withdrawn,
                COALESCE(SUM(CASE WHEN status = 'COMPLETED' AND kind = 'TRANSFER' AND source_wallet_id = ? THEN source_amount ELSE 0 END), 0) as transferred_out,
                COALESCE(SUM(CASE WHEN status = 'COMPLETED' AND kind = 'TRANSFER' AND target_wallet_id = ? THEN target_amount ELSE 0 END), 0) as transferred_in,
                COALESCE(SUM(CASE WHEN status = 'COMPLETED' THEN 1 ELSE 0 END), 0) as completed_count,
                COALESCE(SUM(CASE WHEN status = 'FAILED' THEN 1 ELSE 0 END), 0) as failed_count
            FROM transactions
            WHERE (source_wallet_id = ? OR target_wallet_id = ?)
              AND created_at >= ? AND created_at < ?
            "#,
        )
        .bind(&wallet_id_str)
        .bind(&wallet_id_str)
        .bind(&wallet_id_str)
        .bind(&wallet_id_str)
        .bind(&wallet_id_str)
        .bind(&wallet_id_str)
        .bind(format_ts(from))
        .bind(format_ts(to))
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute activity totals")?;

        Ok(ActivityTotals {
            topped_up: row.get("topped_up"),
            withdrawn: row.get("withdrawn"),
            transferred_out: row.get("transferred_out"),
            transferred_in: row.get("transferred_in"),
            completed_count: row.get("completed_count"),
            failed_count: row.get("failed_count"),
        })
    }

    fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
        let id_str: String = row.get("id");
        let kind_str: String = row.get("kind");
        let status_str: String = row.get("status");
        let source_currency_str: String = row.get("source_currency");
        let target_currency_str: String = row.get("target_currency");
        let rate_str: String = row.get("exchange_rate");
        let rate_source_str: String = row.get("rate_source");
        let rate_captured_at_str: String = row.get("rate_captured_at");
        let created_at_str: String = row.get("created_at");
        let completed_at_str: Option<String> = row.get("completed_at");

        Ok(Transaction {
            id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
            kind: TransactionKind::from_str(&kind_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction kind: {}", kind_str))?,
            status: TransactionStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction status: {}", status_str))?,
            source_wallet: parse_optional_id(row.get("source_wallet_id"), "source wallet")?,
            target_wallet: parse_optional_id(row.get("target_wallet_id"), "target wallet")?,
            source_amount: row.get("source_amount"),
            source_currency: parse_currency(&source_currency_str)?,
            target_amount: row.get("target_amount"),
            target_currency: parse_currency(&target_currency_str)?,
            exchange_rate: Decimal::from_str(&rate_str).context("Invalid exchange rate")?,
            rate_source: RateSource::from_str(&rate_source_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid rate source: {}", rate_source_str))?,
            rate_captured_at: parse_ts(&rate_captured_at_str, "rate_captured_at")?,
            description: row.get("description"),
            external_ref: row.get("external_ref"),
            idempotency_key: row.get("idempotency_key"),
            failure_reason: row.get("failure_reason"),
            created_at: parse_ts(&created_at_str, "created_at")?,
            completed_at: completed_at_str
                .map(|s| parse_ts(&s, "completed_at"))
                .transpose()?,
        })
    }
}
