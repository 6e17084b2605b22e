use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Currency, MinorUnits, RateSnapshot, RateSource, WalletId};

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    /// Money entering a wallet from outside the platform
    TopUp,
    /// Money leaving a wallet to an external bank account
    Withdrawal,
    /// Wallet-to-wallet movement, possibly across currencies
    Transfer,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::TopUp => "TOP_UP",
            TransactionKind::Withdrawal => "WITHDRAWAL",
            TransactionKind::Transfer => "TRANSFER",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "TOP_UP" => Some(TransactionKind::TopUp),
            "WITHDRAWAL" => Some(TransactionKind::Withdrawal),
            "TRANSFER" => Some(TransactionKind::Transfer),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TransactionStatus::Pending),
            "COMPLETED" => Some(TransactionStatus::Completed),
            "FAILED" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Orchestration phase of a single transaction.
///
/// `Committed` is the durability point: once the ledger batch is written the
/// transaction can only be compensated by a new one, never failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionPhase {
    Initiated,
    Validated,
    RateLocked,
    Committed,
    Completed,
    Failed,
}

impl TransactionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionPhase::Initiated => "INITIATED",
            TransactionPhase::Validated => "VALIDATED",
            TransactionPhase::RateLocked => "RATE_LOCKED",
            TransactionPhase::Committed => "COMMITTED",
            TransactionPhase::Completed => "COMPLETED",
            TransactionPhase::Failed => "FAILED",
        }
    }

    pub fn can_advance_to(&self, next: TransactionPhase) -> bool {
        use TransactionPhase::*;
        matches!(
            (self, next),
            (Initiated, Validated)
                | (Validated, RateLocked)
                | (RateLocked, Committed)
                | (Committed, Completed)
                | (Initiated, Failed)
                | (Validated, Failed)
                | (RateLocked, Failed)
        )
    }
}

impl std::fmt::Display for TransactionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A money movement request and its outcome. The realized rate and the
/// rounded target amount are stored so the conversion is reproducible from
/// persisted data alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    /// `None` for top-ups
    pub source_wallet: Option<WalletId>,
    /// `None` for withdrawals
    pub target_wallet: Option<WalletId>,
    pub source_amount: MinorUnits,
    pub source_currency: Currency,
    pub target_amount: MinorUnits,
    pub target_currency: Currency,
    pub exchange_rate: Decimal,
    pub rate_source: RateSource,
    pub rate_captured_at: DateTime<Utc>,
    pub description: Option<String>,
    /// Informational external party, e.g. a masked bank account
    pub external_ref: Option<String>,
    pub idempotency_key: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    fn new(
        kind: TransactionKind,
        source_wallet: Option<WalletId>,
        target_wallet: Option<WalletId>,
        amount: MinorUnits,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            status: TransactionStatus::Pending,
            source_wallet,
            target_wallet,
            source_amount: amount,
            source_currency: currency,
            target_amount: amount,
            target_currency: currency,
            exchange_rate: Decimal::ONE,
            rate_source: RateSource::Static,
            rate_captured_at: now,
            description: None,
            external_ref: None,
            idempotency_key: None,
            failure_reason: None,
            created_at: now,
            completed_at: None,
        }
    }

    pub fn top_up(target: WalletId, amount: MinorUnits, currency: Currency, now: DateTime<Utc>) -> Self {
        Self::new(TransactionKind::TopUp, None, Some(target), amount, currency, now)
    }

    pub fn withdrawal(source: WalletId, amount: MinorUnits, currency: Currency, now: DateTime<Utc>) -> Self {
        Self::new(TransactionKind::Withdrawal, Some(source), None, amount, currency, now)
    }

    /// A transfer in the source currency. Call [`Transaction::with_conversion`]
    /// when the target wallet holds a different currency.
    pub fn transfer(
        source: WalletId,
        target: WalletId,
        amount: MinorUnits,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(TransactionKind::Transfer, Some(source), Some(target), amount, currency, now)
    }

    /// Freeze the rate snapshot and the rounded target amount.
    pub fn with_conversion(mut self, target_currency: Currency, target_amount: MinorUnits, rate: RateSnapshot) -> Self {
        self.target_currency = target_currency;
        self.target_amount = target_amount;
        self.exchange_rate = rate.rate;
        self.rate_source = rate.source;
        self.rate_captured_at = rate.captured_at;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description.filter(|d| !d.trim().is_empty());
        self
    }

    pub fn with_external_ref(mut self, external_ref: impl Into<String>) -> Self {
        self.external_ref = Some(external_ref.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: Option<String>) -> Self {
        self.idempotency_key = key;
        self
    }

    pub fn is_cross_currency(&self) -> bool {
        self.source_currency != self.target_currency
    }

    /// Mark completed. Terminal statuses are set once; returns false if the
    /// transaction was already terminal.
    pub fn complete(&mut self, at: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TransactionStatus::Completed;
        self.completed_at = Some(at);
        true
    }

    /// Mark failed with a reason. Returns false if already terminal.
    pub fn fail(&mut self, reason: impl Into<String>, at: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TransactionStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.completed_at = Some(at);
        true
    }

    /// Whether the transaction moved money into or out of the given wallet.
    pub fn touches(&self, wallet_id: WalletId) -> bool {
        self.source_wallet == Some(wallet_id) || self.target_wallet == Some(wallet_id)
    }
}

/// Mask a bank account number down to its last four characters.
pub fn mask_account_number(account: &str) -> String {
    let trimmed: Vec<char> = account.trim().chars().collect();
    if trimmed.len() <= 4 {
        return trimmed.into_iter().collect();
    }
    let tail: String = trimmed[trimmed.len() - 4..].iter().collect();
    format!("****{}", tail)
}
