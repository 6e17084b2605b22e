use thiserror::Error;

use crate::domain::{Currency, MinorUnits, MoneyError, RateError, WalletId};
use crate::storage::LedgerError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Wallet not found: {0}")]
    WalletNotFound(WalletId),

    #[error("Wallet is inactive: {0}")]
    WalletInactive(WalletId),

    #[error("Wallet already exists for currency {0}")]
    WalletAlreadyExists(Currency),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Source and target wallet must differ")]
    SameWalletTransfer,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient funds in wallet {wallet_id}: balance {balance}, required {required}")]
    InsufficientFunds {
        wallet_id: WalletId,
        balance: MinorUnits,
        required: MinorUnits,
    },

    #[error("Daily limit exceeded for wallet {wallet_id}: remaining {remaining}, requested {requested}")]
    DailyLimitExceeded {
        wallet_id: WalletId,
        remaining: MinorUnits,
        requested: MinorUnits,
    },

    #[error("Currency conversion unavailable: {0}")]
    ConversionUnavailable(#[from] RateError),

    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Timed out waiting for wallet lock")]
    Timeout,

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    /// Short machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::WalletNotFound(_) => "WALLET_NOT_FOUND",
            AppError::WalletInactive(_) => "WALLET_INACTIVE",
            AppError::WalletAlreadyExists(_) => "WALLET_ALREADY_EXISTS",
            AppError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            AppError::SameWalletTransfer => "SAME_WALLET_TRANSFER",
            AppError::InvalidAmount(_) => "INVALID_AMOUNT",
            AppError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            AppError::DailyLimitExceeded { .. } => "DAILY_LIMIT_EXCEEDED",
            AppError::ConversionUnavailable(_) => "CONVERSION_UNAVAILABLE",
            AppError::DuplicateTransaction(_) => "DUPLICATE_TRANSACTION",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Timeout => "TIMEOUT",
            AppError::Database(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<MoneyError> for AppError {
    fn from(err: MoneyError) -> Self {
        AppError::InvalidAmount(err.to_string())
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::DuplicateTransaction(id) => AppError::DuplicateTransaction(id.to_string()),
            LedgerError::InvalidBatch(batch) => AppError::Database(anyhow::anyhow!("invalid ledger batch: {}", batch)),
            LedgerError::Storage(err) => AppError::Database(err),
        }
    }
}
