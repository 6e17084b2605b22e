use std::sync::Arc;

use crate::domain::{MinorUnits, WalletId};
use crate::storage::Repository;

use super::{AppError, Clock};

/// Fast-read projection of wallet balances, stored on the wallet row.
/// It may drift from the ledger; reconciliation brings it back.
#[derive(Clone)]
pub struct BalanceCache {
    repo: Repository,
    clock: Arc<dyn Clock>,
}

impl BalanceCache {
    pub fn new(repo: Repository, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// Last known balance.
    pub async fn get(&self, wallet_id: WalletId) -> Result<MinorUnits, AppError> {
        self.repo
            .cached_balance(wallet_id)
            .await?
            .ok_or(AppError::WalletNotFound(wallet_id))
    }

    /// Apply a committed signed delta. Returns the new cached value.
    pub async fn apply(&self, wallet_id: WalletId, delta: MinorUnits) -> Result<MinorUnits, AppError> {
        self.repo
            .apply_balance_delta(wallet_id, delta, self.clock.now())
            .await?
            .ok_or(AppError::WalletNotFound(wallet_id))
    }

    /// Replace the cached value outright.
    pub async fn overwrite(&self, wallet_id: WalletId, value: MinorUnits) -> Result<(), AppError> {
        if value < 0 {
            return Err(AppError::Validation(format!(
                "cached balance cannot be negative: {}",
                value
            )));
        }
        self.repo.overwrite_balance(wallet_id, value, self.clock.now()).await?;
        Ok(())
    }
}
