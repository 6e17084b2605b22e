use futures::{StreamExt, TryStreamExt};

use crate::domain::{Currency, LedgerEntry, MinorUnits, OwnerId, TransactionId, WalletId};
use crate::storage::{LedgerStore, Repository};

use super::{AppError, Page, PageRequest, ensure_owner};

/// A wallet's balance as the ledger alone says it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerBalance {
    pub wallet_id: WalletId,
    pub currency: Currency,
    pub balance: MinorUnits,
}

/// Read-only access to posted ledger entries.
///
/// `owner` is the caller whose ownership is checked; `None` reads as an
/// operator and skips the check.
#[derive(Clone)]
pub struct LedgerAudit {
    repo: Repository,
    ledger: LedgerStore,
}

impl LedgerAudit {
    pub fn new(repo: Repository, ledger: LedgerStore) -> Self {
        Self { repo, ledger }
    }

    /// One page of a wallet's entries in posting order.
    pub async fn wallet_entries(
        &self,
        owner: Option<OwnerId>,
        wallet_id: WalletId,
        request: PageRequest,
    ) -> Result<Page<LedgerEntry>, AppError> {
        let wallet = self
            .repo
            .get_wallet(wallet_id)
            .await?
            .ok_or(AppError::WalletNotFound(wallet_id))?;
        if let Some(owner) = owner {
            ensure_owner(&wallet, owner)?;
        }

        let total = self.ledger.wallet_entry_count(wallet_id).await?;
        let skip = usize::try_from(request.offset()).unwrap_or(usize::MAX);
        let content: Vec<LedgerEntry> = self
            .ledger
            .entries_for(wallet_id)
            .skip(skip)
            .take(request.size as usize)
            .try_collect()
            .await?;
        Ok(Page::new(content, request, total))
    }

    /// Every entry a transaction posted, system legs included. A caller may
    /// read them when one of their wallets took part.
    pub async fn transaction_entries(
        &self,
        owner: Option<OwnerId>,
        transaction_id: TransactionId,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let txn = self
            .repo
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| AppError::TransactionNotFound(transaction_id.to_string()))?;

        if let Some(owner) = owner {
            let wallets = self.repo.list_wallets_for_owner(owner).await?;
            if !wallets.iter().any(|wallet| txn.touches(wallet.id)) {
                return Err(AppError::Forbidden(format!(
                    "transaction {} does not involve your wallets",
                    transaction_id
                )));
            }
        }

        Ok(self.ledger.entries_for_transaction(transaction_id).await?)
    }

    /// Ledger-truth balance of a wallet, ignoring the cache.
    pub async fn ledger_balance(&self, wallet_id: WalletId) -> Result<LedgerBalance, AppError> {
        let wallet = self
            .repo
            .get_wallet(wallet_id)
            .await?
            .ok_or(AppError::WalletNotFound(wallet_id))?;
        let balance = self.ledger.sum_balance(wallet_id).await?;
        Ok(LedgerBalance {
            wallet_id,
            currency: wallet.currency,
            balance,
        })
    }
}
