use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::domain::WalletId;
use crate::storage::{LedgerStore, Repository};

use super::{
    AppError, BalanceCache, BalanceVerificationReport, Clock, Discrepancy, LedgerIntegrityReport,
    ReconcileAllSummary, ReconciliationResult, WalletLocks, WalletVerification,
};

/// Audits the balance cache against the ledger and repairs it on request.
/// Reads never modify anything; only `reconcile*` writes, and only the cache.
#[derive(Clone)]
pub struct ReconciliationService {
    repo: Repository,
    ledger: LedgerStore,
    cache: BalanceCache,
    locks: Arc<WalletLocks>,
    clock: Arc<dyn Clock>,
}

impl ReconciliationService {
    pub fn new(
        repo: Repository,
        ledger: LedgerStore,
        cache: BalanceCache,
        locks: Arc<WalletLocks>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            ledger,
            cache,
            locks,
            clock,
        }
    }

    /// Compare every wallet's cached balance with its ledger sum.
    ///
    /// Cached balances and ledger sums are read from one snapshot, so a
    /// transfer committing mid-scan cannot show up on one side only. Each
    /// mismatch is then re-read under that wallet's lock and reported only
    /// if it persists, which filters out transfers caught between commit
    /// and cache update.
    pub async fn verify_balances(&self) -> Result<BalanceVerificationReport, AppError> {
        let as_of = self.clock.now();

        let mut tx = self.repo.begin().await?;
        let wallets = Repository::list_wallets_in(&mut tx).await?;
        let ledger_balances = LedgerStore::balances_in(&mut tx).await?;
        tx.commit().await.context("Failed to close snapshot")?;

        let suspects: Vec<WalletId> = wallets
            .iter()
            .filter_map(|wallet| {
                let ledger = ledger_balances.get(&wallet.id).copied().unwrap_or(0);
                Discrepancy::between(wallet, ledger).map(|_| wallet.id)
            })
            .collect();

        let mut discrepancies = Vec::new();
        for wallet_id in suspects {
            let _guard = self.locks.acquire_one(wallet_id).await?;
            let Some(wallet) = self.repo.get_wallet(wallet_id).await? else {
                continue;
            };
            let ledger = self.ledger.sum_balance(wallet_id).await?;
            if let Some(discrepancy) = Discrepancy::between(&wallet, ledger) {
                warn!(
                    wallet = %wallet_id,
                    cached = discrepancy.cached_balance,
                    ledger = discrepancy.ledger_balance,
                    "balance discrepancy"
                );
                discrepancies.push(discrepancy);
            }
        }

        Ok(BalanceVerificationReport::new(wallets.len(), discrepancies, as_of))
    }

    /// Compare one wallet's cached balance with its ledger sum.
    pub async fn verify_wallet(&self, wallet_id: WalletId) -> Result<WalletVerification, AppError> {
        let _guard = self.locks.acquire_one(wallet_id).await?;
        let wallet = self
            .repo
            .get_wallet(wallet_id)
            .await?
            .ok_or(AppError::WalletNotFound(wallet_id))?;
        let ledger = self.ledger.sum_balance(wallet_id).await?;

        Ok(WalletVerification {
            wallet_id,
            currency: wallet.currency,
            cached_balance: wallet.balance,
            ledger_balance: ledger,
            discrepancy: ledger - wallet.balance,
            consistent: ledger == wallet.balance,
            checked_at: self.clock.now(),
        })
    }

    /// Overwrite the wallet's cached balance with the ledger sum. Idempotent.
    pub async fn reconcile(&self, wallet_id: WalletId) -> Result<ReconciliationResult, AppError> {
        let _guard = self.locks.acquire_one(wallet_id).await?;
        let wallet = self
            .repo
            .get_wallet(wallet_id)
            .await?
            .ok_or(AppError::WalletNotFound(wallet_id))?;
        let ledger = self.ledger.sum_balance(wallet_id).await?;

        if ledger != wallet.balance {
            self.cache.overwrite(wallet_id, ledger).await?;
            info!(
                wallet = %wallet_id,
                previous = wallet.balance,
                reconciled = ledger,
                "balance cache reconciled"
            );
        }

        Ok(ReconciliationResult {
            wallet_id,
            currency: wallet.currency,
            previous_balance: wallet.balance,
            new_balance: ledger,
            adjustment: ledger - wallet.balance,
            reconciled_at: self.clock.now(),
        })
    }

    /// Complete committed-but-pending transactions and reconcile every
    /// wallet that disagrees with the ledger. Meant for scheduled callers.
    pub async fn reconcile_all(&self) -> Result<ReconcileAllSummary, AppError> {
        let mut completed_transactions = 0;
        for txn in self.repo.list_stranded_transactions().await? {
            let wallets: Vec<WalletId> = txn.source_wallet.iter().chain(txn.target_wallet.iter()).copied().collect();
            // An in-flight orchestration holds these until it has finished
            let _guards = self.locks.acquire(&wallets).await?;
            if self.repo.mark_completed(txn.id, self.clock.now()).await? {
                info!(transaction = %txn.id, "completed stranded transaction");
                completed_transactions += 1;
            }
        }

        let report = self.verify_balances().await?;
        let mut reconciled = Vec::with_capacity(report.discrepancies.len());
        for discrepancy in &report.discrepancies {
            reconciled.push(self.reconcile(discrepancy.wallet_id).await?);
        }

        Ok(ReconcileAllSummary {
            completed_transactions,
            reconciled,
        })
    }

    /// Per-currency debit and credit totals over the whole ledger.
    pub async fn ledger_integrity(&self) -> Result<LedgerIntegrityReport, AppError> {
        let mut tx = self.repo.begin().await?;
        let totals = LedgerStore::currency_totals_in(&mut tx).await?;
        let entry_count = LedgerStore::entry_count_in(&mut tx).await?;
        tx.commit().await.context("Failed to close snapshot")?;

        let report = LedgerIntegrityReport::from_totals(&totals, entry_count, self.clock.now());
        if !report.all_balanced {
            warn!(entry_count, "ledger integrity check found unbalanced currencies");
        }
        Ok(report)
    }
}
