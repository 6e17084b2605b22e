use std::sync::Arc;

use chrono::Duration;
use rust_decimal::Decimal;
use tracing::info;

use crate::domain::{
    Currency, OwnerId, SpendWindow, Transaction, Wallet, WalletId, to_minor,
};
use crate::storage::Repository;

use super::{AppError, DailyLimitEnforcer, SystemAnalytics, WalletAnalytics, WalletLocks};

/// Longest analytics window accepted.
pub const MAX_ANALYTICS_DAYS: i64 = 366;

/// A wallet together with its spend window as of now.
#[derive(Debug, Clone)]
pub struct WalletSummary {
    pub wallet: Wallet,
    pub window: SpendWindow,
}

impl WalletSummary {
    pub fn spent_today(&self) -> i64 {
        self.window.spent
    }

    pub fn remaining_daily_limit(&self) -> i64 {
        self.window.remaining()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Zero-based page index
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub const DEFAULT_SIZE: u32 = 20;
    pub const MAX_SIZE: u32 = 100;

    pub fn new(page: Option<u32>, size: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(0),
            size: size.unwrap_or(Self::DEFAULT_SIZE).clamp(1, Self::MAX_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: i64,
    pub total_pages: i64,
    pub last: bool,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: PageRequest, total_elements: i64) -> Self {
        let size = i64::from(request.size);
        let total_pages = (total_elements + size - 1) / size;
        Self {
            content,
            page: request.page,
            size: request.size,
            total_elements,
            total_pages,
            last: i64::from(request.page) + 1 >= total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            last: self.last,
        }
    }
}

/// Wallet lifecycle, limits, history and analytics.
#[derive(Clone)]
pub struct WalletService {
    repo: Repository,
    limits: DailyLimitEnforcer,
    locks: Arc<WalletLocks>,
    default_daily_limit: Decimal,
}

impl WalletService {
    pub fn new(
        repo: Repository,
        limits: DailyLimitEnforcer,
        locks: Arc<WalletLocks>,
        default_daily_limit: Decimal,
    ) -> Self {
        Self {
            repo,
            limits,
            locks,
            default_daily_limit,
        }
    }

    fn summarize(&self, wallet: Wallet) -> WalletSummary {
        let window = self.limits.current_window(&wallet);
        WalletSummary { wallet, window }
    }

    /// Load a wallet the caller owns.
    async fn owned_wallet(&self, owner: OwnerId, wallet_id: WalletId) -> Result<Wallet, AppError> {
        let wallet = self
            .repo
            .get_wallet(wallet_id)
            .await?
            .ok_or(AppError::WalletNotFound(wallet_id))?;
        ensure_owner(&wallet, owner)?;
        Ok(wallet)
    }

    // ========================
    // Wallet operations
    // ========================

    /// Create the owner's wallet for a currency. One wallet per currency.
    pub async fn create_wallet(&self, owner: OwnerId, currency: Currency) -> Result<WalletSummary, AppError> {
        if self.repo.get_wallet_by_owner_currency(owner, currency).await?.is_some() {
            return Err(AppError::WalletAlreadyExists(currency));
        }

        let daily_limit = to_minor(self.default_daily_limit, currency)
            .map_err(|e| AppError::Validation(format!("default daily limit: {}", e)))?;
        let wallet = Wallet::new(owner, currency, daily_limit, self.limits.now(), self.limits.period());
        // The unique (owner, currency) index settles concurrent creates
        if !self.repo.save_wallet(&wallet).await? {
            return Err(AppError::WalletAlreadyExists(currency));
        }

        info!(wallet = %wallet.id, owner = %owner, currency = %currency, "wallet created");
        Ok(self.summarize(wallet))
    }

    pub async fn get_wallet(&self, owner: OwnerId, wallet_id: WalletId) -> Result<WalletSummary, AppError> {
        let wallet = self.owned_wallet(owner, wallet_id).await?;
        Ok(self.summarize(wallet))
    }

    pub async fn list_wallets(&self, owner: OwnerId) -> Result<Vec<WalletSummary>, AppError> {
        let wallets = self.repo.list_wallets_for_owner(owner).await?;
        Ok(wallets.into_iter().map(|w| self.summarize(w)).collect())
    }

    /// All wallets in the system, newest first.
    pub async fn list_all_wallets(&self, request: PageRequest) -> Result<Page<WalletSummary>, AppError> {
        let total = self.repo.count_wallets().await?;
        let wallets = self
            .repo
            .list_wallets_page(request.offset(), i64::from(request.size))
            .await?;
        let content = wallets.into_iter().map(|w| self.summarize(w)).collect();
        Ok(Page::new(content, request, total))
    }

    /// Change the daily limit. The new limit may not be below what was
    /// already spent in the current period.
    pub async fn update_daily_limit(
        &self,
        owner: OwnerId,
        wallet_id: WalletId,
        limit: Decimal,
    ) -> Result<WalletSummary, AppError> {
        let _guard = self.locks.acquire_one(wallet_id).await?;
        let mut wallet = self.owned_wallet(owner, wallet_id).await?;

        let limit = to_minor(limit, wallet.currency).map_err(|e| AppError::Validation(e.to_string()))?;
        let window = self.limits.with_new_limit(&wallet, limit)?;
        let now = self.limits.now();
        self.repo.update_daily_limit(wallet_id, &window, now).await?;

        wallet.daily_limit = window.limit;
        wallet.spent_in_period = window.spent;
        wallet.period_start = window.period_start;
        wallet.updated_at = now;
        info!(wallet = %wallet_id, limit, "daily limit updated");
        Ok(WalletSummary { wallet, window })
    }

    /// Deactivate a wallet. Its history stays; new transactions are refused.
    pub async fn deactivate_wallet(&self, wallet_id: WalletId) -> Result<WalletSummary, AppError> {
        let _guard = self.locks.acquire_one(wallet_id).await?;
        let mut wallet = self
            .repo
            .get_wallet(wallet_id)
            .await?
            .ok_or(AppError::WalletNotFound(wallet_id))?;

        if wallet.active {
            let now = self.limits.now();
            self.repo.set_wallet_active(wallet_id, false, now).await?;
            wallet.active = false;
            wallet.updated_at = now;
            info!(wallet = %wallet_id, "wallet deactivated");
        }
        Ok(self.summarize(wallet))
    }

    // ========================
    // History and analytics
    // ========================

    /// Transactions touching any of the owner's wallets, newest first.
    pub async fn transactions_for_owner(
        &self,
        owner: OwnerId,
        request: PageRequest,
    ) -> Result<Page<Transaction>, AppError> {
        let wallet_ids: Vec<WalletId> = self
            .repo
            .list_wallets_for_owner(owner)
            .await?
            .into_iter()
            .map(|w| w.id)
            .collect();
        self.page_for(&wallet_ids, request).await
    }

    /// Transactions touching one of the owner's wallets, newest first.
    pub async fn transactions_for_wallet(
        &self,
        owner: OwnerId,
        wallet_id: WalletId,
        request: PageRequest,
    ) -> Result<Page<Transaction>, AppError> {
        self.owned_wallet(owner, wallet_id).await?;
        self.page_for(&[wallet_id], request).await
    }

    /// All transactions in the system, newest first.
    pub async fn all_transactions(&self, request: PageRequest) -> Result<Page<Transaction>, AppError> {
        let total = self.repo.count_transactions().await?;
        let content = self
            .repo
            .list_transactions_page(request.offset(), i64::from(request.size))
            .await?;
        Ok(Page::new(content, request, total))
    }

    /// Wallet and transaction totals across the whole system.
    pub async fn system_analytics(&self) -> Result<SystemAnalytics, AppError> {
        let now = self.limits.now();
        let counts = self.repo.transaction_counts(now - Duration::hours(24)).await?;
        let wallet_totals = self.repo.wallet_totals_by_currency().await?;
        Ok(SystemAnalytics::new(counts, &wallet_totals, now))
    }

    async fn page_for(&self, wallet_ids: &[WalletId], request: PageRequest) -> Result<Page<Transaction>, AppError> {
        let total = self.repo.count_transactions_for_wallets(wallet_ids).await?;
        let content = self
            .repo
            .list_transactions_for_wallets(wallet_ids, request.offset(), i64::from(request.size))
            .await?;
        Ok(Page::new(content, request, total))
    }

    /// Totals for one wallet over the last `days` days.
    pub async fn analytics(
        &self,
        owner: OwnerId,
        wallet_id: WalletId,
        days: i64,
    ) -> Result<WalletAnalytics, AppError> {
        if !(1..=MAX_ANALYTICS_DAYS).contains(&days) {
            return Err(AppError::Validation(format!(
                "days must be between 1 and {}",
                MAX_ANALYTICS_DAYS
            )));
        }
        let wallet = self.owned_wallet(owner, wallet_id).await?;

        let period_end = self.limits.now();
        let period_start = period_end - Duration::days(days);
        // Inclusive of transactions created at `period_end`
        let totals = self
            .repo
            .activity_totals(wallet_id, period_start, period_end + Duration::microseconds(1))
            .await?;

        Ok(WalletAnalytics {
            wallet_id,
            currency: wallet.currency,
            period_start,
            period_end,
            days,
            topped_up: totals.topped_up,
            withdrawn: totals.withdrawn,
            transferred_out: totals.transferred_out,
            transferred_in: totals.transferred_in,
            completed_transactions: totals.completed_count,
            failed_transactions: totals.failed_count,
        })
    }
}

/// Reject access to another owner's wallet.
pub fn ensure_owner(wallet: &Wallet, owner: OwnerId) -> Result<(), AppError> {
    if wallet.owner_id != owner {
        return Err(AppError::Forbidden(format!(
            "wallet {} belongs to another user",
            wallet.id
        )));
    }
    Ok(())
}
