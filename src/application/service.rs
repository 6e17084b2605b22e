use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::info;

use crate::domain::{
    Currency, LedgerEntry, LimitPeriod, MinorUnits, OwnerId, RateError, RateProvider, RateSnapshot,
    RateTable, RateTableView, Transaction, TransactionId, WalletId, convert, to_minor,
};
use crate::storage::{DEFAULT_MAX_CONNECTIONS, LedgerStore, Repository};

use super::{
    AppError, BalanceCache, BalanceVerificationReport, Clock, DailyLimitEnforcer, LedgerAudit,
    LedgerBalance, LedgerIntegrityReport, Page, PageRequest, ReconcileAllSummary,
    ReconciliationResult, ReconciliationService, SystemAnalytics, SystemClock, TopUpCommand,
    TransferCommand, TransferOrchestrator, WalletAnalytics, WalletLocks, WalletService,
    WalletSummary, WalletVerification, WithdrawalCommand,
};

/// Tunables of the ledger service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Daily limit given to new wallets, in major units of the wallet's currency
    pub default_daily_limit: Decimal,
    pub limit_period: LimitPeriod,
    /// How long an operation waits for wallet locks before failing
    pub lock_timeout: Duration,
    pub max_connections: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_daily_limit: Decimal::new(10_000, 0),
            limit_period: LimitPeriod::CalendarDay,
            lock_timeout: Duration::from_secs(5),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// What an amount would convert to at the current rate. Nothing is booked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionQuote {
    pub amount: MinorUnits,
    pub converted: MinorUnits,
    pub rate: RateSnapshot,
}

/// Application service providing high-level operations for the wallet ledger.
/// This is the primary interface for any client (HTTP API, CLI, tests).
pub struct LedgerService {
    ledger: LedgerStore,
    cache: BalanceCache,
    rates: Arc<dyn RateProvider>,
    clock: Arc<dyn Clock>,
    wallets: WalletService,
    orchestrator: TransferOrchestrator,
    reconciliation: ReconciliationService,
    audit: LedgerAudit,
}

impl LedgerService {
    /// Wire every component over one repository, clock and rate provider.
    pub fn new(
        repo: Repository,
        config: &ServiceConfig,
        clock: Arc<dyn Clock>,
        rates: Arc<dyn RateProvider>,
    ) -> Self {
        let ledger = LedgerStore::new(repo.pool().clone());
        let cache = BalanceCache::new(repo.clone(), clock.clone());
        let limits = DailyLimitEnforcer::new(clock.clone(), config.limit_period);
        let locks = Arc::new(WalletLocks::new(config.lock_timeout));

        let wallets = WalletService::new(
            repo.clone(),
            limits.clone(),
            locks.clone(),
            config.default_daily_limit,
        );
        let orchestrator = TransferOrchestrator::new(
            repo.clone(),
            cache.clone(),
            limits,
            rates.clone(),
            locks.clone(),
        );
        let audit = LedgerAudit::new(repo.clone(), ledger.clone());
        let reconciliation = ReconciliationService::new(repo, ledger.clone(), cache.clone(), locks, clock.clone());

        Self {
            ledger,
            cache,
            rates,
            clock,
            wallets,
            orchestrator,
            reconciliation,
            audit,
        }
    }

    /// Initialize a database at the given path with default settings, the
    /// system clock and the built-in rate table.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        Self::init_with(
            database_path,
            &ServiceConfig::default(),
            Arc::new(SystemClock),
            Arc::new(RateTable::with_static_rates()),
        )
        .await
    }

    /// Initialize a database at the given path.
    pub async fn init_with(
        database_path: &str,
        config: &ServiceConfig,
        clock: Arc<dyn Clock>,
        rates: Arc<dyn RateProvider>,
    ) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::init(&db_url, config.max_connections).await?;
        Ok(Self::new(repo, config, clock, rates))
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    pub fn cache(&self) -> &BalanceCache {
        &self.cache
    }

    pub fn wallets(&self) -> &WalletService {
        &self.wallets
    }

    pub fn orchestrator(&self) -> &TransferOrchestrator {
        &self.orchestrator
    }

    pub fn reconciliation(&self) -> &ReconciliationService {
        &self.reconciliation
    }

    pub fn audit(&self) -> &LedgerAudit {
        &self.audit
    }

    // ========================
    // Wallet operations
    // ========================

    pub async fn create_wallet(&self, owner: OwnerId, currency: Currency) -> Result<WalletSummary, AppError> {
        self.wallets.create_wallet(owner, currency).await
    }

    pub async fn get_wallet(&self, owner: OwnerId, wallet_id: WalletId) -> Result<WalletSummary, AppError> {
        self.wallets.get_wallet(owner, wallet_id).await
    }

    pub async fn list_wallets(&self, owner: OwnerId) -> Result<Vec<WalletSummary>, AppError> {
        self.wallets.list_wallets(owner).await
    }

    pub async fn update_daily_limit(
        &self,
        owner: OwnerId,
        wallet_id: WalletId,
        limit: Decimal,
    ) -> Result<WalletSummary, AppError> {
        self.wallets.update_daily_limit(owner, wallet_id, limit).await
    }

    pub async fn deactivate_wallet(&self, wallet_id: WalletId) -> Result<WalletSummary, AppError> {
        self.wallets.deactivate_wallet(wallet_id).await
    }

    pub async fn list_all_wallets(&self, request: PageRequest) -> Result<Page<WalletSummary>, AppError> {
        self.wallets.list_all_wallets(request).await
    }

    // ========================
    // Money movement
    // ========================

    pub async fn top_up(&self, cmd: TopUpCommand) -> Result<Transaction, AppError> {
        self.orchestrator.top_up(cmd).await
    }

    pub async fn withdraw(&self, cmd: WithdrawalCommand) -> Result<Transaction, AppError> {
        self.orchestrator.withdraw(cmd).await
    }

    pub async fn transfer(&self, cmd: TransferCommand) -> Result<Transaction, AppError> {
        self.orchestrator.transfer(cmd).await
    }

    // ========================
    // History and rates
    // ========================

    pub async fn transactions_for_owner(
        &self,
        owner: OwnerId,
        request: PageRequest,
    ) -> Result<Page<Transaction>, AppError> {
        self.wallets.transactions_for_owner(owner, request).await
    }

    pub async fn transactions_for_wallet(
        &self,
        owner: OwnerId,
        wallet_id: WalletId,
        request: PageRequest,
    ) -> Result<Page<Transaction>, AppError> {
        self.wallets.transactions_for_wallet(owner, wallet_id, request).await
    }

    pub async fn analytics(&self, owner: OwnerId, wallet_id: WalletId, days: i64) -> Result<WalletAnalytics, AppError> {
        self.wallets.analytics(owner, wallet_id, days).await
    }

    pub async fn all_transactions(&self, request: PageRequest) -> Result<Page<Transaction>, AppError> {
        self.wallets.all_transactions(request).await
    }

    pub async fn system_analytics(&self) -> Result<SystemAnalytics, AppError> {
        self.wallets.system_analytics().await
    }

    pub fn rate_table(&self) -> RateTableView {
        self.rates.table()
    }

    /// Convert an amount at the current rate with the same rounding a
    /// transfer would apply.
    pub fn preview_conversion(&self, from: Currency, to: Currency, amount: Decimal) -> Result<ConversionQuote, AppError> {
        let amount = to_minor(amount, from)?;
        if amount <= 0 {
            return Err(AppError::InvalidAmount("amount must be positive".to_string()));
        }
        let rate = self.rates.snapshot(from, to)?;
        let converted = convert(amount, from, to, rate.rate)?;
        Ok(ConversionQuote {
            amount,
            converted,
            rate,
        })
    }

    /// Replace live quotes with USD-based quotes from a rate feed.
    pub fn publish_usd_quotes(&self, quotes: &HashMap<Currency, Decimal>) -> Result<RateTableView, AppError> {
        if let Some((currency, quote)) = quotes.iter().find(|(_, quote)| **quote <= Decimal::ZERO) {
            return Err(AppError::Validation(format!("quote for {} must be positive, got {}", currency, quote)));
        }
        self.rates
            .publish_usd_quotes(quotes, self.clock.now())
            .map_err(read_only_rates)?;
        info!(quotes = quotes.len(), "live rates published");
        Ok(self.rates.table())
    }

    /// Drop live quotes so conversions use the static table again.
    pub fn clear_live_rates(&self) -> Result<RateTableView, AppError> {
        self.rates.clear_live_quotes().map_err(read_only_rates)?;
        info!("live rates cleared");
        Ok(self.rates.table())
    }

    // ========================
    // Ledger reads
    // ========================

    pub async fn wallet_ledger(
        &self,
        owner: Option<OwnerId>,
        wallet_id: WalletId,
        request: PageRequest,
    ) -> Result<Page<LedgerEntry>, AppError> {
        self.audit.wallet_entries(owner, wallet_id, request).await
    }

    pub async fn transaction_ledger(
        &self,
        owner: Option<OwnerId>,
        transaction_id: TransactionId,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        self.audit.transaction_entries(owner, transaction_id).await
    }

    pub async fn ledger_balance(&self, wallet_id: WalletId) -> Result<LedgerBalance, AppError> {
        self.audit.ledger_balance(wallet_id).await
    }

    // ========================
    // Integrity operations
    // ========================

    pub async fn verify_balances(&self) -> Result<BalanceVerificationReport, AppError> {
        self.reconciliation.verify_balances().await
    }

    pub async fn verify_wallet(&self, wallet_id: WalletId) -> Result<WalletVerification, AppError> {
        self.reconciliation.verify_wallet(wallet_id).await
    }

    pub async fn reconcile(&self, wallet_id: WalletId) -> Result<ReconciliationResult, AppError> {
        self.reconciliation.reconcile(wallet_id).await
    }

    pub async fn reconcile_all(&self) -> Result<ReconcileAllSummary, AppError> {
        self.reconciliation.reconcile_all().await
    }

    pub async fn ledger_integrity(&self) -> Result<LedgerIntegrityReport, AppError> {
        self.reconciliation.ledger_integrity().await
    }
}

fn read_only_rates(err: RateError) -> AppError {
    AppError::Validation(err.to_string())
}
