use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    Currency, LedgerEntry, MinorUnits, OwnerId, RateProvider, SpendWindow, Transaction, TransactionId,
    TransactionKind, TransactionPhase, Wallet, WalletId, build_entries, convert, mask_account_number,
    to_minor, wallet_deltas,
};
use crate::storage::{LedgerStore, Repository};

use super::{AppError, BalanceCache, DailyLimitEnforcer, WalletLocks, ensure_owner};

#[derive(Debug, Clone)]
pub struct TopUpCommand {
    /// Caller that must own the wallet; `None` skips the ownership check
    pub owner: Option<OwnerId>,
    pub wallet_id: WalletId,
    pub amount: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WithdrawalCommand {
    pub owner: Option<OwnerId>,
    pub wallet_id: WalletId,
    pub amount: Decimal,
    pub bank_account_number: String,
    pub bank_name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransferCommand {
    /// Caller that must own the source wallet
    pub owner: Option<OwnerId>,
    pub source_wallet_id: WalletId,
    pub target_wallet_id: WalletId,
    pub amount: Decimal,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
}

/// Normalized request shared by all three command kinds.
struct Request {
    kind: TransactionKind,
    owner: Option<OwnerId>,
    source: Option<WalletId>,
    target: Option<WalletId>,
    amount: Decimal,
    description: Option<String>,
    external_ref: Option<String>,
    idempotency_key: Option<String>,
}

impl Request {
    fn wallet_ids(&self) -> Vec<WalletId> {
        self.source.iter().chain(self.target.iter()).copied().collect()
    }
}

/// Tracks the phase of one transaction through the orchestration.
struct Progress {
    id: TransactionId,
    phase: TransactionPhase,
}

impl Progress {
    fn new(id: TransactionId) -> Self {
        Self {
            id,
            phase: TransactionPhase::Initiated,
        }
    }

    fn advance(&mut self, next: TransactionPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal transition {} -> {}",
            self.phase,
            next
        );
        debug!(transaction = %self.id, from = %self.phase, to = %next, "phase transition");
        self.phase = next;
    }
}

/// Validates, converts and commits top-ups, withdrawals and transfers.
///
/// Phases run `INITIATED -> VALIDATED -> RATE_LOCKED -> COMMITTED -> COMPLETED`.
/// Every rejection happens at or before `RATE_LOCKED` and leaves no ledger
/// entries, cache change or spend behind. `COMMITTED` is one database
/// transaction holding the transaction row, its ledger batch and the source
/// wallet's spend window. Failures while completing are logged and left to
/// reconciliation.
#[derive(Clone)]
pub struct TransferOrchestrator {
    repo: Repository,
    cache: BalanceCache,
    limits: DailyLimitEnforcer,
    rates: Arc<dyn RateProvider>,
    locks: Arc<WalletLocks>,
}

impl TransferOrchestrator {
    pub fn new(
        repo: Repository,
        cache: BalanceCache,
        limits: DailyLimitEnforcer,
        rates: Arc<dyn RateProvider>,
        locks: Arc<WalletLocks>,
    ) -> Self {
        Self {
            repo,
            cache,
            limits,
            rates,
            locks,
        }
    }

    pub async fn top_up(&self, cmd: TopUpCommand) -> Result<Transaction, AppError> {
        self.run(Request {
            kind: TransactionKind::TopUp,
            owner: cmd.owner,
            source: None,
            target: Some(cmd.wallet_id),
            amount: cmd.amount,
            description: cmd.description,
            external_ref: None,
            idempotency_key: None,
        })
        .await
    }

    pub async fn withdraw(&self, cmd: WithdrawalCommand) -> Result<Transaction, AppError> {
        if cmd.bank_account_number.trim().is_empty() {
            return Err(AppError::Validation("bank account number is required".to_string()));
        }
        let masked = mask_account_number(&cmd.bank_account_number);
        let external_ref = match cmd.bank_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            Some(bank) => format!("{} {}", bank, masked),
            None => masked,
        };

        self.run(Request {
            kind: TransactionKind::Withdrawal,
            owner: cmd.owner,
            source: Some(cmd.wallet_id),
            target: None,
            amount: cmd.amount,
            description: cmd.description,
            external_ref: Some(external_ref),
            idempotency_key: None,
        })
        .await
    }

    pub async fn transfer(&self, cmd: TransferCommand) -> Result<Transaction, AppError> {
        let idempotency_key = cmd
            .idempotency_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .map(|k| format!("{}:{}", cmd.source_wallet_id, k));

        self.run(Request {
            kind: TransactionKind::Transfer,
            owner: cmd.owner,
            source: Some(cmd.source_wallet_id),
            target: Some(cmd.target_wallet_id),
            amount: cmd.amount,
            description: cmd.description,
            external_ref: None,
            idempotency_key,
        })
        .await
    }

    async fn run(&self, request: Request) -> Result<Transaction, AppError> {
        let mut progress = Progress::new(Uuid::new_v4());
        debug!(transaction = %progress.id, kind = %request.kind, amount = %request.amount, "transaction initiated");

        let _guards = match self.locks.acquire(&request.wallet_ids()).await {
            Ok(guards) => guards,
            Err(err) => {
                progress.advance(TransactionPhase::Failed);
                return Err(err);
            }
        };

        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = self.repo.get_transaction_by_idempotency_key(key).await? {
                // A replay discloses the stored transaction, so it needs the same ownership as a fresh run
                if let Err(err) = self.ensure_may_replay(&request).await {
                    progress.advance(TransactionPhase::Failed);
                    warn!(transaction = %existing.id, error = %err, "idempotent replay refused");
                    return Err(err);
                }
                info!(transaction = %existing.id, "idempotent replay");
                return Ok(existing);
            }
        }

        // Rejections after the transaction is built are kept as FAILED rows
        let (mut txn, window) = match self.validate(&request, progress.id).await {
            Ok(validated) => validated,
            Err(Rejection::Silent(err)) => {
                progress.advance(TransactionPhase::Failed);
                warn!(transaction = %progress.id, kind = %request.kind, error = %err, "transaction rejected");
                return Err(err);
            }
            Err(Rejection::Recorded(txn, err)) => {
                progress.advance(TransactionPhase::Failed);
                return Err(self.record_failure(*txn, err).await);
            }
        };
        progress.advance(TransactionPhase::Validated);

        if txn.is_cross_currency() {
            txn = match self.lock_rate(txn) {
                Ok(txn) => txn,
                Err((txn, err)) => {
                    progress.advance(TransactionPhase::Failed);
                    return Err(self.record_failure(txn, err).await);
                }
            };
        }
        progress.advance(TransactionPhase::RateLocked);

        let entries = self.commit(&txn, window.as_ref()).await.inspect_err(|err| {
            warn!(transaction = %txn.id, error = %err, "commit failed");
        })?;
        progress.advance(TransactionPhase::Committed);

        self.complete(&mut txn, &entries).await;
        if txn.status.is_terminal() {
            progress.advance(TransactionPhase::Completed);
        }

        info!(
            transaction = %txn.id,
            kind = %txn.kind,
            status = %txn.status,
            amount = txn.source_amount,
            currency = %txn.source_currency,
            converted = txn.target_amount,
            target_currency = %txn.target_currency,
            rate = %txn.exchange_rate,
            "transaction committed"
        );
        Ok(txn)
    }

    /// A keyed request replays only for the owner of its source wallet.
    async fn ensure_may_replay(&self, request: &Request) -> Result<(), AppError> {
        let (Some(owner), Some(source)) = (request.owner, request.source) else {
            return Ok(());
        };
        let wallet = self
            .repo
            .get_wallet(source)
            .await?
            .ok_or(AppError::WalletNotFound(source))?;
        ensure_owner(&wallet, owner)
    }

    /// Load and check everything the transaction depends on. Returns the
    /// built transaction and, for spends, the source window with the spend
    /// already recorded.
    async fn validate(
        &self,
        request: &Request,
        id: TransactionId,
    ) -> Result<(Transaction, Option<SpendWindow>), Rejection> {
        let source = match request.source {
            Some(id) => Some(self.load_wallet(id).await?),
            None => None,
        };
        let target = match request.target {
            Some(id) => Some(self.load_wallet(id).await?),
            None => None,
        };

        // The wallet the caller acts on: source for spends, target for top-ups
        let acting = source.as_ref().or(target.as_ref());
        if let (Some(owner), Some(wallet)) = (request.owner, acting) {
            ensure_owner(wallet, owner).map_err(Rejection::Silent)?;
        }

        for wallet in source.iter().chain(target.iter()) {
            if !wallet.is_active() {
                return Err(Rejection::Silent(AppError::WalletInactive(wallet.id)));
            }
        }

        if let (Some(s), Some(t)) = (&source, &target) {
            if s.id == t.id {
                return Err(Rejection::Silent(AppError::SameWalletTransfer));
            }
        }

        let no_wallet = || Rejection::Silent(AppError::Validation("no wallet given".to_string()));
        let currency = acting.map(|w| w.currency).ok_or_else(no_wallet)?;
        let amount = self.validate_amount(request.amount, currency).map_err(Rejection::Silent)?;

        let now = self.limits.now();
        let mut txn = match (&source, &target) {
            (Some(s), Some(t)) => {
                let mut txn = Transaction::transfer(s.id, t.id, amount, s.currency, now);
                if s.currency != t.currency {
                    txn.target_currency = t.currency;
                    txn.target_amount = 0;
                }
                txn
            }
            (Some(s), None) => Transaction::withdrawal(s.id, amount, s.currency, now),
            (None, Some(t)) => Transaction::top_up(t.id, amount, t.currency, now),
            (None, None) => return Err(no_wallet()),
        };
        txn.id = id;
        txn = txn
            .with_description(request.description.clone())
            .with_idempotency_key(request.idempotency_key.clone());
        if let Some(external_ref) = &request.external_ref {
            txn = txn.with_external_ref(external_ref.clone());
        }

        let window = match &source {
            Some(wallet) => {
                if wallet.balance < amount {
                    let err = AppError::InsufficientFunds {
                        wallet_id: wallet.id,
                        balance: wallet.balance,
                        required: amount,
                    };
                    return Err(Rejection::Recorded(Box::new(txn), err));
                }
                match self.limits.authorize(wallet, amount) {
                    Ok(window) => Some(window),
                    Err(err) => return Err(Rejection::Recorded(Box::new(txn), err)),
                }
            }
            None => None,
        };

        Ok((txn, window))
    }

    async fn load_wallet(&self, id: WalletId) -> Result<Wallet, Rejection> {
        match self.repo.get_wallet(id).await {
            Ok(Some(wallet)) => Ok(wallet),
            Ok(None) => Err(Rejection::Silent(AppError::WalletNotFound(id))),
            Err(err) => Err(Rejection::Silent(AppError::Database(err))),
        }
    }

    fn validate_amount(&self, amount: Decimal, currency: Currency) -> Result<MinorUnits, AppError> {
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidAmount(format!("amount must be positive, got {}", amount)));
        }
        Ok(to_minor(amount, currency)?)
    }

    /// Freeze the rate snapshot and the rounded target amount on the transaction.
    fn lock_rate(&self, txn: Transaction) -> Result<Transaction, (Transaction, AppError)> {
        let snapshot = match self.rates.snapshot(txn.source_currency, txn.target_currency) {
            Ok(snapshot) => snapshot,
            Err(err) => return Err((txn, AppError::ConversionUnavailable(err))),
        };

        let converted = match convert(txn.source_amount, txn.source_currency, txn.target_currency, snapshot.rate) {
            Ok(converted) => converted,
            Err(err) => return Err((txn, err.into())),
        };
        if converted <= 0 {
            let err = AppError::InvalidAmount(format!(
                "amount converts to zero {} at rate {}",
                txn.target_currency, snapshot.rate
            ));
            return Err((txn, err));
        }

        let target_currency = txn.target_currency;
        Ok(txn.with_conversion(target_currency, converted, snapshot))
    }

    /// The durability point: transaction row, ledger batch and spend window
    /// are written in one database transaction.
    async fn commit(
        &self,
        txn: &Transaction,
        window: Option<&SpendWindow>,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let mut entries = build_entries(txn);
        let mut tx = self.repo.begin().await?;

        Repository::save_transaction_in(&mut tx, txn).await?;
        LedgerStore::append_entries_in(&mut tx, txn.id, &mut entries).await?;
        if let (Some(window), Some(source)) = (window, txn.source_wallet) {
            Repository::save_spend_window_in(&mut tx, source, window, txn.created_at).await?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Database(anyhow::Error::new(e).context("Failed to commit transaction")))?;
        Ok(entries)
    }

    /// Apply cache deltas and mark the transaction completed. Nothing here
    /// can fail the transaction: the ledger is already correct.
    async fn complete(&self, txn: &mut Transaction, entries: &[LedgerEntry]) {
        for (wallet_id, delta) in wallet_deltas(entries) {
            if let Err(err) = self.cache.apply(wallet_id, delta).await {
                warn!(
                    transaction = %txn.id,
                    wallet = %wallet_id,
                    delta,
                    error = %err,
                    "balance cache update failed; reconciliation will repair it"
                );
            }
        }

        let now = self.limits.now();
        match self.repo.mark_completed(txn.id, now).await {
            Ok(_) => {
                txn.complete(now);
            }
            Err(err) => {
                warn!(transaction = %txn.id, error = %err, "failed to mark transaction completed");
            }
        }
    }

    /// Persist a rejected transaction as FAILED and hand back the error.
    async fn record_failure(&self, mut txn: Transaction, err: AppError) -> AppError {
        txn.fail(err.to_string(), self.limits.now());
        // The key stays free so a corrected retry can use it
        txn.idempotency_key = None;
        warn!(transaction = %txn.id, kind = %txn.kind, error = %err, "transaction failed");
        if let Err(save_err) = self.repo.save_transaction(&txn).await {
            warn!(transaction = %txn.id, error = %save_err, "failed to record failed transaction");
        }
        err
    }
}

enum Rejection {
    /// Rejected before a transaction could be built; nothing is recorded
    Silent(AppError),
    /// Rejected with a built transaction that is recorded as FAILED
    Recorded(Box<Transaction>, AppError),
}
