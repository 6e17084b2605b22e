use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Currency, MinorUnits, OwnerId, Wallet, WalletId};
use crate::storage::{CurrencyTotals, CurrencyWalletTotals, TransactionCounts};

/// A wallet whose cached balance differs from its ledger sum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub wallet_id: WalletId,
    pub owner_id: OwnerId,
    pub currency: Currency,
    pub cached_balance: MinorUnits,
    pub ledger_balance: MinorUnits,
    /// `ledger - cached`
    pub discrepancy: MinorUnits,
}

impl Discrepancy {
    /// `None` when the cache agrees with the ledger.
    pub fn between(wallet: &Wallet, ledger_balance: MinorUnits) -> Option<Self> {
        (wallet.balance != ledger_balance).then(|| Self {
            wallet_id: wallet.id,
            owner_id: wallet.owner_id,
            currency: wallet.currency,
            cached_balance: wallet.balance,
            ledger_balance,
            discrepancy: ledger_balance - wallet.balance,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceVerificationReport {
    pub total_wallets: usize,
    pub consistent_wallets: usize,
    pub discrepancy_count: usize,
    pub all_consistent: bool,
    pub discrepancies: Vec<Discrepancy>,
    pub as_of: DateTime<Utc>,
}

impl BalanceVerificationReport {
    pub fn new(total_wallets: usize, discrepancies: Vec<Discrepancy>, as_of: DateTime<Utc>) -> Self {
        Self {
            total_wallets,
            consistent_wallets: total_wallets - discrepancies.len(),
            discrepancy_count: discrepancies.len(),
            all_consistent: discrepancies.is_empty(),
            discrepancies,
            as_of,
        }
    }
}

/// Cache vs ledger for a single wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletVerification {
    pub wallet_id: WalletId,
    pub currency: Currency,
    pub cached_balance: MinorUnits,
    pub ledger_balance: MinorUnits,
    pub discrepancy: MinorUnits,
    pub consistent: bool,
    pub checked_at: DateTime<Utc>,
}

/// Outcome of overwriting one wallet's cache with ledger truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub wallet_id: WalletId,
    pub currency: Currency,
    pub previous_balance: MinorUnits,
    pub new_balance: MinorUnits,
    pub adjustment: MinorUnits,
    pub reconciled_at: DateTime<Utc>,
}

/// Outcome of a full reconciliation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileAllSummary {
    /// Committed transactions that were still PENDING and got completed
    pub completed_transactions: usize,
    pub reconciled: Vec<ReconciliationResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyBalance {
    pub currency: Currency,
    pub total_debits: MinorUnits,
    pub total_credits: MinorUnits,
    pub balanced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerIntegrityReport {
    pub currencies: Vec<CurrencyBalance>,
    pub all_balanced: bool,
    pub entry_count: i64,
    pub checked_at: DateTime<Utc>,
}

impl LedgerIntegrityReport {
    /// Build the report from per-currency totals. Every supported currency is
    /// listed, including ones with no entries.
    pub fn from_totals(totals: &[CurrencyTotals], entry_count: i64, checked_at: DateTime<Utc>) -> Self {
        let currencies: Vec<CurrencyBalance> = Currency::ALL
            .iter()
            .map(|currency| {
                let (debits, credits) = totals
                    .iter()
                    .find(|t| t.currency == *currency)
                    .map(|t| (t.debits, t.credits))
                    .unwrap_or((0, 0));
                CurrencyBalance {
                    currency: *currency,
                    total_debits: debits,
                    total_credits: credits,
                    balanced: debits == credits,
                }
            })
            .collect();

        Self {
            all_balanced: currencies.iter().all(|c| c.balanced),
            currencies,
            entry_count,
            checked_at,
        }
    }
}

/// Activity totals for one wallet over the last `days` days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletAnalytics {
    pub wallet_id: WalletId,
    pub currency: Currency,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub days: i64,
    pub topped_up: MinorUnits,
    pub withdrawn: MinorUnits,
    pub transferred_out: MinorUnits,
    pub transferred_in: MinorUnits,
    pub completed_transactions: i64,
    pub failed_transactions: i64,
}

impl WalletAnalytics {
    /// Money in minus money out over the period.
    pub fn net_flow(&self) -> MinorUnits {
        self.topped_up + self.transferred_in - self.withdrawn - self.transferred_out
    }
}

/// System-wide totals for operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemAnalytics {
    pub total_wallets: i64,
    pub transactions: TransactionCounts,
    /// Every supported currency, including ones without wallets
    pub currencies: Vec<CurrencyWalletTotals>,
    pub as_of: DateTime<Utc>,
}

impl SystemAnalytics {
    pub fn new(transactions: TransactionCounts, wallet_totals: &[CurrencyWalletTotals], as_of: DateTime<Utc>) -> Self {
        let currencies: Vec<CurrencyWalletTotals> = Currency::ALL
            .iter()
            .map(|currency| {
                wallet_totals
                    .iter()
                    .find(|t| t.currency == *currency)
                    .copied()
                    .unwrap_or(CurrencyWalletTotals {
                        currency: *currency,
                        wallets: 0,
                        balance: 0,
                    })
            })
            .collect();

        Self {
            total_wallets: currencies.iter().map(|c| c.wallets).sum(),
            transactions,
            currencies,
            as_of,
        }
    }
}
