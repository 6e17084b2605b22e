use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{Currency, MinorUnits, Transaction, TransactionId, TransactionKind, WalletId};

pub type EntryId = Uuid;

/// Direction of an entry. Stored explicitly so no consumer has to infer it
/// from the sign or from which wallet it is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryRole {
    Debit,
    Credit,
}

impl EntryRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryRole::Debit => "DEBIT",
            EntryRole::Credit => "CREDIT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "DEBIT" => Some(EntryRole::Debit),
            "CREDIT" => Some(EntryRole::Credit),
            _ => None,
        }
    }
}

/// The account an entry is booked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountKind {
    /// A customer wallet
    Wallet,
    /// Platform cash pool, the counterparty of top-ups and withdrawals
    SystemCash,
    /// Currency conversion suspense account
    Exchange,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Wallet => "WALLET",
            AccountKind::SystemCash => "SYSTEM_CASH",
            AccountKind::Exchange => "EXCHANGE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "WALLET" => Some(AccountKind::Wallet),
            "SYSTEM_CASH" => Some(AccountKind::SystemCash),
            "EXCHANGE" => Some(AccountKind::Exchange),
            _ => None,
        }
    }
}

/// An immutable signed movement: positive amounts are credits, negative
/// amounts are debits. Entries are never edited or deleted; corrections are
/// new entries under a new transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: EntryId,
    /// Monotonic position in the log, assigned by the store on append
    pub sequence: i64,
    pub transaction_id: TransactionId,
    /// `None` for system accounts
    pub wallet_id: Option<WalletId>,
    pub account: AccountKind,
    pub role: EntryRole,
    pub amount: MinorUnits,
    pub currency: Currency,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    fn new(
        transaction_id: TransactionId,
        wallet_id: Option<WalletId>,
        account: AccountKind,
        role: EntryRole,
        magnitude: MinorUnits,
        currency: Currency,
        created_at: DateTime<Utc>,
    ) -> Self {
        assert!(magnitude > 0, "Entry magnitude must be positive");
        let amount = match role {
            EntryRole::Debit => -magnitude,
            EntryRole::Credit => magnitude,
        };
        Self {
            id: Uuid::new_v4(),
            sequence: 0, // Will be set by the ledger store
            transaction_id,
            wallet_id,
            account,
            role,
            amount,
            currency,
            description: None,
            created_at,
        }
    }

    pub fn debit_wallet(txn: &Transaction, wallet_id: WalletId, amount: MinorUnits, currency: Currency) -> Self {
        Self::new(txn.id, Some(wallet_id), AccountKind::Wallet, EntryRole::Debit, amount, currency, txn.created_at)
    }

    pub fn credit_wallet(txn: &Transaction, wallet_id: WalletId, amount: MinorUnits, currency: Currency) -> Self {
        Self::new(txn.id, Some(wallet_id), AccountKind::Wallet, EntryRole::Credit, amount, currency, txn.created_at)
    }

    pub fn debit_system(txn: &Transaction, account: AccountKind, amount: MinorUnits, currency: Currency) -> Self {
        Self::new(txn.id, None, account, EntryRole::Debit, amount, currency, txn.created_at)
    }

    pub fn credit_system(txn: &Transaction, account: AccountKind, amount: MinorUnits, currency: Currency) -> Self {
        Self::new(txn.id, None, account, EntryRole::Credit, amount, currency, txn.created_at)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn magnitude(&self) -> MinorUnits {
        self.amount.abs()
    }

    pub fn is_wallet_leg(&self) -> bool {
        self.wallet_id.is_some()
    }
}

/// Build the entry batch a committed transaction posts to the ledger.
///
/// Wallet legs: a top-up credits the target, a withdrawal debits the source,
/// a transfer debits the source in its currency and credits the target with
/// the converted amount. Each batch is closed by system-account legs so that
/// every currency nets to zero within the batch.
pub fn build_entries(txn: &Transaction) -> Vec<LedgerEntry> {
    let mut entries = Vec::with_capacity(4);
    match txn.kind {
        TransactionKind::TopUp => {
            if let Some(target) = txn.target_wallet {
                entries.push(
                    LedgerEntry::credit_wallet(txn, target, txn.target_amount, txn.target_currency)
                        .with_description("Wallet funded"),
                );
                entries.push(
                    LedgerEntry::debit_system(txn, AccountKind::SystemCash, txn.target_amount, txn.target_currency)
                        .with_description("Cash received for top-up"),
                );
            }
        }
        TransactionKind::Withdrawal => {
            if let Some(source) = txn.source_wallet {
                entries.push(
                    LedgerEntry::debit_wallet(txn, source, txn.source_amount, txn.source_currency)
                        .with_description("Withdrawal"),
                );
                entries.push(
                    LedgerEntry::credit_system(txn, AccountKind::SystemCash, txn.source_amount, txn.source_currency)
                        .with_description("Cash paid out"),
                );
            }
        }
        TransactionKind::Transfer => {
            if let (Some(source), Some(target)) = (txn.source_wallet, txn.target_wallet) {
                entries.push(
                    LedgerEntry::debit_wallet(txn, source, txn.source_amount, txn.source_currency)
                        .with_description("Transfer out"),
                );
                if txn.is_cross_currency() {
                    entries.push(
                        LedgerEntry::credit_system(txn, AccountKind::Exchange, txn.source_amount, txn.source_currency)
                            .with_description("FX: received source currency"),
                    );
                    entries.push(
                        LedgerEntry::debit_system(txn, AccountKind::Exchange, txn.target_amount, txn.target_currency)
                            .with_description("FX: released target currency"),
                    );
                }
                entries.push(
                    LedgerEntry::credit_wallet(txn, target, txn.target_amount, txn.target_currency)
                        .with_description("Transfer in"),
                );
            }
        }
    }
    entries
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("entry batch is empty")]
    Empty,

    #[error("entry {entry} belongs to transaction {found}, expected {expected}")]
    ForeignEntry {
        entry: EntryId,
        expected: TransactionId,
        found: TransactionId,
    },

    #[error("entry {0} has a sign that does not match its role")]
    SignMismatch(EntryId),

    #[error("batch does not net to zero in {currency} (net {net})")]
    Unbalanced { currency: Currency, net: MinorUnits },
}

/// Check that a batch can be appended as one transaction's postings.
pub fn validate_batch(transaction_id: TransactionId, entries: &[LedgerEntry]) -> Result<(), BatchError> {
    if entries.is_empty() {
        return Err(BatchError::Empty);
    }

    let mut nets: BTreeMap<Currency, MinorUnits> = BTreeMap::new();
    for entry in entries {
        if entry.transaction_id != transaction_id {
            return Err(BatchError::ForeignEntry {
                entry: entry.id,
                expected: transaction_id,
                found: entry.transaction_id,
            });
        }
        let sign_ok = match entry.role {
            EntryRole::Debit => entry.amount < 0,
            EntryRole::Credit => entry.amount > 0,
        };
        if !sign_ok {
            return Err(BatchError::SignMismatch(entry.id));
        }
        *nets.entry(entry.currency).or_insert(0) += entry.amount;
    }

    match nets.into_iter().find(|(_, net)| *net != 0) {
        Some((currency, net)) => Err(BatchError::Unbalanced { currency, net }),
        None => Ok(()),
    }
}

/// Signed balance change per wallet produced by a batch.
pub fn wallet_deltas(entries: &[LedgerEntry]) -> HashMap<WalletId, MinorUnits> {
    let mut deltas = HashMap::new();
    for entry in entries {
        if let Some(wallet_id) = entry.wallet_id {
            *deltas.entry(wallet_id).or_insert(0) += entry.amount;
        }
    }
    deltas
}
