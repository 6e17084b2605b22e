//! Request and response bodies. Money crosses the wire as decimal major
//! units; decimals serialize as strings and deserialize from either
//! strings or numbers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::{
    BalanceVerificationReport, ConversionQuote, CurrencyBalance, Discrepancy, LedgerBalance,
    LedgerIntegrityReport, Page, ReconciliationResult, SystemAnalytics, WalletAnalytics,
    WalletSummary, WalletVerification,
};
use crate::domain::{
    AccountKind, Currency, EntryRole, LedgerEntry, RateSource, Transaction, TransactionKind,
    TransactionStatus, from_minor,
};
use crate::storage::CurrencyWalletTotals;

use super::ApiError;

/// JSON body extractor whose rejections use the API error body.
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Payload(value)),
            Err(rejection) => Err(rejection_to_error(rejection)),
        }
    }
}

fn rejection_to_error(rejection: JsonRejection) -> ApiError {
    ApiError::bad_request(rejection.body_text())
}

// ========================
// Requests
// ========================

#[derive(Debug, Deserialize)]
pub struct CreateWalletRequest {
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct TopUpRequest {
    pub amount: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    pub amount: Decimal,
    pub bank_account_number: String,
    pub bank_name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDailyLimitRequest {
    pub daily_limit: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub source_wallet_id: Uuid,
    pub target_wallet_id: Uuid,
    pub amount: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    pub wallet_id: Uuid,
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ConvertQuery {
    pub from: String,
    pub to: String,
    pub amount: String,
}

/// Units of each currency per 1 USD, keyed by currency code.
#[derive(Debug, Deserialize)]
pub struct PublishRatesRequest {
    pub quotes: std::collections::BTreeMap<String, Decimal>,
}

// ========================
// Responses
// ========================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    pub id: Uuid,
    pub currency: Currency,
    pub currency_symbol: String,
    pub balance: Decimal,
    pub daily_limit: Decimal,
    pub remaining_daily_limit: Decimal,
    pub spent_today: Decimal,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<WalletSummary> for WalletResponse {
    fn from(summary: WalletSummary) -> Self {
        let currency = summary.wallet.currency;
        Self {
            id: summary.wallet.id,
            currency,
            currency_symbol: currency.symbol().to_string(),
            balance: from_minor(summary.wallet.balance, currency),
            daily_limit: from_minor(summary.window.limit, currency),
            remaining_daily_limit: from_minor(summary.remaining_daily_limit(), currency),
            spent_today: from_minor(summary.spent_today(), currency),
            active: summary.wallet.active,
            created_at: summary.wallet.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub source_currency: Currency,
    pub converted_amount: Decimal,
    pub target_currency: Currency,
    pub exchange_rate: Decimal,
    pub rate_source: RateSource,
    pub source_wallet_id: Option<Uuid>,
    pub target_wallet_id: Option<Uuid>,
    pub description: Option<String>,
    pub external_ref: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Transaction> for TransactionResponse {
    fn from(txn: Transaction) -> Self {
        Self {
            id: txn.id,
            kind: txn.kind,
            status: txn.status,
            amount: from_minor(txn.source_amount, txn.source_currency),
            source_currency: txn.source_currency,
            converted_amount: from_minor(txn.target_amount, txn.target_currency),
            target_currency: txn.target_currency,
            exchange_rate: txn.exchange_rate,
            rate_source: txn.rate_source,
            source_wallet_id: txn.source_wallet,
            target_wallet_id: txn.target_wallet,
            description: txn.description,
            external_ref: txn.external_ref,
            failure_reason: txn.failure_reason,
            created_at: txn.created_at,
            completed_at: txn.completed_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: i64,
    pub total_pages: i64,
    pub last: bool,
}

impl<T> PageResponse<T> {
    pub fn from_page<U>(page: Page<U>) -> Self
    where
        T: From<U>,
    {
        let page = page.map(T::from);
        Self {
            content: page.content,
            page: page.page,
            size: page.size,
            total_elements: page.total_elements,
            total_pages: page.total_pages,
            last: page.last,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    pub wallet_id: Uuid,
    pub currency: Currency,
    pub days: i64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_topped_up: Decimal,
    pub total_withdrawn: Decimal,
    pub total_transferred_out: Decimal,
    pub total_transferred_in: Decimal,
    pub net_flow: Decimal,
    pub completed_transactions: i64,
    pub failed_transactions: i64,
}

impl From<WalletAnalytics> for AnalyticsResponse {
    fn from(a: WalletAnalytics) -> Self {
        let c = a.currency;
        Self {
            wallet_id: a.wallet_id,
            currency: c,
            days: a.days,
            period_start: a.period_start,
            period_end: a.period_end,
            total_topped_up: from_minor(a.topped_up, c),
            total_withdrawn: from_minor(a.withdrawn, c),
            total_transferred_out: from_minor(a.transferred_out, c),
            total_transferred_in: from_minor(a.transferred_in, c),
            net_flow: from_minor(a.net_flow(), c),
            completed_transactions: a.completed_transactions,
            failed_transactions: a.failed_transactions,
        }
    }
}

/// Entry amounts are magnitudes; `entryType` carries the direction.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryResponse {
    pub id: Uuid,
    pub sequence: i64,
    pub transaction_id: Uuid,
    pub wallet_id: Option<Uuid>,
    pub account_type: AccountKind,
    pub entry_type: EntryRole,
    pub amount: Decimal,
    pub currency: Currency,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for LedgerEntryResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id,
            sequence: entry.sequence,
            transaction_id: entry.transaction_id,
            wallet_id: entry.wallet_id,
            account_type: entry.account,
            entry_type: entry.role,
            amount: from_minor(entry.magnitude(), entry.currency),
            currency: entry.currency,
            description: entry.description,
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResponse {
    pub from: Currency,
    pub to: Currency,
    pub amount: Decimal,
    pub rate: Decimal,
    pub converted_amount: Decimal,
    pub source: RateSource,
}

impl From<ConversionQuote> for ConversionResponse {
    fn from(q: ConversionQuote) -> Self {
        Self {
            from: q.rate.from,
            to: q.rate.to,
            amount: from_minor(q.amount, q.rate.from),
            rate: q.rate.rate,
            converted_amount: from_minor(q.converted, q.rate.to),
            source: q.rate.source,
        }
    }
}

// ========================
// Admin reports
// ========================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerBalanceResponse {
    pub wallet_id: Uuid,
    pub currency: Currency,
    pub ledger_balance: Decimal,
}

impl From<LedgerBalance> for LedgerBalanceResponse {
    fn from(b: LedgerBalance) -> Self {
        Self {
            wallet_id: b.wallet_id,
            currency: b.currency,
            ledger_balance: from_minor(b.balance, b.currency),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyWalletsResponse {
    pub wallets: i64,
    pub total_balance: Decimal,
}

impl From<&CurrencyWalletTotals> for CurrencyWalletsResponse {
    fn from(t: &CurrencyWalletTotals) -> Self {
        Self {
            wallets: t.wallets,
            total_balance: from_minor(t.balance, t.currency),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemAnalyticsResponse {
    pub total_wallets: i64,
    pub total_transactions: i64,
    pub completed_transactions: i64,
    pub failed_transactions: i64,
    pub transactions_last_24_hours: i64,
    /// Keyed by currency code
    pub wallets_by_currency: std::collections::BTreeMap<String, CurrencyWalletsResponse>,
    pub as_of: DateTime<Utc>,
}

impl From<SystemAnalytics> for SystemAnalyticsResponse {
    fn from(a: SystemAnalytics) -> Self {
        Self {
            total_wallets: a.total_wallets,
            total_transactions: a.transactions.total,
            completed_transactions: a.transactions.completed,
            failed_transactions: a.transactions.failed,
            transactions_last_24_hours: a.transactions.recent,
            wallets_by_currency: a
                .currencies
                .iter()
                .map(|c| (c.currency.code().to_string(), c.into()))
                .collect(),
            as_of: a.as_of,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscrepancyResponse {
    pub wallet_id: Uuid,
    pub owner_id: Uuid,
    pub currency: Currency,
    pub cached_balance: Decimal,
    pub ledger_balance: Decimal,
    pub discrepancy: Decimal,
}

impl From<Discrepancy> for DiscrepancyResponse {
    fn from(d: Discrepancy) -> Self {
        Self {
            wallet_id: d.wallet_id,
            owner_id: d.owner_id,
            currency: d.currency,
            cached_balance: from_minor(d.cached_balance, d.currency),
            ledger_balance: from_minor(d.ledger_balance, d.currency),
            discrepancy: from_minor(d.discrepancy, d.currency),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceVerificationResponse {
    pub total_wallets: usize,
    pub consistent_wallets: usize,
    pub discrepancy_count: usize,
    pub all_consistent: bool,
    pub discrepancies: Vec<DiscrepancyResponse>,
    pub as_of: DateTime<Utc>,
}

impl From<BalanceVerificationReport> for BalanceVerificationResponse {
    fn from(r: BalanceVerificationReport) -> Self {
        Self {
            total_wallets: r.total_wallets,
            consistent_wallets: r.consistent_wallets,
            discrepancy_count: r.discrepancy_count,
            all_consistent: r.all_consistent,
            discrepancies: r.discrepancies.into_iter().map(Into::into).collect(),
            as_of: r.as_of,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyBalanceResponse {
    pub total_debits: Decimal,
    pub total_credits: Decimal,
    pub balanced: bool,
}

impl From<&CurrencyBalance> for CurrencyBalanceResponse {
    fn from(c: &CurrencyBalance) -> Self {
        Self {
            total_debits: from_minor(c.total_debits, c.currency),
            total_credits: from_minor(c.total_credits, c.currency),
            balanced: c.balanced,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerIntegrityResponse {
    /// Keyed by currency code
    pub currencies: std::collections::BTreeMap<String, CurrencyBalanceResponse>,
    pub all_balanced: bool,
    pub entry_count: i64,
    pub checked_at: DateTime<Utc>,
}

impl From<LedgerIntegrityReport> for LedgerIntegrityResponse {
    fn from(r: LedgerIntegrityReport) -> Self {
        Self {
            currencies: r
                .currencies
                .iter()
                .map(|c| (c.currency.code().to_string(), c.into()))
                .collect(),
            all_balanced: r.all_balanced,
            entry_count: r.entry_count,
            checked_at: r.checked_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletVerificationResponse {
    pub wallet_id: Uuid,
    pub currency: Currency,
    pub cached_balance: Decimal,
    pub ledger_balance: Decimal,
    pub discrepancy: Decimal,
    pub consistent: bool,
    pub checked_at: DateTime<Utc>,
}

impl From<WalletVerification> for WalletVerificationResponse {
    fn from(v: WalletVerification) -> Self {
        Self {
            wallet_id: v.wallet_id,
            currency: v.currency,
            cached_balance: from_minor(v.cached_balance, v.currency),
            ledger_balance: from_minor(v.ledger_balance, v.currency),
            discrepancy: from_minor(v.discrepancy, v.currency),
            consistent: v.consistent,
            checked_at: v.checked_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResponse {
    pub wallet_id: Uuid,
    pub currency: Currency,
    pub previous_balance: Decimal,
    pub new_balance: Decimal,
    pub adjustment: Decimal,
    pub reconciled_at: DateTime<Utc>,
}

impl From<ReconciliationResult> for ReconciliationResponse {
    fn from(r: ReconciliationResult) -> Self {
        Self {
            wallet_id: r.wallet_id,
            currency: r.currency,
            previous_balance: from_minor(r.previous_balance, r.currency),
            new_balance: from_minor(r.new_balance, r.currency),
            adjustment: from_minor(r.adjustment, r.currency),
            reconciled_at: r.reconciled_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_request_accepts_number_or_string_amounts() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let from_number: TransferRequest = serde_json::from_str(&format!(
            r#"{{"sourceWalletId":"{}","targetWalletId":"{}","amount":12.5}}"#,
            a, b
        ))
        .unwrap();
        let from_string: TransferRequest = serde_json::from_str(&format!(
            r#"{{"sourceWalletId":"{}","targetWalletId":"{}","amount":"12.50"}}"#,
            a, b
        ))
        .unwrap();
        assert_eq!(from_number.amount, from_string.amount);
        assert!(from_number.description.is_none());
    }

    #[test]
    fn test_transaction_response_uses_major_units() {
        let txn = Transaction::top_up(Uuid::new_v4(), 12345, Currency::Usd, Utc::now());
        let json = serde_json::to_value(TransactionResponse::from(txn)).unwrap();
        assert_eq!(json["type"], "TOP_UP");
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["amount"], "123.45");
        assert_eq!(json["sourceCurrency"], "USD");
    }

    #[test]
    fn test_ledger_entry_response_reports_magnitude_and_direction() {
        let wallet = Uuid::new_v4();
        let txn = Transaction::transfer(wallet, Uuid::new_v4(), 1999, Currency::Usd, Utc::now());
        let debit = LedgerEntry::debit_wallet(&txn, wallet, 1999, Currency::Usd);
        let json = serde_json::to_value(LedgerEntryResponse::from(debit)).unwrap();
        assert_eq!(json["entryType"], "DEBIT");
        assert_eq!(json["accountType"], "WALLET");
        assert_eq!(json["amount"], "19.99");
        assert_eq!(json["walletId"], wallet.to_string());
    }

    #[test]
    fn test_discrepancy_names_the_wallet_owner() {
        let owner = Uuid::new_v4();
        let discrepancy = Discrepancy {
            wallet_id: Uuid::new_v4(),
            owner_id: owner,
            currency: Currency::Eur,
            cached_balance: 1000,
            ledger_balance: 1250,
            discrepancy: 250,
        };
        let json = serde_json::to_value(DiscrepancyResponse::from(discrepancy)).unwrap();
        assert_eq!(json["ownerId"], owner.to_string());
        assert!(json.get("userId").is_none());
        assert_eq!(json["discrepancy"], "2.50");
    }
}
