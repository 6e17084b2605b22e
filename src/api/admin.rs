use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use uuid::Uuid;

use crate::application::{LedgerService, PageRequest};
use crate::domain::{Currency, RateTableView};

use super::{
    ApiError, BalanceVerificationResponse, Caller, LedgerBalanceResponse, LedgerIntegrityResponse,
    PageQuery, PageResponse, Payload, PublishRatesRequest, ReconciliationResponse,
    SystemAnalyticsResponse, TransactionResponse, WalletResponse, WalletVerificationResponse,
};

pub async fn list_wallets(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse<WalletResponse>>, ApiError> {
    caller.require_admin()?;
    let page = service.list_all_wallets(PageRequest::new(query.page, query.size)).await?;
    Ok(Json(PageResponse::from_page(page)))
}

pub async fn list_transactions(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse<TransactionResponse>>, ApiError> {
    caller.require_admin()?;
    let page = service.all_transactions(PageRequest::new(query.page, query.size)).await?;
    Ok(Json(PageResponse::from_page(page)))
}

pub async fn analytics(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
) -> Result<Json<SystemAnalyticsResponse>, ApiError> {
    caller.require_admin()?;
    let analytics = service.system_analytics().await?;
    Ok(Json(analytics.into()))
}

/// Push USD-based quotes from a rate feed; they replace any earlier live quotes.
pub async fn publish_rates(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
    Payload(req): Payload<PublishRatesRequest>,
) -> Result<Json<RateTableView>, ApiError> {
    caller.require_admin()?;
    let mut quotes = HashMap::with_capacity(req.quotes.len());
    for (code, quote) in req.quotes {
        let currency = Currency::from_code(&code)
            .ok_or_else(|| ApiError::bad_request(format!("unsupported currency: {}", code)))?;
        quotes.insert(currency, quote);
    }
    Ok(Json(service.publish_usd_quotes(&quotes)?))
}

pub async fn clear_live_rates(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
) -> Result<Json<RateTableView>, ApiError> {
    caller.require_admin()?;
    Ok(Json(service.clear_live_rates()?))
}

pub async fn ledger_balance(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<LedgerBalanceResponse>, ApiError> {
    caller.require_admin()?;
    let balance = service.ledger_balance(id).await?;
    Ok(Json(balance.into()))
}

pub async fn balance_verification(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
) -> Result<Json<BalanceVerificationResponse>, ApiError> {
    caller.require_admin()?;
    let report = service.verify_balances().await?;
    Ok(Json(report.into()))
}

pub async fn ledger_integrity(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
) -> Result<Json<LedgerIntegrityResponse>, ApiError> {
    caller.require_admin()?;
    let report = service.ledger_integrity().await?;
    Ok(Json(report.into()))
}

pub async fn verify_wallet(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<WalletVerificationResponse>, ApiError> {
    caller.require_admin()?;
    let verification = service.verify_wallet(id).await?;
    Ok(Json(verification.into()))
}

pub async fn reconcile_wallet(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ReconciliationResponse>, ApiError> {
    caller.require_admin()?;
    let result = service.reconcile(id).await?;
    Ok(Json(result.into()))
}

pub async fn deactivate_wallet(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<WalletResponse>, ApiError> {
    caller.require_admin()?;
    let wallet = service.deactivate_wallet(id).await?;
    Ok(Json(wallet.into()))
}
