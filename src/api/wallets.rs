use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use uuid::Uuid;

use crate::application::{LedgerService, TopUpCommand, WithdrawalCommand};
use crate::domain::Currency;

use super::{
    ApiError, Caller, CreateWalletRequest, Payload, TopUpRequest, TransactionResponse,
    UpdateDailyLimitRequest, WalletResponse, WithdrawRequest,
};

pub async fn list(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
) -> Result<Json<Vec<WalletResponse>>, ApiError> {
    let wallets = service.list_wallets(caller.user_id).await?;
    Ok(Json(wallets.into_iter().map(Into::into).collect()))
}

pub async fn create(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
    Payload(req): Payload<CreateWalletRequest>,
) -> Result<(StatusCode, Json<WalletResponse>), ApiError> {
    let currency = Currency::from_code(&req.currency)
        .ok_or_else(|| ApiError::bad_request(format!("unsupported currency: {}", req.currency)))?;
    let wallet = service.create_wallet(caller.user_id, currency).await?;
    Ok((StatusCode::CREATED, Json(wallet.into())))
}

pub async fn show(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<WalletResponse>, ApiError> {
    let wallet = service.get_wallet(caller.user_id, id).await?;
    Ok(Json(wallet.into()))
}

pub async fn top_up(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Payload(req): Payload<TopUpRequest>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let txn = service
        .top_up(TopUpCommand {
            owner: Some(caller.user_id),
            wallet_id: id,
            amount: req.amount,
            description: req.description,
        })
        .await?;
    Ok(Json(txn.into()))
}

pub async fn withdraw(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Payload(req): Payload<WithdrawRequest>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let txn = service
        .withdraw(WithdrawalCommand {
            owner: Some(caller.user_id),
            wallet_id: id,
            amount: req.amount,
            bank_account_number: req.bank_account_number,
            bank_name: req.bank_name,
            description: req.description,
        })
        .await?;
    Ok(Json(txn.into()))
}

pub async fn update_daily_limit(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Payload(req): Payload<UpdateDailyLimitRequest>,
) -> Result<Json<WalletResponse>, ApiError> {
    let wallet = service.update_daily_limit(caller.user_id, id, req.daily_limit).await?;
    Ok(Json(wallet.into()))
}
