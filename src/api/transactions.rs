use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use uuid::Uuid;

use crate::application::{LedgerService, PageRequest, TransferCommand};

use super::{
    AnalyticsQuery, AnalyticsResponse, ApiError, Caller, PageQuery, PageResponse, Payload,
    TransactionResponse, TransferRequest,
};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Analytics window when `days` is omitted.
const DEFAULT_ANALYTICS_DAYS: i64 = 30;

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };
    let key = value
        .to_str()
        .map_err(|_| ApiError::bad_request("Idempotency-Key must be visible ASCII"))?
        .trim();
    if key.is_empty() {
        return Ok(None);
    }
    Ok(Some(key.to_string()))
}

pub async fn transfer(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
    headers: HeaderMap,
    Payload(req): Payload<TransferRequest>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let txn = service
        .transfer(TransferCommand {
            owner: Some(caller.user_id),
            source_wallet_id: req.source_wallet_id,
            target_wallet_id: req.target_wallet_id,
            amount: req.amount,
            description: req.description,
            idempotency_key: idempotency_key(&headers)?,
        })
        .await?;
    Ok(Json(txn.into()))
}

pub async fn history(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse<TransactionResponse>>, ApiError> {
    let page = service
        .transactions_for_owner(caller.user_id, PageRequest::new(query.page, query.size))
        .await?;
    Ok(Json(PageResponse::from_page(page)))
}

pub async fn wallet_history(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse<TransactionResponse>>, ApiError> {
    let page = service
        .transactions_for_wallet(caller.user_id, id, PageRequest::new(query.page, query.size))
        .await?;
    Ok(Json(PageResponse::from_page(page)))
}

pub async fn analytics(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<AnalyticsResponse>, ApiError> {
    let days = query.days.unwrap_or(DEFAULT_ANALYTICS_DAYS);
    let analytics = service.analytics(caller.user_id, query.wallet_id, days).await?;
    Ok(Json(analytics.into()))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_idempotency_key_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(idempotency_key(&headers).unwrap(), None);

        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_static("  "));
        assert_eq!(idempotency_key(&headers).unwrap(), None);

        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_static(" order-42 "));
        assert_eq!(idempotency_key(&headers).unwrap().as_deref(), Some("order-42"));
    }
}
