use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use uuid::Uuid;

use crate::application::{LedgerService, PageRequest};

use super::{ApiError, Caller, LedgerEntryResponse, PageQuery, PageResponse, Role};

/// Admins read any ledger; everyone else only what touches their wallets.
fn reader(caller: &Caller) -> Option<Uuid> {
    match caller.role {
        Role::Admin => None,
        Role::User => Some(caller.user_id),
    }
}

pub async fn wallet_entries(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse<LedgerEntryResponse>>, ApiError> {
    let page = service
        .wallet_ledger(reader(&caller), id, PageRequest::new(query.page, query.size))
        .await?;
    Ok(Json(PageResponse::from_page(page)))
}

pub async fn transaction_entries(
    State(service): State<Arc<LedgerService>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<LedgerEntryResponse>>, ApiError> {
    let entries = service.transaction_ledger(reader(&caller), id).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}
