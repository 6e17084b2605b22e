use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use rust_decimal::Decimal;

use crate::application::LedgerService;
use crate::domain::{Currency, RateTableView};

use super::{ApiError, ConversionResponse, ConvertQuery};

pub async fn table(State(service): State<Arc<LedgerService>>) -> Json<RateTableView> {
    Json(service.rate_table())
}

fn currency(code: &str) -> Result<Currency, ApiError> {
    Currency::from_code(code).ok_or_else(|| ApiError::bad_request(format!("unsupported currency: {}", code)))
}

/// Preview a conversion without booking anything.
pub async fn convert(
    State(service): State<Arc<LedgerService>>,
    Query(query): Query<ConvertQuery>,
) -> Result<Json<ConversionResponse>, ApiError> {
    let from = currency(&query.from)?;
    let to = currency(&query.to)?;
    let amount = Decimal::from_str(query.amount.trim())
        .map_err(|_| ApiError::bad_request(format!("invalid amount: {}", query.amount)))?;
    let quote = service.preview_conversion(from, to, amount)?;
    Ok(Json(quote.into()))
}
