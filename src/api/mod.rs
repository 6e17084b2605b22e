// HTTP layer - JSON endpoints over the ledger service

mod admin;
mod dto;
mod error;
mod identity;
mod ledger;
mod rates;
mod transactions;
mod wallets;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post};

use crate::application::LedgerService;

pub use dto::*;
pub use error::*;
pub use identity::*;
pub use transactions::IDEMPOTENCY_KEY_HEADER;

/// Build the router for all endpoints.
pub fn router(service: Arc<LedgerService>) -> Router {
    Router::new()
        .route("/api/wallets", get(wallets::list).post(wallets::create))
        .route("/api/wallets/{id}", get(wallets::show))
        .route("/api/wallets/{id}/topup", post(wallets::top_up))
        .route("/api/wallets/{id}/withdraw", post(wallets::withdraw))
        .route("/api/wallets/{id}/daily-limit", patch(wallets::update_daily_limit))
        .route("/api/wallets/{id}/ledger", get(ledger::wallet_entries))
        .route("/api/transactions", get(transactions::history))
        .route("/api/transactions/transfer", post(transactions::transfer))
        .route("/api/transactions/wallet/{id}", get(transactions::wallet_history))
        .route("/api/transactions/analytics", get(transactions::analytics))
        .route("/api/transactions/{id}/ledger", get(ledger::transaction_entries))
        .route("/api/rates", get(rates::table))
        .route("/api/rates/convert", get(rates::convert))
        .route("/api/admin/wallets", get(admin::list_wallets))
        .route("/api/admin/transactions", get(admin::list_transactions))
        .route("/api/admin/analytics", get(admin::analytics))
        .route("/api/admin/rates", post(admin::publish_rates))
        .route("/api/admin/rates/live", delete(admin::clear_live_rates))
        .route("/api/admin/balance-verification", get(admin::balance_verification))
        .route("/api/admin/ledger-integrity", get(admin::ledger_integrity))
        .route("/api/admin/wallets/{id}/verify", get(admin::verify_wallet))
        .route("/api/admin/wallets/{id}/reconcile", post(admin::reconcile_wallet))
        .route("/api/admin/wallets/{id}/deactivate", post(admin::deactivate_wallet))
        .route("/api/admin/wallets/{id}/ledger-balance", get(admin::ledger_balance))
        .with_state(service)
}
