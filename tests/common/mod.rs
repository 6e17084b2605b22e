// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tempfile::TempDir;
use uuid::Uuid;
use walletd::application::{Clock, LedgerService, ManualClock, ServiceConfig, SystemClock, TopUpCommand};
use walletd::domain::{Currency, OwnerId, RateProvider, RateTable, WalletId};

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Helper to create a test service with explicit settings, clock and rates
pub async fn test_service_with(
    config: ServiceConfig,
    clock: Arc<dyn Clock>,
    rates: Arc<dyn RateProvider>,
) -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init_with(db_path.to_str().unwrap(), &config, clock, rates).await?;
    Ok((service, temp_dir))
}

/// Service driven by a manual clock starting at the given instant
pub async fn test_service_at(start: DateTime<Utc>) -> Result<(LedgerService, Arc<ManualClock>, TempDir)> {
    let clock = Arc::new(ManualClock::new(start));
    let (service, temp_dir) = test_service_with(
        ServiceConfig::default(),
        clock.clone(),
        Arc::new(RateTable::with_static_rates()),
    )
    .await?;
    Ok((service, clock, temp_dir))
}

/// Service whose rate table has no rates at all
pub async fn test_service_without_rates() -> Result<(LedgerService, TempDir)> {
    test_service_with(
        ServiceConfig::default(),
        Arc::new(SystemClock),
        Arc::new(RateTable::empty()),
    )
    .await
}

/// Helper to parse a decimal literal
pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Helper to parse a "YYYY-MM-DD HH:MM" string into DateTime<Utc>
pub fn parse_time(s: &str) -> DateTime<Utc> {
    let (date, time) = s.split_once(' ').unwrap();
    let (h, m) = time.split_once(':').unwrap();
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(h.parse().unwrap(), m.parse().unwrap(), 0)
        .unwrap()
        .and_utc()
}

/// Create a wallet for a fresh owner and top it up
pub async fn funded_wallet(service: &LedgerService, currency: Currency, amount: &str) -> Result<(OwnerId, WalletId)> {
    let owner = Uuid::new_v4();
    let wallet_id = wallet_for(service, owner, currency, amount).await?;
    Ok((owner, wallet_id))
}

/// Create a wallet for the given owner and top it up
pub async fn wallet_for(service: &LedgerService, owner: OwnerId, currency: Currency, amount: &str) -> Result<WalletId> {
    let wallet = service.create_wallet(owner, currency).await?;
    let wallet_id = wallet.wallet.id;
    if dec(amount) > Decimal::ZERO {
        top_up(service, owner, wallet_id, amount).await?;
    }
    Ok(wallet_id)
}

pub async fn top_up(service: &LedgerService, owner: OwnerId, wallet_id: WalletId, amount: &str) -> Result<()> {
    service
        .top_up(TopUpCommand {
            owner: Some(owner),
            wallet_id,
            amount: dec(amount),
            description: None,
        })
        .await?;
    Ok(())
}

/// Cached balance of a wallet, in minor units
pub async fn balance(service: &LedgerService, wallet_id: WalletId) -> Result<i64> {
    Ok(service.cache().get(wallet_id).await?)
}
