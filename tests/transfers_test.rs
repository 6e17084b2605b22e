mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{balance, dec, funded_wallet, test_service, test_service_with, test_service_without_rates, wallet_for};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use uuid::Uuid;
use walletd::application::{AppError, PageRequest, ServiceConfig, SystemClock, TopUpCommand, TransferCommand, WithdrawalCommand};
use walletd::domain::{
    AccountKind, Currency, EntryRole, RateSource, RateTable, TransactionKind, TransactionStatus,
};

fn transfer(owner: Uuid, from: Uuid, to: Uuid, amount: &str) -> TransferCommand {
    TransferCommand {
        owner: Some(owner),
        source_wallet_id: from,
        target_wallet_id: to,
        amount: dec(amount),
        description: None,
        idempotency_key: None,
    }
}

#[tokio::test]
async fn test_cross_currency_transfer_scenario() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let (alice, a) = funded_wallet(&service, Currency::Usd, "100.00").await?;
    let (_bob, b) = funded_wallet(&service, Currency::Eur, "0").await?;
    service.update_daily_limit(alice, a, dec("500.00")).await?;

    let txn = service.transfer(transfer(alice, a, b, "30.00")).await?;

    assert_eq!(txn.status, TransactionStatus::Completed);
    assert_eq!(txn.kind, TransactionKind::Transfer);
    assert_eq!(txn.exchange_rate, dec("0.92"));
    assert_eq!(txn.rate_source, RateSource::Static);
    assert_eq!(txn.source_amount, 3000);
    assert_eq!(txn.target_amount, 2760);
    assert_eq!(txn.target_currency, Currency::Eur);

    let source = service.get_wallet(alice, a).await?;
    assert_eq!(source.wallet.balance, 7000);
    assert_eq!(source.spent_today(), 3000);
    assert_eq!(source.remaining_daily_limit(), 47000);
    assert_eq!(balance(&service, b).await?, 2760);

    let entries = service.ledger().entries_for_transaction(txn.id).await?;
    let source_leg = entries.iter().find(|e| e.wallet_id == Some(a)).unwrap();
    let target_leg = entries.iter().find(|e| e.wallet_id == Some(b)).unwrap();
    assert_eq!((source_leg.amount, source_leg.role), (-3000, EntryRole::Debit));
    assert_eq!((target_leg.amount, target_leg.role), (2760, EntryRole::Credit));
    assert!(entries.iter().all(|e| e.transaction_id == txn.id));

    // Exchange legs keep each currency balanced
    let exchange: Vec<_> = entries.iter().filter(|e| e.account == AccountKind::Exchange).collect();
    assert_eq!(exchange.len(), 2);
    let integrity = service.ledger_integrity().await?;
    assert!(integrity.all_balanced);

    Ok(())
}

#[tokio::test]
async fn test_same_currency_transfer_moves_exact_amount() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, a) = funded_wallet(&service, Currency::Gbp, "250.00").await?;
    let (_bob, b) = funded_wallet(&service, Currency::Gbp, "10.00").await?;

    let txn = service.transfer(transfer(alice, a, b, "75.25")).await?;

    assert_eq!(txn.exchange_rate, Decimal::ONE);
    assert_eq!(txn.target_amount, txn.source_amount);
    assert_eq!(balance(&service, a).await?, 17475);
    assert_eq!(balance(&service, b).await?, 8525);

    let entries = service.ledger().entries_for_transaction(txn.id).await?;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries.iter().map(|e| e.amount).sum::<i64>(), 0);
    Ok(())
}

#[tokio::test]
async fn test_top_up_scenario() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let owner = Uuid::new_v4();
    let c = wallet_for(&service, owner, Currency::Usd, "0").await?;

    let txn = service
        .top_up(TopUpCommand {
            owner: Some(owner),
            wallet_id: c,
            amount: dec("50.00"),
            description: Some("payday".to_string()),
        })
        .await?;

    assert_eq!(txn.status, TransactionStatus::Completed);
    assert_eq!(txn.description.as_deref(), Some("payday"));
    assert_eq!(balance(&service, c).await?, 5000);

    let wallet_entries: Vec<_> = service.ledger().entries_for(c).try_collect().await?;
    assert_eq!(wallet_entries.len(), 1);
    assert_eq!(wallet_entries[0].role, EntryRole::Credit);
    assert_eq!(wallet_entries[0].amount, 5000);

    let summary = service.get_wallet(owner, c).await?;
    assert_eq!(summary.spent_today(), 0);
    Ok(())
}

#[tokio::test]
async fn test_withdrawal_masks_bank_account() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (owner, w) = funded_wallet(&service, Currency::Eur, "80.00").await?;

    let txn = service
        .withdraw(WithdrawalCommand {
            owner: Some(owner),
            wallet_id: w,
            amount: dec("30"),
            bank_account_number: "DE89370400440532013000".to_string(),
            bank_name: Some("Commerzbank".to_string()),
            description: None,
        })
        .await?;

    assert_eq!(txn.kind, TransactionKind::Withdrawal);
    assert_eq!(txn.external_ref.as_deref(), Some("Commerzbank ****3000"));
    assert_eq!(balance(&service, w).await?, 5000);

    let blank_account = service
        .withdraw(WithdrawalCommand {
            owner: Some(owner),
            wallet_id: w,
            amount: dec("1"),
            bank_account_number: "  ".to_string(),
            bank_name: None,
            description: None,
        })
        .await;
    assert!(matches!(blank_account, Err(AppError::Validation(_))));
    Ok(())
}

#[tokio::test]
async fn test_rejections_before_building_leave_nothing() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, a) = funded_wallet(&service, Currency::Usd, "100.00").await?;

    let same = service.transfer(transfer(alice, a, a, "1.00")).await;
    assert!(matches!(same, Err(AppError::SameWalletTransfer)));

    let missing = Uuid::new_v4();
    let not_found = service.transfer(transfer(alice, a, missing, "1.00")).await;
    assert!(matches!(not_found, Err(AppError::WalletNotFound(id)) if id == missing));

    let (_bob, b) = funded_wallet(&service, Currency::Usd, "0").await?;
    let zero = service.transfer(transfer(alice, a, b, "0")).await;
    assert!(matches!(zero, Err(AppError::InvalidAmount(_))));

    let too_precise = service.transfer(transfer(alice, a, b, "1.005")).await;
    assert!(matches!(too_precise, Err(AppError::InvalidAmount(_))));

    let history = service.transactions_for_owner(alice, PageRequest::default()).await?;
    assert_eq!(history.total_elements, 1, "only the funding top-up is recorded");
    assert_eq!(balance(&service, a).await?, 10000);
    Ok(())
}

#[tokio::test]
async fn test_transfer_from_foreign_wallet_is_forbidden() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (_alice, a) = funded_wallet(&service, Currency::Usd, "100.00").await?;
    let (mallory, m) = funded_wallet(&service, Currency::Usd, "0").await?;

    let result = service.transfer(transfer(mallory, a, m, "10.00")).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
    assert_eq!(balance(&service, a).await?, 10000);
    Ok(())
}

#[tokio::test]
async fn test_insufficient_funds_is_recorded_as_failed() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, a) = funded_wallet(&service, Currency::Usd, "20.00").await?;
    let (_bob, b) = funded_wallet(&service, Currency::Usd, "0").await?;

    let result = service.transfer(transfer(alice, a, b, "20.01")).await;
    assert!(matches!(
        result,
        Err(AppError::InsufficientFunds { balance: 2000, required: 2001, .. })
    ));

    let history = service.transactions_for_wallet(alice, a, PageRequest::default()).await?;
    let failed: Vec<_> = history
        .content
        .iter()
        .filter(|t| t.status == TransactionStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].failure_reason.as_deref().unwrap().contains("Insufficient funds"));
    assert!(service.ledger().entries_for_transaction(failed[0].id).await?.is_empty());

    assert_eq!(balance(&service, a).await?, 2000);
    assert_eq!(service.get_wallet(alice, a).await?.spent_today(), 0);
    Ok(())
}

#[tokio::test]
async fn test_inactive_wallet_refuses_transactions() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, a) = funded_wallet(&service, Currency::Usd, "20.00").await?;
    let (_bob, b) = funded_wallet(&service, Currency::Usd, "0").await?;

    service.deactivate_wallet(b).await?;
    let result = service.transfer(transfer(alice, a, b, "5.00")).await;
    assert!(matches!(result, Err(AppError::WalletInactive(id)) if id == b));
    Ok(())
}

#[tokio::test]
async fn test_conversion_unavailable_fails_without_entries() -> Result<()> {
    let (service, _temp) = test_service_without_rates().await?;
    let (alice, a) = funded_wallet(&service, Currency::Usd, "100.00").await?;
    let (_bob, b) = funded_wallet(&service, Currency::Jpy, "0").await?;

    let result = service.transfer(transfer(alice, a, b, "10.00")).await;
    assert!(matches!(result, Err(AppError::ConversionUnavailable(_))));

    assert_eq!(balance(&service, a).await?, 10000);
    assert_eq!(balance(&service, b).await?, 0);
    assert_eq!(service.get_wallet(alice, a).await?.spent_today(), 0);

    let history = service.transactions_for_wallet(alice, a, PageRequest::default()).await?;
    let failed = history
        .content
        .iter()
        .find(|t| t.status == TransactionStatus::Failed)
        .unwrap();
    assert_eq!(failed.target_currency, Currency::Jpy);
    assert!(service.ledger().entries_for_transaction(failed.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_conversion_rounds_half_up_to_target_minor_units() -> Result<()> {
    let rates = Arc::new(RateTable::empty());
    rates.set_static_rate(Currency::Usd, Currency::Jpy, dec("50"));
    rates.set_static_rate(Currency::Usd, Currency::Eur, dec("0.25"));
    rates.set_static_rate(Currency::Jpy, Currency::Usd, dec("0.004"));
    let (service, _temp) = test_service_with(ServiceConfig::default(), Arc::new(SystemClock), rates).await?;

    let (alice, a) = funded_wallet(&service, Currency::Usd, "100.00").await?;
    let (bob, yen) = funded_wallet(&service, Currency::Jpy, "100").await?;
    let (_carol, eur) = funded_wallet(&service, Currency::Eur, "0").await?;

    // 0.01 USD * 50 = 0.5 JPY -> 1 JPY
    let txn = service.transfer(transfer(alice, a, yen, "0.01")).await?;
    assert_eq!(txn.target_amount, 1);

    // 0.05 USD * 50 = 2.5 JPY -> 3 JPY
    let txn = service.transfer(transfer(alice, a, yen, "0.05")).await?;
    assert_eq!(txn.target_amount, 3);

    // 0.02 USD * 0.25 = 0.005 EUR -> 0.01 EUR
    let txn = service.transfer(transfer(alice, a, eur, "0.02")).await?;
    assert_eq!(txn.target_amount, 1);

    // 1 JPY * 0.004 = 0.004 USD rounds to nothing
    let result = service.transfer(transfer(bob, yen, a, "1")).await;
    assert!(matches!(result, Err(AppError::InvalidAmount(_))));
    assert_eq!(balance(&service, yen).await?, 104);
    Ok(())
}

#[tokio::test]
async fn test_live_rates_win_over_static() -> Result<()> {
    let rates = Arc::new(RateTable::with_static_rates());
    rates.update_live([((Currency::Usd, Currency::Eur), dec("0.9"))], chrono::Utc::now());
    let (service, _temp) = test_service_with(ServiceConfig::default(), Arc::new(SystemClock), rates).await?;

    let (alice, a) = funded_wallet(&service, Currency::Usd, "10.00").await?;
    let (_bob, b) = funded_wallet(&service, Currency::Eur, "0").await?;

    let txn = service.transfer(transfer(alice, a, b, "10.00")).await?;
    assert_eq!(txn.rate_source, RateSource::Live);
    assert_eq!(txn.target_amount, 900);
    Ok(())
}

#[tokio::test]
async fn test_idempotent_transfer_replay() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, a) = funded_wallet(&service, Currency::Usd, "100.00").await?;
    let (_bob, b) = funded_wallet(&service, Currency::Usd, "0").await?;

    let mut cmd = transfer(alice, a, b, "40.00");
    cmd.idempotency_key = Some("order-7".to_string());

    let first = service.transfer(cmd.clone()).await?;
    let replay = service.transfer(cmd).await?;

    assert_eq!(first.id, replay.id);
    assert_eq!(balance(&service, a).await?, 6000);
    assert_eq!(balance(&service, b).await?, 4000);
    assert_eq!(service.ledger().entries_for_transaction(first.id).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_idempotent_replay_requires_source_ownership() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, a) = funded_wallet(&service, Currency::Usd, "100.00").await?;
    let (mallory, m) = funded_wallet(&service, Currency::Usd, "0").await?;

    let mut cmd = transfer(alice, a, m, "25.00");
    cmd.description = Some("rent".to_string());
    cmd.idempotency_key = Some("k1".to_string());
    let original = service.transfer(cmd.clone()).await?;

    // Same source wallet and key from someone who does not own the wallet
    let mut foreign = cmd.clone();
    foreign.owner = Some(mallory);
    let result = service.transfer(foreign).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let replay = service.transfer(cmd).await?;
    assert_eq!(replay.id, original.id);
    assert_eq!(replay.description.as_deref(), Some("rent"));
    assert_eq!(balance(&service, a).await?, 7500);
    assert_eq!(balance(&service, m).await?, 2500);
    Ok(())
}

#[tokio::test]
async fn test_transaction_history_pages() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, a) = funded_wallet(&service, Currency::Usd, "100.00").await?;
    let (bob, b) = funded_wallet(&service, Currency::Usd, "0").await?;

    for _ in 0..4 {
        service.transfer(transfer(alice, a, b, "1.00")).await?;
    }

    let first = service.transactions_for_owner(alice, PageRequest::new(Some(0), Some(2))).await?;
    assert_eq!(first.total_elements, 5);
    assert_eq!(first.total_pages, 3);
    assert_eq!(first.content.len(), 2);
    assert!(!first.last);

    let last = service.transactions_for_owner(alice, PageRequest::new(Some(2), Some(2))).await?;
    assert_eq!(last.content.len(), 1);
    assert!(last.last);

    // Incoming transfers show up in the target owner's history
    let incoming = service.transactions_for_owner(bob, PageRequest::default()).await?;
    assert_eq!(incoming.total_elements, 4);

    let foreign = service.transactions_for_wallet(bob, a, PageRequest::default()).await;
    assert!(matches!(foreign, Err(AppError::Forbidden(_))));
    Ok(())
}

#[tokio::test]
async fn test_wallet_analytics_totals() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, a) = funded_wallet(&service, Currency::Usd, "100.00").await?;
    let (bob, b) = funded_wallet(&service, Currency::Usd, "50.00").await?;

    service.transfer(transfer(alice, a, b, "30.00")).await?;
    service.transfer(transfer(bob, b, a, "5.00")).await?;
    let _ = service.transfer(transfer(alice, a, b, "500.00")).await;

    let analytics = service.analytics(alice, a, 30).await?;
    assert_eq!(analytics.topped_up, 10000);
    assert_eq!(analytics.transferred_out, 3000);
    assert_eq!(analytics.transferred_in, 500);
    assert_eq!(analytics.withdrawn, 0);
    assert_eq!(analytics.net_flow(), 7500);
    assert_eq!(analytics.completed_transactions, 3);
    assert_eq!(analytics.failed_transactions, 1);

    assert!(matches!(service.analytics(alice, a, 0).await, Err(AppError::Validation(_))));
    assert!(matches!(service.analytics(bob, a, 7).await, Err(AppError::Forbidden(_))));
    Ok(())
}

#[tokio::test]
async fn test_one_wallet_per_currency() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let owner = Uuid::new_v4();

    service.create_wallet(owner, Currency::Usd).await?;
    service.create_wallet(owner, Currency::Eur).await?;
    let duplicate = service.create_wallet(owner, Currency::Usd).await;
    assert!(matches!(duplicate, Err(AppError::WalletAlreadyExists(Currency::Usd))));

    let wallets = service.list_wallets(owner).await?;
    assert_eq!(wallets.len(), 2);
    assert!(wallets.iter().all(|w| w.wallet.daily_limit > 0));
    Ok(())
}
