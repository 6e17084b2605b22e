mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{balance, dec, funded_wallet, test_service};
use uuid::Uuid;
use walletd::application::{AppError, TransferCommand, WithdrawalCommand};
use walletd::domain::Currency;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_never_overdraw() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let (owner, w) = funded_wallet(&service, Currency::Usd, "100.00").await?;

    let mut handles = Vec::new();
    for i in 0..10 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .withdraw(WithdrawalCommand {
                    owner: Some(owner),
                    wallet_id: w,
                    amount: dec("15.00"),
                    bank_account_number: format!("NL91ABNA04171643{:02}", i),
                    bank_name: None,
                    description: None,
                })
                .await
        }));
    }

    let mut succeeded = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => succeeded += 1,
            Err(AppError::InsufficientFunds { .. }) => insufficient += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 6);
    assert_eq!(insufficient, 4);
    assert_eq!(balance(&service, w).await?, 1000);
    assert_eq!(service.ledger().sum_balance(w).await?, 1000);
    assert_eq!(service.get_wallet(owner, w).await?.spent_today(), 9000);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_transfers_do_not_deadlock() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let (alice, a) = funded_wallet(&service, Currency::Usd, "1000.00").await?;
    let (bob, b) = funded_wallet(&service, Currency::Usd, "1000.00").await?;

    let mut handles = Vec::new();
    for i in 0..20 {
        let service = service.clone();
        let (owner, from, to) = if i % 2 == 0 { (alice, a, b) } else { (bob, b, a) };
        handles.push(tokio::spawn(async move {
            service
                .transfer(TransferCommand {
                    owner: Some(owner),
                    source_wallet_id: from,
                    target_wallet_id: to,
                    amount: dec("7.00"),
                    description: None,
                    idempotency_key: None,
                })
                .await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    // Ten transfers each way cancel out
    assert_eq!(balance(&service, a).await?, 100000);
    assert_eq!(balance(&service, b).await?, 100000);

    let report = service.verify_balances().await?;
    assert!(report.all_consistent);
    assert!(service.ledger_integrity().await?.all_balanced);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_idempotent_requests_apply_once() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let (alice, a) = funded_wallet(&service, Currency::Eur, "50.00").await?;
    let (_bob, b) = funded_wallet(&service, Currency::Eur, "0").await?;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .transfer(TransferCommand {
                    owner: Some(alice),
                    source_wallet_id: a,
                    target_wallet_id: b,
                    amount: dec("20.00"),
                    description: None,
                    idempotency_key: Some("rent-march".to_string()),
                })
                .await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await??.id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(balance(&service, a).await?, 3000);
    assert_eq!(balance(&service, b).await?, 2000);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fan_out_transfers_from_one_wallet_never_overdraw() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let (alice, a) = funded_wallet(&service, Currency::Usd, "100.00").await?;

    let mut targets = Vec::new();
    for _ in 0..10 {
        let (_, target) = funded_wallet(&service, Currency::Usd, "0").await?;
        targets.push(target);
    }

    let mut handles = Vec::new();
    for target in targets.iter().copied() {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .transfer(TransferCommand {
                    owner: Some(alice),
                    source_wallet_id: a,
                    target_wallet_id: target,
                    amount: dec("15.00"),
                    description: None,
                    idempotency_key: None,
                })
                .await
        }));
    }

    let mut succeeded = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => succeeded += 1,
            Err(AppError::InsufficientFunds { .. }) => insufficient += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 6);
    assert_eq!(insufficient, 4);
    assert_eq!(balance(&service, a).await?, 1000);

    let mut received = 0;
    for target in &targets {
        let credited = balance(&service, *target).await?;
        assert!(credited == 0 || credited == 1500);
        received += credited;
    }
    assert_eq!(received, 9000);

    let report = service.verify_balances().await?;
    assert!(report.all_consistent);
    assert!(service.ledger_integrity().await?.all_balanced);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_wallet_creation_yields_one_wallet() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let owners: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();

    let mut handles = Vec::new();
    for owner in owners.iter().copied() {
        for _ in 0..4 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                (owner, service.create_wallet(owner, Currency::Gbp).await)
            }));
        }
    }

    let mut created = Vec::new();
    for handle in handles {
        match handle.await? {
            (owner, Ok(_)) => created.push(owner),
            (_, Err(AppError::WalletAlreadyExists(Currency::Gbp))) => {}
            (_, Err(other)) => panic!("unexpected error: {other}"),
        }
    }

    created.sort();
    let mut expected = owners.clone();
    expected.sort();
    assert_eq!(created, expected);
    for owner in owners {
        assert_eq!(service.list_wallets(owner).await?.len(), 1);
    }
    Ok(())
}
