mod common;

use anyhow::Result;
use common::{balance, dec, funded_wallet, test_service};
use futures::TryStreamExt;
use walletd::application::{AppError, PageRequest, TransferCommand};
use walletd::domain::{Currency, Transaction, TransactionStatus, build_entries};
use walletd::storage::{LedgerError, LedgerStore, Repository};

fn transfer(owner: uuid::Uuid, from: uuid::Uuid, to: uuid::Uuid, amount: &str) -> TransferCommand {
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
async fn test_fresh_ledger_is_consistent() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let report = service.verify_balances().await?;
    assert_eq!(report.total_wallets, 0);
    assert!(report.all_consistent);

    let integrity = service.ledger_integrity().await?;
    assert!(integrity.all_balanced);
    assert_eq!(integrity.entry_count, 0);
    assert_eq!(integrity.currencies.len(), Currency::ALL.len());
    Ok(())
}

#[tokio::test]
async fn test_drift_is_reported_then_repaired() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, a) = funded_wallet(&service, Currency::Usd, "100.00").await?;
    let (_bob, b) = funded_wallet(&service, Currency::Eur, "40.00").await?;
    service.transfer(transfer(alice, a, b, "10.00")).await?;

    // Simulate a lost cache update
    service.cache().overwrite(a, 12345).await?;

    let report = service.verify_balances().await?;
    assert_eq!(report.total_wallets, 2);
    assert_eq!(report.discrepancy_count, 1);
    assert!(!report.all_consistent);
    let found = &report.discrepancies[0];
    assert_eq!(found.wallet_id, a);
    assert_eq!(found.owner_id, alice);
    assert_eq!(found.cached_balance, 12345);
    assert_eq!(found.ledger_balance, 9000);
    assert_eq!(found.discrepancy, 9000 - 12345);

    // Verification reads only
    assert_eq!(balance(&service, a).await?, 12345);

    let result = service.reconcile(a).await?;
    assert_eq!(result.previous_balance, 12345);
    assert_eq!(result.new_balance, 9000);
    assert_eq!(result.adjustment, -3345);
    assert_eq!(balance(&service, a).await?, 9000);
    assert_eq!(service.ledger().sum_balance(a).await?, 9000);

    // Reconciling again is a no-op
    let again = service.reconcile(a).await?;
    assert_eq!(again.adjustment, 0);
    assert_eq!(again.new_balance, 9000);

    let report = service.verify_balances().await?;
    assert!(report.all_consistent);
    Ok(())
}

#[tokio::test]
async fn test_verify_single_wallet() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (_owner, w) = funded_wallet(&service, Currency::Gbp, "12.34").await?;

    let ok = service.verify_wallet(w).await?;
    assert!(ok.consistent);
    assert_eq!((ok.cached_balance, ok.ledger_balance), (1234, 1234));

    service.cache().overwrite(w, 0).await?;
    let drifted = service.verify_wallet(w).await?;
    assert!(!drifted.consistent);
    assert_eq!(drifted.discrepancy, 1234);

    let missing = uuid::Uuid::new_v4();
    assert!(matches!(service.verify_wallet(missing).await, Err(AppError::WalletNotFound(_))));
    assert!(matches!(service.reconcile(missing).await, Err(AppError::WalletNotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_cache_cannot_be_overwritten_with_negative_balance() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (_owner, w) = funded_wallet(&service, Currency::Usd, "1.00").await?;

    let result = service.cache().overwrite(w, -1).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(balance(&service, w).await?, 100);
    Ok(())
}

#[tokio::test]
async fn test_ledger_integrity_per_currency() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, usd) = funded_wallet(&service, Currency::Usd, "500.00").await?;
    let (bob, eur) = funded_wallet(&service, Currency::Eur, "200.00").await?;
    let (_carol, jpy) = funded_wallet(&service, Currency::Jpy, "0").await?;

    service.transfer(transfer(alice, usd, eur, "100.00")).await?;
    service.transfer(transfer(bob, eur, jpy, "50.00")).await?;
    service.transfer(transfer(alice, usd, jpy, "1.00")).await?;

    let integrity = service.ledger_integrity().await?;
    assert!(integrity.all_balanced);
    for currency in &integrity.currencies {
        assert_eq!(currency.total_debits, currency.total_credits, "{}", currency.currency);
    }
    let usd_totals = integrity
        .currencies
        .iter()
        .find(|c| c.currency == Currency::Usd)
        .unwrap();
    // Top-up contra leg plus two outgoing transfers
    assert_eq!(usd_totals.total_debits, 50000 + 10000 + 100);
    // 3 top-ups (2 + 2 entries; the zero JPY one is skipped) + 3 transfers (4 each)
    assert_eq!(integrity.entry_count, 4 + 12);
    Ok(())
}

#[tokio::test]
async fn test_wallet_entries_stream_is_ordered_and_restartable() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, a) = funded_wallet(&service, Currency::Usd, "100.00").await?;
    let (_bob, b) = funded_wallet(&service, Currency::Usd, "0").await?;
    for amount in ["1.00", "2.00", "3.00"] {
        service.transfer(transfer(alice, a, b, amount)).await?;
    }

    let first: Vec<_> = service.ledger().entries_for(a).try_collect().await?;
    let second: Vec<_> = service.ledger().entries_for(a).try_collect().await?;
    assert_eq!(first, second);
    assert_eq!(first.len(), 4);
    assert!(first.windows(2).all(|w| w[0].sequence < w[1].sequence));
    assert_eq!(
        first.iter().map(|e| e.amount).collect::<Vec<_>>(),
        vec![10000, -100, -200, -300]
    );
    assert_eq!(first.iter().map(|e| e.amount).sum::<i64>(), balance(&service, a).await?);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_append_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, a) = funded_wallet(&service, Currency::Usd, "100.00").await?;
    let (_bob, b) = funded_wallet(&service, Currency::Usd, "0").await?;
    let txn = service.transfer(transfer(alice, a, b, "10.00")).await?;

    let mut again = build_entries(&txn);
    let result = service.ledger().append_entries(txn.id, &mut again).await;
    assert!(matches!(result, Err(LedgerError::DuplicateTransaction(id)) if id == txn.id));

    let empty = service.ledger().append_entries(txn.id, &mut []).await;
    assert!(matches!(empty, Err(LedgerError::InvalidBatch(_))));

    assert_eq!(service.ledger().entries_for_transaction(txn.id).await?.len(), 2);
    assert_eq!(service.ledger().sum_balance(a).await?, 9000);
    Ok(())
}

#[tokio::test]
async fn test_ledger_entries_cannot_be_edited() -> Result<()> {
    let (service, temp) = test_service().await?;
    let (_owner, w) = funded_wallet(&service, Currency::Usd, "10.00").await?;

    let db_url = format!("sqlite:{}", temp.path().join("test.db").display());
    let repo = Repository::connect(&db_url, 1).await?;

    let update = sqlx::query("UPDATE ledger_entries SET amount = amount * 2")
        .execute(repo.pool())
        .await;
    assert!(update.is_err());
    let delete = sqlx::query("DELETE FROM ledger_entries").execute(repo.pool()).await;
    assert!(delete.is_err());

    assert_eq!(service.ledger().sum_balance(w).await?, 1000);
    Ok(())
}

#[tokio::test]
async fn test_reconcile_all_completes_stranded_transactions() -> Result<()> {
    let (service, temp) = test_service().await?;
    let (owner, w) = funded_wallet(&service, Currency::Eur, "10.00").await?;

    // A top-up that committed but never reached the completion step
    let db_url = format!("sqlite:{}", temp.path().join("test.db").display());
    let repo = Repository::connect(&db_url, 1).await?;
    let stranded = Transaction::top_up(w, 2500, Currency::Eur, chrono::Utc::now());
    let mut entries = build_entries(&stranded);
    let mut tx = repo.begin().await?;
    Repository::save_transaction_in(&mut tx, &stranded).await?;
    LedgerStore::append_entries_in(&mut tx, stranded.id, &mut entries).await?;
    tx.commit().await?;

    assert_eq!(balance(&service, w).await?, 1000);

    let summary = service.reconcile_all().await?;
    assert_eq!(summary.completed_transactions, 1);
    assert_eq!(summary.reconciled.len(), 1);
    assert_eq!(summary.reconciled[0].wallet_id, w);
    assert_eq!(summary.reconciled[0].adjustment, 2500);
    assert_eq!(balance(&service, w).await?, 3500);

    let history = service.transactions_for_wallet(owner, w, PageRequest::default()).await?;
    let completed = history.content.iter().find(|t| t.id == stranded.id).unwrap();
    assert_eq!(completed.status, TransactionStatus::Completed);
    assert!(completed.completed_at.is_some());

    // Nothing left to do on a second pass
    let second = service.reconcile_all().await?;
    assert_eq!(second.completed_transactions, 0);
    assert!(second.reconciled.is_empty());
    Ok(())
}
