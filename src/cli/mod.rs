use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use tracing::info;

use crate::api;
use crate::application::{
    BalanceVerificationReport, LedgerIntegrityReport, LedgerService, ServiceConfig, SystemClock,
};
use crate::domain::{LimitPeriod, RateTable, format_minor};
use crate::storage::DEFAULT_MAX_CONNECTIONS;

/// walletd - double-entry wallet ledger service
#[derive(Parser)]
#[command(name = "walletd")]
#[command(about = "Multi-currency wallet ledger with atomic transfers, daily limits and reconciliation")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "WALLETD_DATABASE", default_value = "walletd.db", global = true)]
    pub database: String,

    /// Daily limit for new wallets, in major units of the wallet's currency
    #[arg(long, env = "WALLETD_DEFAULT_DAILY_LIMIT", default_value = "10000.00", global = true)]
    pub default_daily_limit: Decimal,

    /// Daily limit period: calendar-day or rolling:<hours>
    #[arg(long, env = "WALLETD_LIMIT_PERIOD", default_value = "calendar-day", global = true)]
    pub limit_period: LimitPeriod,

    /// How long an operation waits for wallet locks, in milliseconds
    #[arg(long, env = "WALLETD_LOCK_TIMEOUT_MS", default_value_t = 5000, global = true)]
    pub lock_timeout_ms: u64,

    /// Maximum pooled database connections
    #[arg(long, env = "WALLETD_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS, global = true)]
    pub max_connections: u32,

    /// Log output format
    #[arg(long, env = "WALLETD_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    /// Address the HTTP API listens on
    #[arg(long, env = "WALLETD_BIND", default_value = "127.0.0.1:8080", global = true)]
    pub bind: SocketAddr,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the HTTP API (default)
    Serve,

    /// Initialize a new database
    Init,

    /// Verify ledger integrity and the balance cache
    Check,

    /// Complete stranded transactions and repair drifted balances
    Reconcile,
}

impl Cli {
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            default_daily_limit: self.default_daily_limit,
            limit_period: self.limit_period,
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
            max_connections: self.max_connections,
        }
    }

    async fn open(&self) -> Result<LedgerService> {
        LedgerService::init_with(
            &self.database,
            &self.service_config(),
            Arc::new(SystemClock),
            Arc::new(RateTable::with_static_rates()),
        )
        .await
        .with_context(|| format!("Failed to open database {}", self.database))
    }

    pub async fn run(mut self) -> Result<()> {
        match self.command.take().unwrap_or(Commands::Serve) {
            Commands::Serve => {
                let service = Arc::new(self.open().await?);
                serve(service, self.bind).await?;
            }

            Commands::Init => {
                self.open().await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::Check => {
                let service = self.open().await?;
                run_check_command(&service).await?;
            }

            Commands::Reconcile => {
                let service = self.open().await?;
                run_reconcile_command(&service).await?;
            }
        }

        Ok(())
    }
}

async fn serve(service: Arc<LedgerService>, bind: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!(%bind, "listening");

    axum::serve(listener, api::router(service))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received shutdown signal");
            }
        })
        .await
        .context("HTTP server failed")?;
    Ok(())
}

async fn run_check_command(service: &LedgerService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let integrity = service.ledger_integrity().await?;
    print_integrity(&integrity);

    let verification = service.verify_balances().await?;
    print_verification(&verification);

    if integrity.all_balanced && verification.all_consistent {
        println!("Ledger is consistent.");
        Ok(())
    } else {
        anyhow::bail!("Ledger integrity check failed");
    }
}

fn print_integrity(report: &LedgerIntegrityReport) {
    println!("Entries: {}", report.entry_count);
    println!();
    println!("{:<6} {:>16} {:>16}", "", "Debits", "Credits");
    for c in &report.currencies {
        println!(
            "{:<6} {:>16} {:>16}  {}",
            c.currency.code(),
            format_minor(c.total_debits, c.currency),
            format_minor(c.total_credits, c.currency),
            if c.balanced { "OK" } else { "UNBALANCED!" }
        );
    }
    println!();
}

fn print_verification(report: &BalanceVerificationReport) {
    println!(
        "Wallets: {} ({} consistent)",
        report.total_wallets, report.consistent_wallets
    );
    if !report.discrepancies.is_empty() {
        println!("Discrepancies:");
        for d in &report.discrepancies {
            println!(
                "  - {} cached {} ledger {} ({})",
                d.wallet_id,
                format_minor(d.cached_balance, d.currency),
                format_minor(d.ledger_balance, d.currency),
                format_minor(d.discrepancy, d.currency)
            );
        }
    }
    println!();
}

async fn run_reconcile_command(service: &LedgerService) -> Result<()> {
    let summary = service.reconcile_all().await?;

    println!("Completed stranded transactions: {}", summary.completed_transactions);
    if summary.reconciled.is_empty() {
        println!("All balances match the ledger.");
        return Ok(());
    }

    println!("Reconciled wallets:");
    for r in &summary.reconciled {
        println!(
            "  {} {} -> {} ({})",
            r.wallet_id,
            format_minor(r.previous_balance, r.currency),
            format_minor(r.new_balance, r.currency),
            format_minor(r.adjustment, r.currency)
        );
    }
    Ok(())
}
