use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::adapters::{PostgresBookingLedger, PostgresTransactionStore};
use crate::config::Config;
use crate::pix::{self, BrCode};
use crate::services::settlement::SettlementOutcome;
use crate::validation::{validate_confirmation_id, validate_operator_id, validate_payment_amount};
use crate::AppState;

#[derive(Parser)]
#[command(name = "pix-settlement")]
#[command(about = "PIX settlement service: payment codes, bank webhooks and reconciliation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve {
        /// Keep all state in memory instead of Postgres
        #[arg(long)]
        in_memory: bool,
    },

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Print the effective configuration
    Config {
        /// Also check database and bank API connectivity
        #[arg(long)]
        check: bool,
    },

    /// Run one reconciliation sweep and exit
    Sweep {
        /// Also list pending payments expiring within this many minutes
        #[arg(long)]
        window_minutes: Option<i64>,
    },

    /// Transaction management commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// BR Code helpers
    #[command(subcommand)]
    Code(CodeCommands),
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Show a transaction, polling the bank if it is still pending
    Status {
        #[arg(value_name = "TX_ID")]
        tx_id: Uuid,
    },

    /// Manually confirm a pending or failed transaction
    Confirm {
        #[arg(value_name = "TX_ID")]
        tx_id: Uuid,

        /// Bank-assigned confirmation id
        #[arg(long)]
        bank_tx_id: String,

        /// Operator recorded on the override
        #[arg(long)]
        operator: String,
    },
}

#[derive(Subcommand)]
pub enum CodeCommands {
    /// Encode a BR Code with the configured merchant identity
    Encode {
        #[arg(long)]
        amount: String,

        #[arg(long)]
        reference: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Verify and decode a BR Code
    Decode {
        #[arg(value_name = "PAYLOAD")]
        payload: String,
    },
}

/// Application state backed by Postgres.
pub async fn connect_state(config: Config) -> anyhow::Result<AppState> {
    let pool = crate::db::create_pool(&config).await?;
    let store = Arc::new(PostgresTransactionStore::new(pool.clone()));
    let bookings = Arc::new(PostgresBookingLedger::new(pool));
    Ok(AppState::new(config, store, bookings))
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    println!("✓ Database migrations completed");
    Ok(())
}

pub async fn handle_config(config: &Config, check: bool) -> anyhow::Result<()> {
    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Log Format: {:?}", config.log_format);
    println!("  Admin API: {}", enabled(config.admin_api_key.is_some()));
    println!("  PIX Key: {}", enabled(config.pix.pix_key.is_some()));
    println!(
        "  Merchant: {} / {}",
        config.pix.merchant_name, config.pix.merchant_city
    );
    println!("  Webhook Secret: {}", enabled(config.webhook.secret.is_some()));
    println!(
        "  Bank API URL: {}",
        config.bank_api.base_url.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  Checkout API URL: {}",
        config.checkout.api_url.as_deref().unwrap_or("(not set)")
    );
    println!("  Sweep Interval: {}s", config.sweep.interval_secs);

    if !check {
        return Ok(());
    }

    let pool = crate::db::create_pool(config).await?;
    let report = crate::startup::validate_environment(config, &pool).await?;
    report.print();
    if !report.is_valid() {
        anyhow::bail!("Startup validation failed");
    }
    Ok(())
}

pub async fn handle_sweep(state: &AppState, window_minutes: Option<i64>) -> anyhow::Result<()> {
    if let Some(minutes) = window_minutes {
        let expiring = state.sweeper.list_expiring(minutes).await?;
        println!("Expiring within {} minutes: {}", minutes, expiring.len());
        for tx in &expiring {
            println!("  {}  {}  expires {}", tx.id, pix::format_amount(&tx.amount), tx.expires_at);
        }
    }

    let report = state.sweeper.run_once().await?;
    println!("✓ Sweep completed");
    println!("  Polled: {}", report.polled);
    println!("  Confirmed by poll: {}", report.confirmed_by_poll);
    println!("  Poll errors: {}", report.poll_errors);
    println!("  Expired: {}", report.expired);
    println!("  Deleted: {}", report.deleted);
    println!("  Reconciliation attempts deleted: {}", report.attempts_deleted);
    println!("  Bookings resynced: {}", report.resynced);
    Ok(())
}

pub async fn handle_tx_status(state: &AppState, tx_id: Uuid) -> anyhow::Result<()> {
    let check = state.poller.check_status(tx_id).await?;
    let tx = &check.transaction;

    println!("Transaction {}", tx.id);
    println!("  Rail: {}", tx.rail.as_str());
    println!("  Status: {}", tx.status);
    println!("  Amount: {}", pix::format_amount(&tx.amount));
    println!("  Expires: {}", tx.expires_at);
    if let Some(confirmed_at) = tx.confirmed_at {
        println!("  Confirmed: {}", confirmed_at);
    }
    if let Some(by) = &tx.confirmed_by {
        println!("  Confirmed by: {}", by);
    }
    println!("  Verification: {}", check.source.as_str());
    Ok(())
}

pub async fn handle_tx_confirm(
    state: &AppState,
    tx_id: Uuid,
    bank_tx_id: &str,
    operator: &str,
) -> anyhow::Result<()> {
    validate_confirmation_id(bank_tx_id)?;
    validate_operator_id(operator)?;

    let outcome = state
        .settlement
        .manual_confirm(tx_id, bank_tx_id, operator)
        .await?;

    match outcome {
        SettlementOutcome::Settled(tx) => {
            println!("✓ Transaction {} confirmed by {}", tx.id, operator)
        }
        other => println!(
            "Transaction {} was already {}",
            other.transaction().id,
            other.transaction().status
        ),
    }
    Ok(())
}

pub fn handle_code_encode(
    config: &Config,
    amount: &str,
    reference: Option<&str>,
    description: Option<&str>,
) -> anyhow::Result<()> {
    let amount = BigDecimal::from_str(amount.trim())
        .map_err(|_| anyhow::anyhow!("amount '{}' is not a number", amount))?;
    validate_payment_amount(&amount)?;

    let code = pix::encode(&BrCode {
        pix_key: config.pix.pix_key.as_deref(),
        amount: &amount,
        merchant_name: &config.pix.merchant_name,
        merchant_city: &config.pix.merchant_city,
        merchant_category_code: &config.pix.merchant_category_code,
        description,
        order_reference: reference,
    })?;

    println!("{}", code);
    Ok(())
}

pub fn handle_code_decode(payload: &str) -> anyhow::Result<()> {
    let decoded = pix::decode(payload.trim())?;

    println!("✓ Checksum {} is valid", decoded.checksum);
    println!("  PIX key: {}", decoded.pix_key);
    println!("  Merchant: {}", decoded.merchant_name);
    println!("  City: {}", decoded.merchant_city);
    println!("  Category: {}", decoded.merchant_category_code);
    println!("  Currency: {} ({})", decoded.currency, decoded.country_code);
    if let Some(amount) = &decoded.amount {
        println!("  Amount: {}", pix::format_amount(amount));
    }
    if let Some(reference) = &decoded.order_reference {
        println!("  Reference: {}", reference);
    }
    if let Some(description) = &decoded.description {
        println!("  Description: {}", description);
    }
    Ok(())
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "configured"
    } else {
        "not set"
    }
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
