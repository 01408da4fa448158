use crate::config::Config;
use anyhow::{Context, Result};
use sqlx::PgPool;
use std::time::Duration;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    /// `None` when no bank API is configured.
    pub bank_api: Option<bool>,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.bank_api.unwrap_or(true)
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!(
            "Bank API Connectivity: {}",
            self.bank_api.map(status).unwrap_or("➖ SKIPPED")
        );

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

pub async fn validate_environment(config: &Config, pool: &PgPool) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        bank_api: None,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("Database: {}", e));
    }

    if let Some(base_url) = &config.bank_api.base_url {
        let reachable = validate_bank_api(base_url, config.bank_api.timeout_secs).await;
        if let Err(e) = &reachable {
            report.errors.push(format!("Bank API: {}", e));
        }
        report.bank_api = Some(reachable.is_ok());
    }

    Ok(report)
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.pix.pix_key.is_none() {
        anyhow::bail!("PIX_KEY is not set; payment codes cannot be generated");
    }
    if config.webhook.secret.is_none() {
        anyhow::bail!("PIX_WEBHOOK_SECRET is not set; every bank webhook will be rejected");
    }
    if config.pix.expiration_minutes <= 0 {
        anyhow::bail!("PIX_EXPIRATION_MINUTES must be positive");
    }

    if let Some(url) = &config.bank_api.base_url {
        url::Url::parse(url).context("PIX_BANK_API_URL is not a valid URL")?;
    }
    if let Some(url) = &config.checkout.api_url {
        url::Url::parse(url).context("CHECKOUT_API_URL is not a valid URL")?;
    }

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

/// Any HTTP answer below 500 counts as reachable; the root path of a bank
/// API rarely serves anything useful.
async fn validate_bank_api(base_url: &str, timeout_secs: u64) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;

    let response = client
        .get(base_url)
        .send()
        .await
        .context("Failed to connect to bank API")?;

    if response.status().is_server_error() {
        anyhow::bail!("Bank API returned status: {}", response.status());
    }

    Ok(())
}
