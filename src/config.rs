use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be 'pretty' or 'json', got '{}'", other),
        }
    }
}

/// Merchant identity stamped into every BR Code.
#[derive(Debug, Deserialize, Clone)]
pub struct PixConfig {
    pub pix_key: Option<String>,
    pub merchant_name: String,
    pub merchant_city: String,
    pub merchant_category_code: String,
    pub expiration_minutes: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    pub secret: Option<String>,
    pub tolerance_secs: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BankApiConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CheckoutConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SweepConfig {
    /// Zero disables the background loop; `sweep` and the admin routes still work.
    pub interval_secs: u64,
    pub expiring_window_minutes: i64,
    pub expired_retention_days: i64,
    pub reconciliation_retention_days: i64,
    /// Failed bank polls after which an overdue row is expired unverified.
    pub max_failed_polls: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub log_format: LogFormat,
    pub cors_allowed_origins: Vec<String>,
    pub admin_api_key: Option<String>,
    pub pix: PixConfig,
    pub webhook: WebhookConfig,
    pub bank_api: BankApiConfig,
    pub checkout: CheckoutConfig,
    pub sweep: SweepConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: parse_var("SERVER_PORT", 3000)?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 5)?,
            log_format: env::var("LOG_FORMAT").unwrap_or_default().parse()?,
            cors_allowed_origins: parse_list(&env::var("CORS_ALLOWED_ORIGINS").unwrap_or_default()),
            admin_api_key: optional_var("ADMIN_API_KEY"),
            pix: PixConfig {
                pix_key: optional_var("PIX_KEY"),
                merchant_name: env::var("PIX_MERCHANT_NAME").unwrap_or_else(|_| "MERCHANT".to_string()),
                merchant_city: env::var("PIX_MERCHANT_CITY").unwrap_or_else(|_| "SAO PAULO".to_string()),
                merchant_category_code: env::var("PIX_MERCHANT_CATEGORY_CODE")
                    .unwrap_or_else(|_| "7230".to_string()),
                expiration_minutes: parse_var("PIX_EXPIRATION_MINUTES", 30)?,
            },
            webhook: WebhookConfig {
                secret: optional_var("PIX_WEBHOOK_SECRET"),
                tolerance_secs: parse_var("PIX_WEBHOOK_TOLERANCE_SECS", 300)?,
            },
            bank_api: BankApiConfig {
                base_url: optional_var("PIX_BANK_API_URL"),
                api_key: optional_var("PIX_BANK_API_KEY"),
                timeout_secs: parse_var("PIX_BANK_API_TIMEOUT_SECS", 10)?,
            },
            checkout: CheckoutConfig {
                api_url: optional_var("CHECKOUT_API_URL"),
                api_key: optional_var("CHECKOUT_API_KEY"),
                webhook_secret: optional_var("CHECKOUT_WEBHOOK_SECRET"),
                success_url: env::var("CHECKOUT_SUCCESS_URL")
                    .unwrap_or_else(|_| "http://localhost:3000/checkout/success".to_string()),
                cancel_url: env::var("CHECKOUT_CANCEL_URL")
                    .unwrap_or_else(|_| "http://localhost:3000/checkout/cancel".to_string()),
            },
            sweep: SweepConfig {
                interval_secs: parse_var("SWEEP_INTERVAL_SECS", 0)?,
                expiring_window_minutes: parse_var("SWEEP_EXPIRING_WINDOW_MINUTES", 5)?,
                expired_retention_days: parse_var("EXPIRED_RETENTION_DAYS", 30)?,
                reconciliation_retention_days: parse_var("RECONCILIATION_RETENTION_DAYS", 30)?,
                max_failed_polls: parse_var("SWEEP_MAX_FAILED_POLLS", 3)?,
            },
        })
    }
}

/// Unset and blank values are both treated as absent.
fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_var(name) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", name, raw)),
        None => Ok(default),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}
