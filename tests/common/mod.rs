#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use pix_settlement::adapters::{InMemoryBookingLedger, InMemoryTransactionStore};
use pix_settlement::config::{
    BankApiConfig, CheckoutConfig, Config, LogFormat, PixConfig, SweepConfig, WebhookConfig,
};
use pix_settlement::domain::{PaymentRail, PaymentTransaction};
use pix_settlement::services::webhook_verifier::hmac_hex;
use pix_settlement::{create_app, AppState};
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_pix_integration";
pub const CHECKOUT_SECRET: &str = "whsec_checkout_integration";
pub const ADMIN_KEY: &str = "admin-test-key";

pub fn test_config() -> Config {
    Config {
        server_port: 0,
        database_url: "postgres://unused".to_string(),
        database_max_connections: 1,
        log_format: LogFormat::Pretty,
        cors_allowed_origins: Vec::new(),
        admin_api_key: Some(ADMIN_KEY.to_string()),
        pix: PixConfig {
            pix_key: Some("limpezapro@pix.com".to_string()),
            merchant_name: "LIMPEZA PRO".to_string(),
            merchant_city: "SAO PAULO".to_string(),
            merchant_category_code: "7230".to_string(),
            expiration_minutes: 30,
        },
        webhook: WebhookConfig {
            secret: Some(WEBHOOK_SECRET.to_string()),
            tolerance_secs: 300,
        },
        bank_api: BankApiConfig {
            base_url: None,
            api_key: None,
            timeout_secs: 5,
        },
        checkout: CheckoutConfig {
            api_url: None,
            api_key: None,
            webhook_secret: Some(CHECKOUT_SECRET.to_string()),
            success_url: "http://localhost/checkout/success".to_string(),
            cancel_url: "http://localhost/checkout/cancel".to_string(),
        },
        sweep: SweepConfig {
            interval_secs: 0,
            expiring_window_minutes: 5,
            expired_retention_days: 30,
            reconciliation_retention_days: 30,
            max_failed_polls: 3,
        },
    }
}

pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    pub store: InMemoryTransactionStore,
    pub bookings: InMemoryBookingLedger,
    pub state: AppState,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends a bank webhook signed with the test secret and a fresh timestamp.
    pub async fn send_pix_webhook(&self, body: &str) -> reqwest::Response {
        self.client
            .post(self.url("/webhooks/pix"))
            .header("content-type", "application/json")
            .header("x-bank-signature", sign(body))
            .header("x-bank-timestamp", Utc::now().timestamp().to_string())
            .body(body.to_string())
            .send()
            .await
            .unwrap()
    }

    pub fn admin(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(ADMIN_KEY)
            .header("x-operator-id", "ana.operator")
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

/// Serves the real router over in-memory storage on an ephemeral port.
pub async fn spawn_app_with(config: Config) -> TestApp {
    let store = InMemoryTransactionStore::new();
    let bookings = InMemoryBookingLedger::new();
    let state = AppState::new(config, Arc::new(store.clone()), Arc::new(bookings.clone()));
    let app = create_app(state.clone());

    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], 0));
    let server = axum::Server::bind(&addr).serve(app.into_make_service());
    let actual_addr = server.local_addr();

    tokio::spawn(async move {
        server.await.unwrap();
    });

    TestApp {
        base_url: format!("http://{}", actual_addr),
        client: reqwest::Client::new(),
        store,
        bookings,
        state,
    }
}

pub fn sign(body: &str) -> String {
    hmac_hex(WEBHOOK_SECRET.as_bytes(), body.as_bytes()).unwrap()
}

pub fn checkout_signature(body: &str) -> String {
    let t = Utc::now().timestamp();
    let signed = format!("{}.{}", t, body);
    let v1 = hmac_hex(CHECKOUT_SECRET.as_bytes(), signed.as_bytes()).unwrap();
    format!("t={},v1={}", t, v1)
}

/// A pending PIX row, `ttl_minutes` from now (negative for overdue).
pub fn pending_pix(amount: &str, reference: Option<&str>, ttl_minutes: i64) -> PaymentTransaction {
    PaymentTransaction::new(
        Uuid::new_v4(),
        PaymentRail::Pix,
        BigDecimal::from_str(amount).unwrap(),
        reference.map(str::to_string),
        "000201".to_string(),
        None,
        Duration::minutes(ttl_minutes),
    )
}
