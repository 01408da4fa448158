pub mod adapters;
pub mod bank;
pub mod checkout;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod pix;
pub mod ports;
pub mod services;
pub mod startup;
pub mod validation;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::bank::BankApiClient;
use crate::config::Config;
use crate::ports::{BookingLedger, TransactionStore};
use crate::services::{
    CheckoutService, PaymentService, ReconciliationSweeper, SettlementService, StatusPoller,
    WebhookVerifier,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn TransactionStore>,
    pub payments: PaymentService,
    pub settlement: SettlementService,
    pub poller: StatusPoller,
    pub sweeper: ReconciliationSweeper,
    pub verifier: WebhookVerifier,
    pub checkout: CheckoutService,
}

impl AppState {
    /// Wires every service from one config and a pair of storage adapters.
    pub fn new(
        config: Config,
        store: Arc<dyn TransactionStore>,
        bookings: Arc<dyn BookingLedger>,
    ) -> Self {
        let config = Arc::new(config);
        let settlement = SettlementService::new(store.clone(), bookings);
        let bank = BankApiClient::from_config(&config.bank_api);
        let poller = StatusPoller::new(store.clone(), settlement.clone(), bank);
        let sweeper = ReconciliationSweeper::new(
            store.clone(),
            settlement.clone(),
            poller.clone(),
            config.sweep.clone(),
        );

        Self {
            payments: PaymentService::new(store.clone(), config.pix.clone()),
            verifier: WebhookVerifier::from_config(&config.webhook),
            checkout: CheckoutService::new(
                store.clone(),
                settlement.clone(),
                config.checkout.clone(),
            ),
            settlement,
            poller,
            sweeper,
            store,
            config,
        }
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if config.cors_allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

pub fn create_app(state: AppState) -> Router {
    let admin = Router::new()
        .route("/pix/expiring", get(handlers::admin::list_expiring))
        .route("/pix/cleanup", post(handlers::admin::cleanup_expired))
        .route("/pix/resync", post(handlers::admin::resync_bookings))
        .route("/pix/sweep", post(handlers::admin::run_sweep))
        .route(
            "/pix/reconciliation/history",
            get(handlers::admin::reconciliation_history),
        )
        .route(
            "/pix/reconciliation/stats",
            get(handlers::admin::reconciliation_stats),
        )
        .route("/pix/:id", get(handlers::admin::get_transaction))
        .route("/pix/:id/confirm", post(handlers::admin::confirm_transaction))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::operator_auth,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/pix/payments", post(handlers::pix::create_pix_payment))
        .route("/pix/payments/:id", get(handlers::pix::get_pix_status))
        .route("/webhooks/pix", post(handlers::webhook::pix_webhook))
        .route("/checkout/sessions", post(handlers::checkout::create_session))
        .route("/webhooks/checkout", post(handlers::checkout::checkout_webhook))
        .nest("/admin", admin)
        .layer(axum_middleware::from_fn(
            middleware::request_logger_middleware,
        ))
        .layer(cors_layer(&state.config))
        .with_state(state)
}
