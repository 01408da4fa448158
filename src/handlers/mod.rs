pub mod admin;
pub mod checkout;
pub mod pix;
pub mod webhook;

use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub store: String,
    pub bank_api: String,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store_status = match state.store.ping().await {
        Ok(_) => "connected",
        Err(e) => {
            tracing::error!("Health check store ping failed: {}", e);
            "disconnected"
        }
    };

    let bank_api = state
        .poller
        .bank_client()
        .map(|client| client.circuit_state())
        .unwrap_or_else(|| "not_configured".to_string());

    let healthy = store_status == "connected";
    let health_response = HealthStatus {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: store_status.to_string(),
        bank_api,
    };

    // Return 503 if storage is down, 200 otherwise
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health_response))
}
