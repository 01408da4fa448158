use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::pix::parse_transaction_id;
use crate::domain::money::deserialize_decimal;
use crate::domain::{Confirmation, PaymentRail};
use crate::error::AppError;
use crate::services::settlement::SettlementOutcome;
use crate::AppState;

/// Header names accepted for the bank signature, preferred first.
pub const SIGNATURE_HEADERS: &[&str] = &["x-bank-signature", "signature"];
pub const TIMESTAMP_HEADERS: &[&str] = &["x-bank-timestamp", "timestamp"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixWebhookPayload {
    pub pix_transaction_id: String,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub amount: BigDecimal,
    #[serde(default)]
    pub bank_transaction_id: Option<String>,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub sender_account: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
}

fn first_header<'a>(headers: &'a HeaderMap, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
}

/// Bank confirmation push. The raw body is authenticated before it is
/// parsed, and nothing is written unless authentication passes.
pub async fn pix_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = first_header(&headers, SIGNATURE_HEADERS);
    let timestamp = first_header(&headers, TIMESTAMP_HEADERS);

    if let Err(e) = state.verifier.authenticate(&body, signature, timestamp, Utc::now()) {
        tracing::warn!(error = %e, "PIX webhook rejected");
        return Err(e.into());
    }

    let payload: PixWebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("invalid webhook body: {}", e)))?;
    let id = parse_transaction_id(&payload.pix_transaction_id)?;

    let confirmation = Confirmation {
        external_confirmation_id: payload.bank_transaction_id.clone(),
        counterparty_account: payload.sender_account.clone(),
        counterparty_bank: payload.bank_name.clone(),
        confirmed_by: Some("bank-webhook".to_string()),
    };

    let outcome = state
        .settlement
        .confirm_on_rail(id, PaymentRail::Pix, Some(&payload.amount), confirmation)
        .await?;

    let message = match &outcome {
        SettlementOutcome::Settled(_) => "Payment confirmed",
        _ => "Payment already confirmed",
    };
    let tx = outcome.into_transaction();

    if let (Some(declared), Some(stored)) = (&payload.order_id, &tx.order_reference) {
        if declared != stored {
            tracing::warn!(
                pix_transaction_id = %tx.id,
                declared_order = %declared,
                stored_order = %stored,
                "Webhook orderId differs from stored reference; stored reference used"
            );
        }
    }

    Ok(Json(json!({
        "success": true,
        "message": message,
        "pixTransactionId": tx.id,
        "bookingId": tx.order_reference,
    })))
}
