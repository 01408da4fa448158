use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::json;

use crate::domain::money::deserialize_decimal;
use crate::error::AppError;
use crate::pix::format_amount;
use crate::services::checkout::{CheckoutEventOutcome, NewCheckoutSession};
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "checkout-signature";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateCheckoutSessionRequest {
    #[serde(deserialize_with = "deserialize_decimal")]
    pub amount: BigDecimal,
    #[serde(default, alias = "bookingId")]
    pub order_reference: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateCheckoutSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state
        .checkout
        .create_session(NewCheckoutSession {
            amount: request.amount,
            order_reference: request.order_reference,
            description: request.description,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "transactionId": tx.id,
            "sessionId": tx.provider_reference,
            "url": tx.encoded_payload,
            "amount": format_amount(&tx.amount),
            "expiresAt": tx.expires_at,
        })),
    ))
}

pub async fn checkout_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state.checkout.handle_webhook(&body, signature).await?;

    let body = match outcome {
        CheckoutEventOutcome::Applied(outcome) => {
            let tx = outcome.transaction();
            json!({
                "success": true,
                "received": true,
                "transactionId": tx.id,
                "status": tx.status,
            })
        }
        CheckoutEventOutcome::Ignored { event_type } => json!({
            "success": true,
            "received": true,
            "ignored": event_type,
        }),
    };

    Ok(Json(body))
}
