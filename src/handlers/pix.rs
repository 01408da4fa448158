use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::domain::money::deserialize_decimal;
use crate::domain::TransactionStatus;
use crate::error::AppError;
use crate::pix::format_amount;
use crate::services::payments::NewPixPayment;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreatePixPaymentRequest {
    #[serde(deserialize_with = "deserialize_decimal")]
    pub amount: BigDecimal,
    #[serde(default, alias = "bookingId")]
    pub order_reference: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Malformed ids are reported the same way as unknown ones.
pub(crate) fn parse_transaction_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::NotFound(raw.to_string()))
}

pub async fn create_pix_payment(
    State(state): State<AppState>,
    Json(request): Json<CreatePixPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state
        .payments
        .create_pix_payment(NewPixPayment {
            amount: request.amount,
            order_reference: request.order_reference,
            description: request.description,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "pixTransactionId": tx.id,
            "brCode": tx.encoded_payload,
            "amount": format_amount(&tx.amount),
            "orderReference": tx.order_reference,
            "expiresAt": tx.expires_at,
            "message": "PIX payment created",
        })),
    ))
}

pub async fn get_pix_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_transaction_id(&id)?;
    let check = state.poller.check_status(id).await?;
    let tx = &check.transaction;

    let expires_at = (tx.status == TransactionStatus::Pending).then_some(tx.expires_at);

    Ok(Json(json!({
        "success": true,
        "pixTransactionId": tx.id,
        "status": tx.status,
        "amount": format_amount(&tx.amount),
        "expiresAt": expires_at,
        "confirmedAt": tx.confirmed_at,
        "externalConfirmationId": tx.external_confirmation_id,
        "verification": check.source.as_str(),
        "externalCheckSkipped": check.source.external_check_skipped(),
    })))
}
