use axum::{
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::error::AppError;
use crate::validation::{sanitize_string, validate_operator_id};
use crate::AppState;

pub const OPERATOR_HEADER: &str = "x-operator-id";

/// Identity of the human behind an operator request, recorded on every
/// manual override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator(pub String);

/// Gate for `/admin`: bearer `ADMIN_API_KEY` plus an `x-operator-id`.
/// With no key configured every request is refused.
pub async fn operator_auth<B>(
    State(state): State<AppState>,
    mut req: Request<B>,
    next: Next<B>,
) -> Result<Response, AppError> {
    let expected = state
        .config
        .admin_api_key
        .as_deref()
        .ok_or_else(|| AppError::Unauthorized("operator access is disabled".to_string()))?;

    let provided = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .unwrap_or("");

    if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        tracing::warn!(uri = %req.uri(), "Rejected operator request with invalid credentials");
        return Err(AppError::Unauthorized("invalid admin credentials".to_string()));
    }

    let operator = req
        .headers()
        .get(OPERATOR_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(sanitize_string)
        .unwrap_or_default();
    validate_operator_id(&operator)
        .map_err(|_| AppError::Unauthorized(format!("missing or invalid {} header", OPERATOR_HEADER)))?;

    req.extensions_mut().insert(Operator(operator));
    Ok(next.run(req).await)
}
