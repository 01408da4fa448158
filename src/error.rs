use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::bank::BankApiError;
use crate::checkout::CheckoutError;
use crate::pix::PixCodeError;
use crate::ports::RepositoryError;
use crate::services::payments::PaymentError;
use crate::services::polling::PollError;
use crate::services::settlement::SettlementError;
use crate::services::webhook_verifier::WebhookAuthError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Amount mismatch: expected {expected}, received {received}")]
    AmountMismatch { expected: String, received: String },

    #[error("Transaction not found: {0}")]
    NotFound(String),

    /// Known, but in a terminal state that rejects the request.
    #[error("Transaction already finalized: {0}")]
    Finalized(String),

    #[error("Bank API error: {0}")]
    BankApi(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::InvalidSignature(_)
            | AppError::AmountMismatch { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Finalized(_) => StatusCode::CONFLICT,
            AppError::BankApi(_) => StatusCode::BAD_GATEWAY,
            AppError::Configuration(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::InvalidSignature(_) => "INVALID_SIGNATURE",
            AppError::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            AppError::NotFound(_) | AppError::Finalized(_) => "PIX_NOT_FOUND",
            AppError::BankApi(_) => "BANK_API_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Text returned to the caller. Internal details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::Configuration(_) => "Service is not configured for this operation".to_string(),
            AppError::BankApi(_) => "Bank API request failed".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            AppError::Internal(_) | AppError::Configuration(_) => {
                tracing::error!(code = self.code(), "{}", self)
            }
            AppError::BankApi(_) => tracing::warn!(code = self.code(), "{}", self),
            _ => tracing::debug!(code = self.code(), "{}", self),
        }

        let body = Json(json!({
            "success": false,
            "error": self.public_message(),
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(id) => AppError::NotFound(id),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<PixCodeError> for AppError {
    fn from(e: PixCodeError) -> Self {
        match e {
            PixCodeError::MissingPixKey => AppError::Configuration(e.to_string()),
            other => AppError::Validation(other.to_string()),
        }
    }
}

impl From<BankApiError> for AppError {
    fn from(e: BankApiError) -> Self {
        AppError::BankApi(e.to_string())
    }
}

impl From<WebhookAuthError> for AppError {
    fn from(e: WebhookAuthError) -> Self {
        match e {
            WebhookAuthError::MissingHeader(_) | WebhookAuthError::InvalidTimestamp => {
                AppError::Validation(e.to_string())
            }
            WebhookAuthError::StaleTimestamp | WebhookAuthError::InvalidSignature => {
                AppError::InvalidSignature(e.to_string())
            }
        }
    }
}

impl From<SettlementError> for AppError {
    fn from(e: SettlementError) -> Self {
        match e {
            SettlementError::NotFound(id) => AppError::NotFound(id.to_string()),
            SettlementError::Finalized { id, status } => {
                AppError::Finalized(format!("{} is {}", id, status))
            }
            SettlementError::WrongRail { id, rail } => {
                AppError::Finalized(format!("{} is a {} transaction", id, rail.as_str()))
            }
            SettlementError::AmountMismatch {
                expected, received, ..
            } => AppError::AmountMismatch {
                expected: expected.to_string(),
                received: received.to_string(),
            },
            SettlementError::Propagation { .. } | SettlementError::Repository(_) => {
                AppError::Internal(e.to_string())
            }
        }
    }
}

impl From<PollError> for AppError {
    fn from(e: PollError) -> Self {
        match e {
            PollError::NotFound(id) => AppError::NotFound(id.to_string()),
            PollError::Bank(e) => e.into(),
            PollError::Settlement(e) => e.into(),
            PollError::Repository(e) => e.into(),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::Validation(e) => e.into(),
            PaymentError::Code(e) => e.into(),
            PaymentError::Repository(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::NotConfigured => AppError::Configuration(e.to_string()),
            CheckoutError::Request(_) | CheckoutError::Status { .. } => {
                AppError::BankApi(e.to_string())
            }
            CheckoutError::MalformedSignature | CheckoutError::InvalidEvent(_) => {
                AppError::Validation(e.to_string())
            }
            CheckoutError::InvalidSignature => AppError::InvalidSignature(e.to_string()),
            CheckoutError::Validation(e) => e.into(),
            CheckoutError::Settlement(e) => e.into(),
            CheckoutError::Repository(e) => AppError::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use uuid::Uuid;

    #[test]
    fn test_status_codes_and_codes() {
        let cases = [
            (AppError::Validation("x".into()), StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            (AppError::InvalidSignature("x".into()), StatusCode::BAD_REQUEST, "INVALID_SIGNATURE"),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND, "PIX_NOT_FOUND"),
            (AppError::Finalized("x".into()), StatusCode::CONFLICT, "PIX_NOT_FOUND"),
            (AppError::BankApi("x".into()), StatusCode::BAD_GATEWAY, "BANK_API_ERROR"),
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        ];
        for (error, status, code) in cases {
            assert_eq!(error.status_code(), status);
            assert_eq!(error.code(), code);
        }
    }

    #[test]
    fn test_missing_pix_key_is_configuration_error() {
        let error: AppError = PixCodeError::MissingPixKey.into();
        assert_eq!(error.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_amount_mismatch_mapping() {
        let error: AppError = SettlementError::AmountMismatch {
            id: Uuid::new_v4(),
            expected: BigDecimal::from(150),
            received: BigDecimal::from(15),
        }
        .into();
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(error.code(), "AMOUNT_MISMATCH");
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let error = AppError::Internal("connection refused at 10.0.0.5".into());
        assert_eq!(error.public_message(), "Internal server error");
    }

    #[tokio::test]
    async fn test_error_response_status() {
        let response = AppError::NotFound("abc".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
