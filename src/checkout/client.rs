use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use subtle::ConstantTimeEq;

use super::CheckoutError;
use crate::config::CheckoutConfig;
use crate::services::webhook_verifier::hmac_hex;

/// Signed events older than this are treated as replays.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, Serialize)]
pub struct SessionRequest {
    pub client_reference_id: String,
    /// Minor units (centavos).
    pub amount: i64,
    pub currency: String,
    pub description: Option<String>,
    pub booking_id: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: SessionObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionObject {
    pub id: String,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub payment_intent: Option<String>,
}

/// Client for the card processor's hosted checkout API.
#[derive(Clone)]
pub struct CheckoutClient {
    client: Client,
    api_url: Option<String>,
    api_key: Option<String>,
    webhook_secret: Option<String>,
}

impl CheckoutClient {
    pub fn new(config: &CheckoutConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            webhook_secret: config.webhook_secret.clone().filter(|s| !s.is_empty()),
        }
    }

    pub fn sessions_configured(&self) -> bool {
        self.api_url.is_some() && self.api_key.is_some()
    }

    pub async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<CheckoutSession, CheckoutError> {
        let (api_url, api_key) = match (&self.api_url, &self.api_key) {
            (Some(url), Some(key)) => (url, key),
            _ => return Err(CheckoutError::NotConfigured),
        };

        let mut metadata = HashMap::new();
        if let Some(booking_id) = &request.booking_id {
            metadata.insert("bookingId", booking_id.as_str());
        }

        let body = json!({
            "mode": "payment",
            "client_reference_id": request.client_reference_id,
            "amount": request.amount,
            "currency": request.currency,
            "description": request.description,
            "metadata": metadata,
            "success_url": request.success_url,
            "cancel_url": request.cancel_url,
        });

        let url = format!("{}/v1/checkout/sessions", api_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CheckoutError::Status {
                status: response.status().as_u16(),
            });
        }

        Ok(response.json::<CheckoutSession>().await?)
    }

    /// Verifies a `t=<unix>,v1=<hex>` header over `"<t>.<payload>"`.
    ///
    /// A header that cannot be parsed is an error; a well-formed header that
    /// does not match, or is too old, is `Ok(false)`.
    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        header: &str,
    ) -> Result<bool, CheckoutError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(CheckoutError::MalformedSignature)?;
        if signatures.is_empty() {
            return Err(CheckoutError::MalformedSignature);
        }
        let issued_at: i64 = timestamp
            .parse()
            .map_err(|_| CheckoutError::MalformedSignature)?;

        let secret = match &self.webhook_secret {
            Some(secret) => secret,
            None => {
                tracing::error!("Checkout webhook secret is not configured; rejecting event");
                return Ok(false);
            }
        };

        if (Utc::now().timestamp() - issued_at).abs() > SIGNATURE_TOLERANCE_SECS {
            return Ok(false);
        }

        let mut signed = Vec::with_capacity(timestamp.len() + 1 + payload.len());
        signed.extend_from_slice(timestamp.as_bytes());
        signed.push(b'.');
        signed.extend_from_slice(payload);

        let expected = match hmac_hex(secret.as_bytes(), &signed) {
            Some(expected) => expected,
            None => return Ok(false),
        };

        Ok(signatures
            .iter()
            .any(|candidate| bool::from(expected.as_bytes().ct_eq(candidate.as_bytes()))))
    }
}
