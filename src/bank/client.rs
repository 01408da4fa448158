use bigdecimal::BigDecimal;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::status::{map_provider_status, ProviderStatus};
use crate::config::BankApiConfig;
use crate::domain::money::deserialize_optional_decimal;

#[derive(Error, Debug)]
pub enum BankApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("bank API returned status {status}")]
    Status { status: u16 },
    #[error("bank has no record of the transaction")]
    NotFound,
    #[error("invalid bank API URL: {0}")]
    InvalidUrl(String),
    #[error("unmapped provider status '{0}'")]
    UnmappedStatus(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

impl BankApiError {
    /// Whether the error says something about the bank's health. A 404 or
    /// an unknown status is an answer, not an outage.
    pub fn is_outage(&self) -> bool {
        !matches!(self, BankApiError::NotFound | BankApiError::UnmappedStatus(_))
    }
}

/// Body of `GET /pix/transactions/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    status: String,
    #[serde(default, alias = "endToEndId", alias = "e2eId")]
    bank_transaction_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    amount: Option<BigDecimal>,
    #[serde(default)]
    bank_name: Option<String>,
    #[serde(default)]
    sender_account: Option<String>,
}

/// A provider response after its status has been mapped.
#[derive(Debug, Clone, PartialEq)]
pub struct BankStatus {
    pub status: ProviderStatus,
    pub raw_status: String,
    pub bank_transaction_id: Option<String>,
    pub amount: Option<BigDecimal>,
    pub bank_name: Option<String>,
    pub sender_account: Option<String>,
}

/// HTTP client for the bank's PIX status API.
///
/// Failures are never retried here; the caller (a re-poll or the next sweep)
/// decides when to ask again. Consecutive failures open the breaker so a
/// struggling bank is not hammered by every status request.
#[derive(Clone)]
pub struct BankApiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl BankApiClient {
    pub fn new(base_url: String, api_key: Option<String>, timeout_secs: u64) -> Self {
        Self::with_circuit_breaker(base_url, api_key, timeout_secs, 5, 60)
    }

    /// Builds a client from config; `None` when no bank endpoint is set.
    pub fn from_config(config: &BankApiConfig) -> Option<Self> {
        config
            .base_url
            .as_ref()
            .map(|url| Self::new(url.clone(), config.api_key.clone(), config.timeout_secs))
    }

    pub fn with_circuit_breaker(
        base_url: String,
        api_key: Option<String>,
        timeout_secs: u64,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        BankApiClient {
            client,
            base_url,
            api_key,
            circuit_breaker,
        }
    }

    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn status_url(&self, reference: &str) -> Result<Url, BankApiError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| BankApiError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| BankApiError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(&["pix", "transactions", reference]);
        Ok(url)
    }

    /// Asks the bank for the current state of one transaction.
    pub async fn fetch_status(&self, reference: &str) -> Result<BankStatus, BankApiError> {
        let url = self.status_url(reference)?;
        let client = self.client.clone();
        let api_key = self.api_key.clone();

        let result = self
            .circuit_breaker
            .call_with(|e: &BankApiError| e.is_outage(), async move {
                let mut request = client.get(url).header("accept", "application/json");
                if let Some(key) = api_key {
                    request = request.bearer_auth(key);
                }

                let response = request.send().await?;
                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    return Err(BankApiError::NotFound);
                }
                if !response.status().is_success() {
                    return Err(BankApiError::Status {
                        status: response.status().as_u16(),
                    });
                }

                let body = response.json::<StatusResponse>().await?;
                Ok(body)
            })
            .await;

        let body = match result {
            Ok(body) => body,
            Err(FailsafeError::Rejected) => {
                return Err(BankApiError::CircuitBreakerOpen(
                    "bank API circuit breaker is open".to_string(),
                ))
            }
            Err(FailsafeError::Inner(e)) => return Err(e),
        };

        let status = map_provider_status(&body.status).ok_or_else(|| {
            tracing::error!(provider_status = %body.status, "Bank returned an unmapped status");
            BankApiError::UnmappedStatus(body.status.clone())
        })?;

        Ok(BankStatus {
            status,
            raw_status: body.status,
            bank_transaction_id: body.bank_transaction_id,
            amount: body.amount,
            bank_name: body.bank_name,
            sender_account: body.sender_account,
        })
    }
}
