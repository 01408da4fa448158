//! Card-network hosted checkout: the processor's REST API and its signed
//! webhooks. Settlement goes through the same state machine as PIX.

pub mod client;

pub use client::{CheckoutClient, CheckoutEvent, CheckoutSession, SessionObject, SessionRequest};

use thiserror::Error;

use crate::ports::RepositoryError;
use crate::services::settlement::SettlementError;
use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("card checkout is not configured")]
    NotConfigured,
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("checkout API returned status {status}")]
    Status { status: u16 },
    #[error("malformed checkout-signature header")]
    MalformedSignature,
    #[error("checkout signature verification failed")]
    InvalidSignature,
    #[error("invalid checkout event: {0}")]
    InvalidEvent(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
