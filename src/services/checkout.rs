use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::settlement::{SettlementOutcome, SettlementService};
use crate::checkout::{CheckoutClient, CheckoutError, CheckoutEvent, SessionRequest};
use crate::config::CheckoutConfig;
use crate::domain::money::from_minor_units;
use crate::domain::{Confirmation, PaymentRail, PaymentTransaction};
use crate::pix::format_amount;
use crate::ports::TransactionStore;
use crate::validation::{self, ValidationError};

/// Hosted sessions stay open for a day on the processor side.
const SESSION_TTL_HOURS: i64 = 24;

pub const EVENT_COMPLETED: &str = "checkout.session.completed";
pub const EVENT_EXPIRED: &str = "checkout.session.expired";
pub const EVENT_ASYNC_FAILED: &str = "checkout.session.async_payment_failed";

#[derive(Debug, Clone)]
pub struct NewCheckoutSession {
    pub amount: BigDecimal,
    pub order_reference: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutEventOutcome {
    Applied(SettlementOutcome),
    Ignored { event_type: String },
}

/// Minor units for the processor API. Expects a validated two-decimal amount.
fn to_minor_units(amount: &BigDecimal) -> Result<i64, ValidationError> {
    format_amount(amount)
        .replace('.', "")
        .parse::<i64>()
        .map_err(|_| ValidationError::new("amount", "does not fit in minor units"))
}

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn TransactionStore>,
    settlement: SettlementService,
    client: CheckoutClient,
    config: CheckoutConfig,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        settlement: SettlementService,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            store,
            settlement,
            client: CheckoutClient::new(&config),
            config,
        }
    }

    pub async fn create_session(
        &self,
        request: NewCheckoutSession,
    ) -> Result<PaymentTransaction, CheckoutError> {
        if !self.client.sessions_configured() {
            return Err(CheckoutError::NotConfigured);
        }

        validation::validate_payment_amount(&request.amount)?;
        if let Some(reference) = &request.order_reference {
            validation::validate_order_reference(reference)?;
        }

        let id = Uuid::new_v4();
        let session = self
            .client
            .create_session(&SessionRequest {
                client_reference_id: id.to_string(),
                amount: to_minor_units(&request.amount)?,
                currency: "brl".to_string(),
                description: request.description.clone(),
                booking_id: request.order_reference.clone(),
                success_url: self.config.success_url.clone(),
                cancel_url: self.config.cancel_url.clone(),
            })
            .await?;

        let tx = PaymentTransaction::new(
            id,
            PaymentRail::Card,
            request.amount.with_scale(2),
            request.order_reference,
            session.url,
            Some(session.id),
            Duration::hours(SESSION_TTL_HOURS),
        );
        let stored = self.store.insert(&tx).await?;

        info!(
            pix_transaction_id = %stored.id,
            session_id = ?stored.provider_reference,
            amount = %stored.amount,
            "Card checkout session created"
        );

        Ok(stored)
    }

    /// Authenticates and applies one processor event.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<CheckoutEventOutcome, CheckoutError> {
        let header = signature_header.ok_or(CheckoutError::MalformedSignature)?;
        if !self.client.verify_webhook_signature(payload, header)? {
            warn!("Checkout webhook signature rejected");
            return Err(CheckoutError::InvalidSignature);
        }

        let event: CheckoutEvent = serde_json::from_slice(payload)
            .map_err(|e| CheckoutError::InvalidEvent(e.to_string()))?;

        let session = &event.data.object;
        let tx_id = match session.client_reference_id.as_deref() {
            Some(raw) => Uuid::from_str(raw)
                .map_err(|_| CheckoutError::InvalidEvent("client_reference_id is not a UUID".to_string()))?,
            None if is_settlement_event(&event.event_type) => {
                return Err(CheckoutError::InvalidEvent("missing client_reference_id".to_string()))
            }
            None => {
                return Ok(CheckoutEventOutcome::Ignored {
                    event_type: event.event_type,
                })
            }
        };

        info!(
            pix_transaction_id = %tx_id,
            event_id = %event.id,
            event_type = %event.event_type,
            "Checkout event received"
        );

        let outcome = match event.event_type.as_str() {
            EVENT_COMPLETED => {
                let amount = session.amount_total.map(from_minor_units);
                let confirmation = Confirmation {
                    external_confirmation_id: session
                        .payment_intent
                        .clone()
                        .or_else(|| Some(session.id.clone())),
                    counterparty_account: None,
                    counterparty_bank: None,
                    confirmed_by: Some("checkout-webhook".to_string()),
                };
                self.settlement
                    .confirm_on_rail(tx_id, PaymentRail::Card, amount.as_ref(), confirmation)
                    .await?
            }
            EVENT_EXPIRED | EVENT_ASYNC_FAILED => {
                let reason = format!("checkout event {}", event.event_type);
                self.settlement.fail(tx_id, &reason).await?
            }
            _ => {
                return Ok(CheckoutEventOutcome::Ignored {
                    event_type: event.event_type,
                })
            }
        };

        Ok(CheckoutEventOutcome::Applied(outcome))
    }
}

fn is_settlement_event(event_type: &str) -> bool {
    matches!(event_type, EVENT_COMPLETED | EVENT_EXPIRED | EVENT_ASYNC_FAILED)
}
