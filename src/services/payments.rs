use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::Duration;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::config::PixConfig;
use crate::domain::{PaymentRail, PaymentTransaction};
use crate::pix::{self, BrCode, PixCodeError};
use crate::ports::{RepositoryError, TransactionStore};
use crate::validation::{self, ValidationError};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Code(#[from] PixCodeError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone)]
pub struct NewPixPayment {
    pub amount: BigDecimal,
    pub order_reference: Option<String>,
    pub description: Option<String>,
}

/// Issues PIX payment requests: validates, encodes the BR Code and stores
/// the `pending` row.
#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn TransactionStore>,
    pix: PixConfig,
}

impl PaymentService {
    pub fn new(store: Arc<dyn TransactionStore>, pix: PixConfig) -> Self {
        Self { store, pix }
    }

    pub fn pix_config(&self) -> &PixConfig {
        &self.pix
    }

    /// Encodes a BR Code with the configured merchant identity.
    pub fn encode_code(
        &self,
        amount: &BigDecimal,
        order_reference: Option<&str>,
        description: Option<&str>,
    ) -> Result<String, PixCodeError> {
        pix::encode(&BrCode {
            pix_key: self.pix.pix_key.as_deref(),
            amount,
            merchant_name: &self.pix.merchant_name,
            merchant_city: &self.pix.merchant_city,
            merchant_category_code: &self.pix.merchant_category_code,
            description,
            order_reference,
        })
    }

    pub async fn create_pix_payment(
        &self,
        request: NewPixPayment,
    ) -> Result<PaymentTransaction, PaymentError> {
        validation::validate_payment_amount(&request.amount)?;

        let order_reference = request
            .order_reference
            .map(|r| validation::sanitize_string(&r))
            .filter(|r| !r.is_empty());
        if let Some(reference) = &order_reference {
            validation::validate_order_reference(reference)?;
        }

        let description = request
            .description
            .map(|d| validation::sanitize_string(&d))
            .filter(|d| !d.is_empty());
        if let Some(description) = &description {
            validation::validate_description(description)?;
        }

        let br_code = self.encode_code(
            &request.amount,
            order_reference.as_deref(),
            description.as_deref(),
        )?;

        let tx = PaymentTransaction::new(
            Uuid::new_v4(),
            PaymentRail::Pix,
            request.amount.with_scale(2),
            order_reference,
            br_code,
            None,
            Duration::minutes(self.pix.expiration_minutes),
        );
        let stored = self.store.insert(&tx).await?;

        info!(
            pix_transaction_id = %stored.id,
            amount = %stored.amount,
            order_reference = ?stored.order_reference,
            expires_at = %stored.expires_at,
            "PIX payment created"
        );

        Ok(stored)
    }
}
