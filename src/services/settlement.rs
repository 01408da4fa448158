use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{Confirmation, PaymentRail, PaymentTransaction, TransactionStatus};
use crate::ports::{BookingLedger, RepositoryError, TransactionStore};

/// Absorbs float formatting noise from providers (`150` vs `149.999`).
fn amount_tolerance() -> BigDecimal {
    BigDecimal::new(1i64.into(), 2)
}

pub fn amounts_match(stored: &BigDecimal, declared: &BigDecimal) -> bool {
    (stored - declared).abs() <= amount_tolerance()
}

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("transaction {0} not found")]
    NotFound(Uuid),

    #[error("transaction {id} is already {status}")]
    Finalized { id: Uuid, status: TransactionStatus },

    #[error("transaction {id} runs on the {} rail", .rail.as_str())]
    WrongRail { id: Uuid, rail: PaymentRail },

    #[error("amount mismatch for {id}: expected {expected}, received {received}")]
    AmountMismatch {
        id: Uuid,
        expected: BigDecimal,
        received: BigDecimal,
    },

    #[error("booking propagation failed for {id}: {source}")]
    Propagation {
        id: Uuid,
        #[source]
        source: RepositoryError,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Result of applying one event. Every variant is a success from the
/// caller's point of view.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    /// This call moved the transaction to `paid`.
    Settled(PaymentTransaction),
    /// Someone else already did; nothing changed.
    AlreadySettled(PaymentTransaction),
    MarkedFailed(PaymentTransaction),
    /// The event did not apply to the current state.
    Unchanged(PaymentTransaction),
}

impl SettlementOutcome {
    pub fn transaction(&self) -> &PaymentTransaction {
        match self {
            SettlementOutcome::Settled(tx)
            | SettlementOutcome::AlreadySettled(tx)
            | SettlementOutcome::MarkedFailed(tx)
            | SettlementOutcome::Unchanged(tx) => tx,
        }
    }

    pub fn into_transaction(self) -> PaymentTransaction {
        match self {
            SettlementOutcome::Settled(tx)
            | SettlementOutcome::AlreadySettled(tx)
            | SettlementOutcome::MarkedFailed(tx)
            | SettlementOutcome::Unchanged(tx) => tx,
        }
    }
}

/// The only writer of transaction status.
///
/// Every transition is a conditional update on `(id, expected status)`, so a
/// webhook and a poll racing on the same row cannot both confirm it; the
/// loser sees `AlreadySettled`.
#[derive(Clone)]
pub struct SettlementService {
    store: Arc<dyn TransactionStore>,
    bookings: Arc<dyn BookingLedger>,
}

impl SettlementService {
    pub fn new(store: Arc<dyn TransactionStore>, bookings: Arc<dyn BookingLedger>) -> Self {
        Self { store, bookings }
    }

    async fn load(&self, id: Uuid) -> Result<PaymentTransaction, SettlementError> {
        self.store.get_by_id(id).await.map_err(|e| match e {
            RepositoryError::NotFound(_) => SettlementError::NotFound(id),
            other => SettlementError::Repository(other),
        })
    }

    /// Applies a bank confirmation (webhook or poll).
    ///
    /// `declared_amount` is checked against the stored amount when present;
    /// a mismatch leaves the row `pending` for human review.
    pub async fn confirm(
        &self,
        id: Uuid,
        declared_amount: Option<&BigDecimal>,
        confirmation: Confirmation,
    ) -> Result<SettlementOutcome, SettlementError> {
        let tx = self.load(id).await?;
        self.confirm_loaded(tx, declared_amount, confirmation).await
    }

    /// Like `confirm`, but refuses rows issued on another rail, so a bank
    /// push can never settle a card session and vice versa.
    pub async fn confirm_on_rail(
        &self,
        id: Uuid,
        rail: PaymentRail,
        declared_amount: Option<&BigDecimal>,
        confirmation: Confirmation,
    ) -> Result<SettlementOutcome, SettlementError> {
        let tx = self.load(id).await?;
        if tx.rail != rail {
            warn!(
                pix_transaction_id = %id,
                expected_rail = rail.as_str(),
                actual_rail = tx.rail.as_str(),
                "Confirmation rejected for transaction on another rail"
            );
            return Err(SettlementError::WrongRail { id, rail: tx.rail });
        }
        self.confirm_loaded(tx, declared_amount, confirmation).await
    }

    async fn confirm_loaded(
        &self,
        tx: PaymentTransaction,
        declared_amount: Option<&BigDecimal>,
        confirmation: Confirmation,
    ) -> Result<SettlementOutcome, SettlementError> {
        let id = tx.id;

        match tx.status {
            TransactionStatus::Paid => {
                info!(pix_transaction_id = %id, "Confirmation replay for settled transaction");
                let tx = self.propagate_if_needed(tx).await?;
                return Ok(SettlementOutcome::AlreadySettled(tx));
            }
            TransactionStatus::Failed | TransactionStatus::Expired => {
                warn!(
                    pix_transaction_id = %id,
                    status = %tx.status,
                    "Confirmation rejected for finalized transaction"
                );
                return Err(SettlementError::Finalized {
                    id,
                    status: tx.status,
                });
            }
            TransactionStatus::Pending => {}
        }

        if let Some(declared) = declared_amount {
            if !amounts_match(&tx.amount, declared) {
                warn!(
                    pix_transaction_id = %id,
                    expected = %tx.amount,
                    received = %declared,
                    "Amount mismatch, transaction left pending"
                );
                return Err(SettlementError::AmountMismatch {
                    id,
                    expected: tx.amount,
                    received: declared.clone(),
                });
            }
        }

        self.apply_paid(id, TransactionStatus::Pending, confirmation).await
    }

    /// Operator override. Allowed from `pending` and from `failed` (late
    /// settlement the bank could not match); never from `expired`.
    pub async fn manual_confirm(
        &self,
        id: Uuid,
        bank_transaction_id: &str,
        operator: &str,
    ) -> Result<SettlementOutcome, SettlementError> {
        let tx = self.load(id).await?;

        let from = match tx.status {
            TransactionStatus::Paid => {
                let tx = self.propagate_if_needed(tx).await?;
                return Ok(SettlementOutcome::AlreadySettled(tx));
            }
            TransactionStatus::Expired => {
                return Err(SettlementError::Finalized {
                    id,
                    status: tx.status,
                })
            }
            status => status,
        };

        warn!(
            pix_transaction_id = %id,
            operator = %operator,
            from_status = %from,
            bank_transaction_id = %bank_transaction_id,
            "Manual payment confirmation"
        );

        let confirmation = Confirmation {
            external_confirmation_id: Some(bank_transaction_id.to_string()),
            counterparty_account: None,
            counterparty_bank: None,
            confirmed_by: Some(format!("operator:{}", operator)),
        };
        self.apply_paid(id, from, confirmation).await
    }

    /// Bank reported the attempt failed. Only a `pending` row moves.
    pub async fn fail(&self, id: Uuid, reason: &str) -> Result<SettlementOutcome, SettlementError> {
        let tx = self.load(id).await?;
        if tx.status != TransactionStatus::Pending {
            return Ok(SettlementOutcome::Unchanged(tx));
        }

        if self.store.mark_failed(id, reason, Utc::now()).await? {
            info!(pix_transaction_id = %id, reason = %reason, "Transaction marked failed");
            Ok(SettlementOutcome::MarkedFailed(self.load(id).await?))
        } else {
            Ok(SettlementOutcome::Unchanged(self.load(id).await?))
        }
    }

    /// `pending -> expired` for one row, only once its deadline has passed.
    pub async fn expire(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, SettlementError> {
        let expired = self.store.expire_if_overdue(id, now).await?;
        if expired {
            info!(pix_transaction_id = %id, "Transaction expired");
        }
        Ok(expired)
    }

    /// `pending -> expired` for everything past its deadline.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, SettlementError> {
        let expired = self.store.expire_overdue(now).await?;
        for id in &expired {
            info!(pix_transaction_id = %id, "Transaction expired");
        }
        Ok(expired)
    }

    /// Finishes a booking update that failed after the row was marked paid.
    pub async fn resync_booking(
        &self,
        tx: PaymentTransaction,
    ) -> Result<PaymentTransaction, SettlementError> {
        self.propagate_if_needed(tx).await
    }

    async fn apply_paid(
        &self,
        id: Uuid,
        from: TransactionStatus,
        confirmation: Confirmation,
    ) -> Result<SettlementOutcome, SettlementError> {
        let now = Utc::now();
        if !self.store.mark_paid(id, from, &confirmation, now).await? {
            // Lost the race; report whatever won.
            let current = self.load(id).await?;
            return match current.status {
                TransactionStatus::Paid => Ok(SettlementOutcome::AlreadySettled(current)),
                status => Err(SettlementError::Finalized { id, status }),
            };
        }

        info!(
            pix_transaction_id = %id,
            external_confirmation_id = ?confirmation.external_confirmation_id,
            confirmed_by = ?confirmation.confirmed_by,
            "Transaction settled"
        );

        let settled = self.load(id).await?;
        let settled = self.propagate_if_needed(settled).await?;
        Ok(SettlementOutcome::Settled(settled))
    }

    async fn propagate_if_needed(
        &self,
        tx: PaymentTransaction,
    ) -> Result<PaymentTransaction, SettlementError> {
        if !tx.needs_booking_sync() {
            return Ok(tx);
        }

        let booking_ref = match tx.order_reference.as_deref() {
            Some(reference) => reference,
            None => return Ok(tx),
        };
        let paid_at = tx.confirmed_at.unwrap_or_else(Utc::now);

        let found = self
            .bookings
            .mark_paid(booking_ref, paid_at)
            .await
            .map_err(|source| SettlementError::Propagation { id: tx.id, source })?;

        if found {
            info!(pix_transaction_id = %tx.id, booking_id = %booking_ref, "Booking marked paid");
        } else {
            warn!(
                pix_transaction_id = %tx.id,
                booking_id = %booking_ref,
                "No booking found for settled transaction"
            );
        }

        let synced_at = Utc::now();
        self.store
            .mark_booking_synced(tx.id, synced_at)
            .await
            .map_err(|source| SettlementError::Propagation { id: tx.id, source })?;

        Ok(PaymentTransaction {
            booking_synced_at: Some(synced_at),
            ..tx
        })
    }
}
