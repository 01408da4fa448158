//! Payment transaction domain entity.
//! Framework-agnostic representation of one payment attempt.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Paid,
    Failed,
    Expired,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Paid => "paid",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "paid" => Ok(TransactionStatus::Paid),
            "failed" => Ok(TransactionStatus::Failed),
            "expired" => Ok(TransactionStatus::Expired),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

/// Settlement rail the attempt runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentRail {
    Pix,
    Card,
}

impl PaymentRail {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentRail::Pix => "pix",
            PaymentRail::Card => "card",
        }
    }
}

impl FromStr for PaymentRail {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pix" => Ok(PaymentRail::Pix),
            "card" => Ok(PaymentRail::Card),
            other => Err(format!("unknown payment rail '{}'", other)),
        }
    }
}

/// Domain entity representing one payment attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub rail: PaymentRail,
    pub amount: BigDecimal,
    pub status: TransactionStatus,
    pub order_reference: Option<String>,
    pub encoded_payload: String,
    pub provider_reference: Option<String>,
    pub external_confirmation_id: Option<String>,
    pub counterparty_account: Option<String>,
    pub counterparty_bank: Option<String>,
    pub confirmed_by: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub booking_synced_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    /// A fresh `pending` attempt. `id` is generated by the caller so it can
    /// be embedded in the payload before the row exists.
    pub fn new(
        id: Uuid,
        rail: PaymentRail,
        amount: BigDecimal,
        order_reference: Option<String>,
        encoded_payload: String,
        provider_reference: Option<String>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            rail,
            amount,
            status: TransactionStatus::Pending,
            order_reference,
            encoded_payload,
            provider_reference,
            external_confirmation_id: None,
            counterparty_account: None,
            counterparty_bank: None,
            confirmed_by: None,
            failure_reason: None,
            created_at: now,
            expires_at: now + ttl,
            confirmed_at: None,
            booking_synced_at: None,
            updated_at: now,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == TransactionStatus::Pending && now > self.expires_at
    }

    /// Paid with a booking reference that has not been propagated yet.
    pub fn needs_booking_sync(&self) -> bool {
        self.status == TransactionStatus::Paid
            && self.order_reference.is_some()
            && self.booking_synced_at.is_none()
    }
}

/// Data captured from whoever confirmed the payment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Confirmation {
    pub external_confirmation_id: Option<String>,
    pub counterparty_account: Option<String>,
    pub counterparty_bank: Option<String>,
    pub confirmed_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(ttl_minutes: i64) -> PaymentTransaction {
        PaymentTransaction::new(
            Uuid::new_v4(),
            PaymentRail::Pix,
            BigDecimal::from(150),
            Some("order-42".to_string()),
            "000201".to_string(),
            None,
            Duration::minutes(ttl_minutes),
        )
    }

    #[test]
    fn new_transaction_is_pending_and_unconfirmed() {
        let tx = pending(30);
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(tx.confirmed_at.is_none());
        assert_eq!(tx.expires_at - tx.created_at, Duration::minutes(30));
    }

    #[test]
    fn overdue_only_applies_to_pending() {
        let mut tx = pending(-1);
        assert!(tx.is_overdue(Utc::now()));

        tx.status = TransactionStatus::Paid;
        assert!(!tx.is_overdue(Utc::now()));
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Paid,
            TransactionStatus::Failed,
            TransactionStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<TransactionStatus>(), Ok(status));
        }
        assert!("settled".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn booking_sync_needed_only_for_paid_with_reference() {
        let mut tx = pending(30);
        assert!(!tx.needs_booking_sync());

        tx.status = TransactionStatus::Paid;
        assert!(tx.needs_booking_sync());

        tx.booking_synced_at = Some(Utc::now());
        assert!(!tx.needs_booking_sync());
    }
}
