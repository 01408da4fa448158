//! Audit trail of bank status checks.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transaction::{PaymentTransaction, TransactionStatus};

/// What asked the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconciliationTrigger {
    /// A caller asked for the status of one transaction.
    Poll,
    /// The reconciliation sweep checked an overdue row.
    Sweep,
}

impl ReconciliationTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationTrigger::Poll => "poll",
            ReconciliationTrigger::Sweep => "sweep",
        }
    }
}

impl FromStr for ReconciliationTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "poll" => Ok(ReconciliationTrigger::Poll),
            "sweep" => Ok(ReconciliationTrigger::Sweep),
            other => Err(format!("unknown reconciliation trigger '{}'", other)),
        }
    }
}

/// One bank status check against one transaction.
///
/// `system_status` is the local status when the check started and
/// `resulting_status` the status after it was applied. An attempt is
/// `reconciled` once it left the row in a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationAttempt {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub booking_reference: Option<String>,
    pub trigger: ReconciliationTrigger,
    pub system_status: TransactionStatus,
    pub bank_status: Option<String>,
    pub resulting_status: TransactionStatus,
    pub reconciled: bool,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
    pub reconciled_at: Option<DateTime<Utc>>,
}

impl ReconciliationAttempt {
    pub fn start(tx: &PaymentTransaction, trigger: ReconciliationTrigger) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id: tx.id,
            booking_reference: tx.order_reference.clone(),
            trigger,
            system_status: tx.status,
            bank_status: None,
            resulting_status: tx.status,
            reconciled: false,
            error: None,
            checked_at: Utc::now(),
            reconciled_at: None,
        }
    }

    pub fn bank_answered(mut self, raw_status: &str) -> Self {
        self.bank_status = Some(raw_status.to_string());
        self
    }

    pub fn errored(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn resulted_in(mut self, status: TransactionStatus) -> Self {
        self.resulting_status = status;
        self.reconciled = status.is_terminal();
        self.reconciled_at = self.reconciled.then(Utc::now);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationStats {
    pub total: i64,
    pub reconciled: i64,
    pub pending: i64,
    pub errors: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PaymentRail;
    use bigdecimal::BigDecimal;
    use chrono::Duration;

    fn pending() -> PaymentTransaction {
        PaymentTransaction::new(
            Uuid::new_v4(),
            PaymentRail::Pix,
            BigDecimal::from(150),
            Some("order-42".to_string()),
            "000201".to_string(),
            None,
            Duration::minutes(-5),
        )
    }

    #[test]
    fn still_pending_is_not_reconciled() {
        let tx = pending();
        let attempt = ReconciliationAttempt::start(&tx, ReconciliationTrigger::Sweep)
            .bank_answered("ATIVA")
            .resulted_in(TransactionStatus::Pending);

        assert_eq!(attempt.transaction_id, tx.id);
        assert_eq!(attempt.booking_reference.as_deref(), Some("order-42"));
        assert_eq!(attempt.bank_status.as_deref(), Some("ATIVA"));
        assert!(!attempt.reconciled);
        assert!(attempt.reconciled_at.is_none());
    }

    #[test]
    fn terminal_outcome_is_reconciled() {
        let attempt = ReconciliationAttempt::start(&pending(), ReconciliationTrigger::Poll)
            .bank_answered("PAID")
            .resulted_in(TransactionStatus::Paid);

        assert_eq!(attempt.system_status, TransactionStatus::Pending);
        assert!(attempt.reconciled);
        assert!(attempt.reconciled_at.is_some());
    }

    #[test]
    fn trigger_parses_from_text() {
        assert_eq!("sweep".parse::<ReconciliationTrigger>(), Ok(ReconciliationTrigger::Sweep));
        assert!("cron".parse::<ReconciliationTrigger>().is_err());
    }
}
