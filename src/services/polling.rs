use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::settlement::{SettlementError, SettlementService};
use crate::bank::{BankApiClient, BankApiError, ProviderStatus};
use crate::domain::{
    Confirmation, PaymentRail, PaymentTransaction, ReconciliationAttempt, ReconciliationTrigger,
    TransactionStatus,
};
use crate::ports::{RepositoryError, TransactionStore};

#[derive(Debug, Error)]
pub enum PollError {
    #[error("transaction {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Bank(#[from] BankApiError),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl PollError {
    /// The bank answered, but with nothing to settle against (unknown
    /// transaction or a status outside the mapping table).
    pub fn is_bank_answer(&self) -> bool {
        matches!(self, PollError::Bank(e) if !e.is_outage())
    }

    /// The bank could not be asked at all.
    pub fn is_bank_outage(&self) -> bool {
        matches!(self, PollError::Bank(e) if e.is_outage())
    }
}

/// Where the reported status came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSource {
    /// Answered from the local row without an outbound call.
    Local,
    /// No bank check applies: no endpoint is configured or the row is not
    /// on the PIX rail. The local status is unverified.
    Skipped,
    Bank(ProviderStatus),
}

impl StatusSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusSource::Local => "local",
            StatusSource::Skipped => "skipped",
            StatusSource::Bank(_) => "bank",
        }
    }

    pub fn external_check_skipped(&self) -> bool {
        matches!(self, StatusSource::Skipped)
    }
}

#[derive(Debug, Clone)]
pub struct StatusCheck {
    pub transaction: PaymentTransaction,
    pub source: StatusSource,
    /// Status text exactly as the bank sent it.
    pub bank_status: Option<String>,
}

impl StatusCheck {
    fn local(transaction: PaymentTransaction, source: StatusSource) -> Self {
        Self {
            transaction,
            source,
            bank_status: None,
        }
    }
}

/// "Is this paid yet?" against the bank, for when no webhook has landed.
#[derive(Clone)]
pub struct StatusPoller {
    store: Arc<dyn TransactionStore>,
    settlement: SettlementService,
    bank: Option<BankApiClient>,
}

impl StatusPoller {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        settlement: SettlementService,
        bank: Option<BankApiClient>,
    ) -> Self {
        Self {
            store,
            settlement,
            bank,
        }
    }

    pub fn bank_configured(&self) -> bool {
        self.bank.is_some()
    }

    pub fn bank_client(&self) -> Option<&BankApiClient> {
        self.bank.as_ref()
    }

    async fn load(&self, id: Uuid) -> Result<PaymentTransaction, PollError> {
        self.store.get_by_id(id).await.map_err(|e| match e {
            RepositoryError::NotFound(_) => PollError::NotFound(id),
            other => PollError::Repository(other),
        })
    }

    /// Answers "is this paid yet?" and records the bank check, if one was
    /// made, in the reconciliation log.
    pub async fn check_status(&self, id: Uuid) -> Result<StatusCheck, PollError> {
        let tx = self.load(id).await?;
        let bank = match self.route(&tx) {
            Ok(bank) => bank,
            Err(source) => return Ok(StatusCheck::local(tx, source)),
        };

        let attempt = ReconciliationAttempt::start(&tx, ReconciliationTrigger::Poll);
        let result = self.query_bank(bank, tx).await;
        let attempt = match &result {
            Ok(check) => {
                let attempt = match &check.bank_status {
                    Some(raw) => attempt.bank_answered(raw),
                    None => attempt,
                };
                attempt.resulted_in(check.transaction.status)
            }
            Err(e) => attempt.errored(e),
        };
        self.record_attempt(&attempt).await;

        result
    }

    /// Polls an already loaded row without logging; the sweep records its
    /// own attempt once it has decided what to do with the answer.
    pub async fn poll_loaded(&self, tx: PaymentTransaction) -> Result<StatusCheck, PollError> {
        match self.route(&tx) {
            Ok(bank) => self.query_bank(bank, tx).await,
            Err(source) => Ok(StatusCheck::local(tx, source)),
        }
    }

    /// Audit writes never fail the check they describe.
    pub async fn record_attempt(&self, attempt: &ReconciliationAttempt) {
        if let Err(e) = self.store.record_reconciliation(attempt).await {
            warn!(
                pix_transaction_id = %attempt.transaction_id,
                error = %e,
                "Failed to record reconciliation attempt"
            );
        }
    }

    /// The bank client to ask, or the source to report when no outbound
    /// call applies.
    fn route(&self, tx: &PaymentTransaction) -> Result<&BankApiClient, StatusSource> {
        // Settled or finalized rows never cost an outbound call.
        if tx.status != TransactionStatus::Pending {
            return Err(StatusSource::Local);
        }
        if tx.rail != PaymentRail::Pix {
            debug!(pix_transaction_id = %tx.id, rail = tx.rail.as_str(), "Not a PIX row, skipping bank check");
            return Err(StatusSource::Skipped);
        }
        match &self.bank {
            Some(bank) => Ok(bank),
            None => {
                debug!(pix_transaction_id = %tx.id, "Bank API not configured, skipping external check");
                Err(StatusSource::Skipped)
            }
        }
    }

    async fn query_bank(
        &self,
        bank: &BankApiClient,
        tx: PaymentTransaction,
    ) -> Result<StatusCheck, PollError> {
        let id = tx.id;
        let remote = bank.fetch_status(&id.to_string()).await?;
        info!(
            pix_transaction_id = %id,
            provider_status = %remote.raw_status,
            "Bank status fetched"
        );

        let transaction = match remote.status {
            ProviderStatus::Pending => tx,
            ProviderStatus::Paid => {
                let confirmation = Confirmation {
                    external_confirmation_id: remote.bank_transaction_id.clone(),
                    counterparty_account: remote.sender_account.clone(),
                    counterparty_bank: remote.bank_name.clone(),
                    confirmed_by: Some("bank-poll".to_string()),
                };
                match self
                    .settlement
                    .confirm(id, remote.amount.as_ref(), confirmation)
                    .await
                {
                    Ok(outcome) => outcome.into_transaction(),
                    // Something else finalized it between our read and the update.
                    Err(SettlementError::Finalized { .. }) => self.load(id).await?,
                    Err(e) => return Err(e.into()),
                }
            }
            ProviderStatus::Failed => {
                let reason = format!("bank reported {}", remote.raw_status);
                self.settlement.fail(id, &reason).await?.into_transaction()
            }
        };

        Ok(StatusCheck {
            transaction,
            source: StatusSource::Bank(remote.status),
            bank_status: Some(remote.raw_status),
        })
    }
}
