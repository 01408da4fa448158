use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::polling::StatusPoller;
use super::settlement::{SettlementError, SettlementService};
use crate::config::SweepConfig;
use crate::domain::{
    PaymentRail, PaymentTransaction, ReconciliationAttempt, ReconciliationStats,
    ReconciliationTrigger, TransactionStatus,
};
use crate::ports::{RepositoryError, TransactionStore};

/// Overdue rows polled against the bank per run.
const OVERDUE_POLL_BATCH: i64 = 100;
const RESYNC_BATCH: i64 = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeReport {
    pub expired: Vec<uuid::Uuid>,
    pub deleted: u64,
    pub attempts_deleted: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub polled: usize,
    pub confirmed_by_poll: usize,
    pub poll_errors: usize,
    pub expired: usize,
    pub deleted: u64,
    pub attempts_deleted: u64,
    pub resynced: usize,
}

/// Retires stale `pending` rows and finishes half-done booking updates.
///
/// Every operation is a range predicate over `(status, expires_at)`, so
/// running it twice, or from two processes, is harmless.
#[derive(Clone)]
pub struct ReconciliationSweeper {
    store: Arc<dyn TransactionStore>,
    settlement: SettlementService,
    poller: StatusPoller,
    config: SweepConfig,
}

impl ReconciliationSweeper {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        settlement: SettlementService,
        poller: StatusPoller,
        config: SweepConfig,
    ) -> Self {
        Self {
            store,
            settlement,
            poller,
            config,
        }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Pending rows that expire within `window_minutes`, including any
    /// already overdue and not yet swept.
    pub async fn list_expiring(
        &self,
        window_minutes: i64,
    ) -> Result<Vec<PaymentTransaction>, SettlementError> {
        let until = Utc::now() + Duration::minutes(window_minutes.max(0));
        Ok(self.store.list_expiring(until).await?)
    }

    /// Soft-expires overdue rows, then hard-deletes expired rows and
    /// reconciliation attempts older than their retention windows.
    pub async fn purge_expired(&self) -> Result<PurgeReport, SettlementError> {
        let now = Utc::now();
        let expired = self.settlement.expire_overdue(now).await?;
        let (deleted, attempts_deleted) = self.delete_past_retention(now).await?;

        Ok(PurgeReport {
            expired,
            deleted,
            attempts_deleted,
        })
    }

    async fn delete_past_retention(
        &self,
        now: chrono::DateTime<Utc>,
    ) -> Result<(u64, u64), SettlementError> {
        let cutoff = now - Duration::days(self.config.expired_retention_days.max(0));
        let deleted = self.store.delete_expired_before(cutoff).await?;
        if deleted > 0 {
            info!(deleted, %cutoff, "Deleted expired transactions past retention");
        }

        let cutoff = now - Duration::days(self.config.reconciliation_retention_days.max(0));
        let attempts_deleted = self.store.delete_reconciliations_before(cutoff).await?;
        if attempts_deleted > 0 {
            info!(attempts_deleted, %cutoff, "Deleted old reconciliation attempts");
        }

        Ok((deleted, attempts_deleted))
    }

    pub async fn reconciliation_history(
        &self,
        limit: i64,
    ) -> Result<Vec<ReconciliationAttempt>, SettlementError> {
        Ok(self.store.reconciliation_history(limit).await?)
    }

    pub async fn reconciliation_stats(&self) -> Result<ReconciliationStats, SettlementError> {
        Ok(self.store.reconciliation_stats().await?)
    }

    /// Re-propagates paid transactions whose booking update never landed.
    pub async fn resync_bookings(&self) -> Result<usize, SettlementError> {
        let unsynced = self.store.list_unsynced_paid(RESYNC_BATCH).await?;
        let mut resynced = 0;

        for tx in unsynced {
            let id = tx.id;
            match self.settlement.resync_booking(tx).await {
                Ok(_) => resynced += 1,
                Err(e) => warn!(pix_transaction_id = %id, error = %e, "Booking resync failed"),
            }
        }

        Ok(resynced)
    }

    /// One full pass: poll overdue rows, expire and purge, resync bookings.
    ///
    /// With a bank configured, each overdue PIX row is asked about first and
    /// expired once the bank still calls it pending or has no record of it.
    /// A row whose poll failed is retried on the next run, and expired
    /// unverified after `max_failed_polls` outages. Card sessions are never
    /// polled against the bank.
    pub async fn run_once(&self) -> Result<SweepReport, SettlementError> {
        let mut report = SweepReport::default();
        let now = Utc::now();

        if self.poller.bank_configured() {
            let overdue = self
                .store
                .list_overdue(now, PaymentRail::Pix, OVERDUE_POLL_BATCH)
                .await?;
            for tx in overdue {
                report.polled += 1;
                self.reconcile_overdue(tx, now, &mut report).await?;
            }

            let cards = self
                .store
                .list_overdue(now, PaymentRail::Card, OVERDUE_POLL_BATCH)
                .await?;
            for tx in cards {
                self.expire_one(tx.id, now, &mut report).await?;
            }

            let (deleted, attempts_deleted) = self.delete_past_retention(now).await?;
            report.deleted = deleted;
            report.attempts_deleted = attempts_deleted;
        } else {
            let purge = self.purge_expired().await?;
            report.expired = purge.expired.len();
            report.deleted = purge.deleted;
            report.attempts_deleted = purge.attempts_deleted;
        }

        report.resynced = self.resync_bookings().await?;

        info!(
            polled = report.polled,
            confirmed_by_poll = report.confirmed_by_poll,
            poll_errors = report.poll_errors,
            expired = report.expired,
            deleted = report.deleted,
            attempts_deleted = report.attempts_deleted,
            resynced = report.resynced,
            "Reconciliation sweep finished"
        );

        Ok(report)
    }

    async fn reconcile_overdue(
        &self,
        tx: PaymentTransaction,
        now: chrono::DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<(), SettlementError> {
        let id = tx.id;
        let attempt = ReconciliationAttempt::start(&tx, ReconciliationTrigger::Sweep);

        let attempt = match self.poller.poll_loaded(tx).await {
            Ok(check) => {
                let attempt = match &check.bank_status {
                    Some(raw) => attempt.bank_answered(raw),
                    None => attempt,
                };
                let status = match check.transaction.status {
                    TransactionStatus::Paid => {
                        report.confirmed_by_poll += 1;
                        TransactionStatus::Paid
                    }
                    TransactionStatus::Pending => self.expire_one(id, now, report).await?,
                    other => other,
                };
                attempt.resulted_in(status)
            }
            Err(e) if e.is_bank_answer() => {
                info!(pix_transaction_id = %id, error = %e, "Bank has no usable record, expiring");
                let status = self.expire_one(id, now, report).await?;
                attempt.errored(&e).resulted_in(status)
            }
            Err(e) => {
                report.poll_errors += 1;
                let failures = self.store.count_failed_reconciliations(id).await? + 1;
                if e.is_bank_outage() && failures >= self.config.max_failed_polls.max(1) {
                    warn!(
                        pix_transaction_id = %id,
                        failures,
                        error = %e,
                        "Bank unreachable for overdue transaction, expiring unverified"
                    );
                    let status = self.expire_one(id, now, report).await?;
                    attempt.errored(&e).resulted_in(status)
                } else {
                    warn!(pix_transaction_id = %id, failures, error = %e, "Overdue poll failed");
                    attempt.errored(&e)
                }
            }
        };

        self.poller.record_attempt(&attempt).await;
        Ok(())
    }

    /// Expires one row and reports the status it ended up in.
    async fn expire_one(
        &self,
        id: uuid::Uuid,
        now: chrono::DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<TransactionStatus, SettlementError> {
        if self.settlement.expire(id, now).await? {
            report.expired += 1;
            return Ok(TransactionStatus::Expired);
        }

        match self.store.get_by_id(id).await {
            Ok(tx) => Ok(tx.status),
            Err(RepositoryError::NotFound(_)) => Ok(TransactionStatus::Expired),
            Err(e) => Err(e.into()),
        }
    }
}

/// Background loop started by `serve` when a sweep interval is configured.
pub async fn run_sweeper(sweeper: ReconciliationSweeper, interval: std::time::Duration) {
    info!(interval_secs = interval.as_secs(), "Reconciliation sweeper started");

    loop {
        sleep(interval).await;

        match sweeper.list_expiring(sweeper.config().expiring_window_minutes).await {
            Ok(expiring) if !expiring.is_empty() => {
                info!(count = expiring.len(), "Payments expiring soon");
            }
            Ok(_) => {}
            Err(e) => error!("Expiring scan error: {}", e),
        }

        if let Err(e) = sweeper.run_once().await {
            error!("Sweep error: {}", e);
        }
    }
}
