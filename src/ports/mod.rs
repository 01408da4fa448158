//! Storage ports. The settlement core only talks to these traits; Postgres
//! and in-memory adapters live in `crate::adapters`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    Confirmation, PaymentRail, PaymentTransaction, ReconciliationAttempt, ReconciliationStats,
    TransactionStatus,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Durable record of every issued payment request.
///
/// All transitions are conditional updates scoped by id and expected prior
/// status; a `false` return means the guard did not match and nothing was
/// written.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, tx: &PaymentTransaction) -> RepositoryResult<PaymentTransaction>;

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<PaymentTransaction>;

    /// `status := paid` where `id = $id and status = $from`.
    async fn mark_paid(
        &self,
        id: Uuid,
        from: TransactionStatus,
        confirmation: &Confirmation,
        at: DateTime<Utc>,
    ) -> RepositoryResult<bool>;

    /// `status := failed` where `id = $id and status = 'pending'`.
    async fn mark_failed(&self, id: Uuid, reason: &str, at: DateTime<Utc>) -> RepositoryResult<bool>;

    async fn mark_booking_synced(&self, id: Uuid, at: DateTime<Utc>) -> RepositoryResult<()>;

    /// Pending rows whose `expires_at` is at or before `until`, soonest
    /// first. Rows already past their deadline are included.
    async fn list_expiring(&self, until: DateTime<Utc>) -> RepositoryResult<Vec<PaymentTransaction>>;

    /// Pending rows on `rail` whose `expires_at` is already before `now`,
    /// oldest deadline first.
    async fn list_overdue(
        &self,
        now: DateTime<Utc>,
        rail: PaymentRail,
        limit: i64,
    ) -> RepositoryResult<Vec<PaymentTransaction>>;

    /// `status := expired` where `id = $id and status = 'pending' and expires_at < now`.
    async fn expire_if_overdue(&self, id: Uuid, now: DateTime<Utc>) -> RepositoryResult<bool>;

    /// `status := expired` for every pending row with `expires_at < now`.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<Uuid>>;

    /// Hard-deletes `expired` rows whose `expires_at` is before `cutoff`.
    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<u64>;

    async fn list_unsynced_paid(&self, limit: i64) -> RepositoryResult<Vec<PaymentTransaction>>;

    async fn record_reconciliation(&self, attempt: &ReconciliationAttempt) -> RepositoryResult<()>;

    /// Most recent attempts first.
    async fn reconciliation_history(&self, limit: i64) -> RepositoryResult<Vec<ReconciliationAttempt>>;

    async fn reconciliation_stats(&self) -> RepositoryResult<ReconciliationStats>;

    /// Attempts for `transaction_id` that ended in an error.
    async fn count_failed_reconciliations(&self, transaction_id: Uuid) -> RepositoryResult<i64>;

    async fn delete_reconciliations_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<u64>;

    async fn ping(&self) -> RepositoryResult<()>;
}

/// The external booking record a payment settles. Marking a booking paid
/// must be safe to repeat.
#[async_trait]
pub trait BookingLedger: Send + Sync {
    /// Returns `false` when no booking carries `booking_ref`.
    async fn mark_paid(&self, booking_ref: &str, paid_at: DateTime<Utc>) -> RepositoryResult<bool>;
}
