//! In-memory adapters. Used by the test suite and by `serve --in-memory`
//! for local development without Postgres.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    Confirmation, PaymentRail, PaymentTransaction, ReconciliationAttempt, ReconciliationStats,
    TransactionStatus,
};
use crate::ports::{BookingLedger, RepositoryError, RepositoryResult, TransactionStore};

#[derive(Clone, Default)]
pub struct InMemoryTransactionStore {
    rows: Arc<RwLock<HashMap<Uuid, PaymentTransaction>>>,
    attempts: Arc<RwLock<Vec<ReconciliationAttempt>>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a row as-is, bypassing the state machine. Test setup only.
    pub async fn put(&self, tx: PaymentTransaction) {
        self.rows.write().await.insert(tx.id, tx);
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, tx: &PaymentTransaction) -> RepositoryResult<PaymentTransaction> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&tx.id) {
            return Err(RepositoryError::Corrupt(format!("duplicate transaction id {}", tx.id)));
        }
        rows.insert(tx.id, tx.clone());
        Ok(tx.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<PaymentTransaction> {
        self.rows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn mark_paid(
        &self,
        id: Uuid,
        from: TransactionStatus,
        confirmation: &Confirmation,
        at: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&id) {
            Some(tx) if tx.status == from => {
                tx.status = TransactionStatus::Paid;
                tx.confirmed_at = Some(at);
                tx.external_confirmation_id = confirmation.external_confirmation_id.clone();
                tx.counterparty_account = confirmation.counterparty_account.clone();
                tx.counterparty_bank = confirmation.counterparty_bank.clone();
                tx.confirmed_by = confirmation.confirmed_by.clone();
                tx.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_failed(&self, id: Uuid, reason: &str, at: DateTime<Utc>) -> RepositoryResult<bool> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&id) {
            Some(tx) if tx.status == TransactionStatus::Pending => {
                tx.status = TransactionStatus::Failed;
                tx.failure_reason = Some(reason.to_string());
                tx.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_booking_synced(&self, id: Uuid, at: DateTime<Utc>) -> RepositoryResult<()> {
        if let Some(tx) = self.rows.write().await.get_mut(&id) {
            tx.booking_synced_at = Some(at);
            tx.updated_at = at;
        }
        Ok(())
    }

    async fn list_expiring(&self, until: DateTime<Utc>) -> RepositoryResult<Vec<PaymentTransaction>> {
        let rows = self.rows.read().await;
        let mut found: Vec<_> = rows
            .values()
            .filter(|tx| tx.status == TransactionStatus::Pending && tx.expires_at <= until)
            .cloned()
            .collect();
        found.sort_by_key(|tx| tx.expires_at);
        Ok(found)
    }

    async fn list_overdue(
        &self,
        now: DateTime<Utc>,
        rail: PaymentRail,
        limit: i64,
    ) -> RepositoryResult<Vec<PaymentTransaction>> {
        let rows = self.rows.read().await;
        let mut found: Vec<_> = rows
            .values()
            .filter(|tx| {
                tx.status == TransactionStatus::Pending && tx.rail == rail && tx.expires_at < now
            })
            .cloned()
            .collect();
        found.sort_by_key(|tx| tx.expires_at);
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn expire_if_overdue(&self, id: Uuid, now: DateTime<Utc>) -> RepositoryResult<bool> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&id) {
            Some(tx) if tx.is_overdue(now) => {
                tx.status = TransactionStatus::Expired;
                tx.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<Uuid>> {
        let mut rows = self.rows.write().await;
        let mut expired = Vec::new();
        for tx in rows.values_mut() {
            if tx.status == TransactionStatus::Pending && tx.expires_at < now {
                tx.status = TransactionStatus::Expired;
                tx.updated_at = now;
                expired.push(tx.id);
            }
        }
        Ok(expired)
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<u64> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, tx| !(tx.status == TransactionStatus::Expired && tx.expires_at < cutoff));
        Ok((before - rows.len()) as u64)
    }

    async fn list_unsynced_paid(&self, limit: i64) -> RepositoryResult<Vec<PaymentTransaction>> {
        let rows = self.rows.read().await;
        let mut found: Vec<_> = rows.values().filter(|tx| tx.needs_booking_sync()).cloned().collect();
        found.sort_by_key(|tx| tx.confirmed_at);
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn record_reconciliation(&self, attempt: &ReconciliationAttempt) -> RepositoryResult<()> {
        self.attempts.write().await.push(attempt.clone());
        Ok(())
    }

    async fn reconciliation_history(&self, limit: i64) -> RepositoryResult<Vec<ReconciliationAttempt>> {
        let attempts = self.attempts.read().await;
        let mut found = attempts.clone();
        found.sort_by(|a, b| b.checked_at.cmp(&a.checked_at));
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn reconciliation_stats(&self) -> RepositoryResult<ReconciliationStats> {
        let attempts = self.attempts.read().await;
        let total = attempts.len() as i64;
        let reconciled = attempts.iter().filter(|a| a.reconciled).count() as i64;
        let errors = attempts.iter().filter(|a| a.error.is_some()).count() as i64;
        Ok(ReconciliationStats {
            total,
            reconciled,
            pending: total - reconciled,
            errors,
        })
    }

    async fn count_failed_reconciliations(&self, transaction_id: Uuid) -> RepositoryResult<i64> {
        let attempts = self.attempts.read().await;
        Ok(attempts
            .iter()
            .filter(|a| a.transaction_id == transaction_id && a.error.is_some())
            .count() as i64)
    }

    async fn delete_reconciliations_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<u64> {
        let mut attempts = self.attempts.write().await;
        let before = attempts.len();
        attempts.retain(|a| a.checked_at >= cutoff);
        Ok((before - attempts.len()) as u64)
    }

    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }
}

/// Booking payment state as the ledger sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRecord {
    pub status: String,
    pub paid: bool,
    pub payment_confirmed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Default)]
pub struct InMemoryBookingLedger {
    bookings: Arc<RwLock<HashMap<String, BookingRecord>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryBookingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_booking(&self, booking_ref: &str) {
        self.bookings.write().await.insert(
            booking_ref.to_string(),
            BookingRecord {
                status: "pending".to_string(),
                paid: false,
                payment_confirmed_at: None,
            },
        );
    }

    pub async fn get(&self, booking_ref: &str) -> Option<BookingRecord> {
        self.bookings.read().await.get(booking_ref).cloned()
    }

    /// Makes every subsequent write fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl BookingLedger for InMemoryBookingLedger {
    async fn mark_paid(&self, booking_ref: &str, paid_at: DateTime<Utc>) -> RepositoryResult<bool> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("booking ledger offline".to_string()));
        }

        let mut bookings = self.bookings.write().await;
        match bookings.get_mut(booking_ref) {
            Some(booking) => {
                booking.status = "confirmed".to_string();
                booking.paid = true;
                booking.payment_confirmed_at.get_or_insert(paid_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
