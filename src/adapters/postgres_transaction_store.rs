//! Postgres implementation of TransactionStore.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    Confirmation, PaymentRail, PaymentTransaction, ReconciliationAttempt, ReconciliationStats,
    TransactionStatus,
};
use crate::ports::{RepositoryError, RepositoryResult, TransactionStore};

/// Postgres-backed transaction store.
#[derive(Clone)]
pub struct PostgresTransactionStore {
    pool: PgPool,
}

impl PostgresTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for PostgresTransactionStore {
    async fn insert(&self, tx: &PaymentTransaction) -> RepositoryResult<PaymentTransaction> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            INSERT INTO payment_transactions (
                id, rail, amount, status, order_reference, encoded_payload,
                provider_reference, created_at, expires_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(tx.id)
        .bind(tx.rail.as_str())
        .bind(&tx.amount)
        .bind(tx.status.as_str())
        .bind(&tx.order_reference)
        .bind(&tx.encoded_payload)
        .bind(&tx.provider_reference)
        .bind(tx.created_at)
        .bind(tx.expires_at)
        .bind(tx.updated_at)
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<PaymentTransaction> {
        let row = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM payment_transactions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| RepositoryError::NotFound(id.to_string()))?
            .into_domain()
    }

    async fn mark_paid(
        &self,
        id: Uuid,
        from: TransactionStatus,
        confirmation: &Confirmation,
        at: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = 'paid',
                confirmed_at = $3,
                external_confirmation_id = $4,
                counterparty_account = $5,
                counterparty_bank = $6,
                confirmed_by = $7,
                updated_at = $3
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(at)
        .bind(&confirmation.external_confirmation_id)
        .bind(&confirmation.counterparty_account)
        .bind(&confirmation.counterparty_bank)
        .bind(&confirmation.confirmed_by)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_failed(&self, id: Uuid, reason: &str, at: DateTime<Utc>) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = 'failed', failure_reason = $2, updated_at = $3
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(reason)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_booking_synced(&self, id: Uuid, at: DateTime<Utc>) -> RepositoryResult<()> {
        sqlx::query(
            "UPDATE payment_transactions SET booking_synced_at = $2, updated_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_expiring(&self, until: DateTime<Utc>) -> RepositoryResult<Vec<PaymentTransaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT * FROM payment_transactions
            WHERE status = 'pending'
            AND expires_at <= $1
            ORDER BY expires_at ASC
            "#,
        )
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn list_overdue(
        &self,
        now: DateTime<Utc>,
        rail: PaymentRail,
        limit: i64,
    ) -> RepositoryResult<Vec<PaymentTransaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT * FROM payment_transactions
            WHERE status = 'pending'
            AND rail = $2
            AND expires_at < $1
            ORDER BY expires_at ASC
            LIMIT $3
            "#,
        )
        .bind(now)
        .bind(rail.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn expire_if_overdue(&self, id: Uuid, now: DateTime<Utc>) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = 'expired', updated_at = $2
            WHERE id = $1 AND status = 'pending' AND expires_at < $2
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE payment_transactions
            SET status = 'expired', updated_at = $1
            WHERE status = 'pending' AND expires_at < $1
            RETURNING id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<u64> {
        let result = sqlx::query(
            "DELETE FROM payment_transactions WHERE status = 'expired' AND expires_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_unsynced_paid(&self, limit: i64) -> RepositoryResult<Vec<PaymentTransaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT * FROM payment_transactions
            WHERE status = 'paid'
            AND order_reference IS NOT NULL
            AND booking_synced_at IS NULL
            ORDER BY confirmed_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn record_reconciliation(&self, attempt: &ReconciliationAttempt) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reconciliation_attempts (
                id, transaction_id, booking_reference, triggered_by, system_status,
                bank_status, resulting_status, reconciled, error, checked_at, reconciled_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.transaction_id)
        .bind(&attempt.booking_reference)
        .bind(attempt.trigger.as_str())
        .bind(attempt.system_status.as_str())
        .bind(&attempt.bank_status)
        .bind(attempt.resulting_status.as_str())
        .bind(attempt.reconciled)
        .bind(&attempt.error)
        .bind(attempt.checked_at)
        .bind(attempt.reconciled_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reconciliation_history(&self, limit: i64) -> RepositoryResult<Vec<ReconciliationAttempt>> {
        let rows = sqlx::query_as::<_, AttemptRow>(
            "SELECT * FROM reconciliation_attempts ORDER BY checked_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AttemptRow::into_domain).collect()
    }

    async fn reconciliation_stats(&self) -> RepositoryResult<ReconciliationStats> {
        let (total, reconciled, errors): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE reconciled),
                COUNT(*) FILTER (WHERE error IS NOT NULL)
            FROM reconciliation_attempts
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(ReconciliationStats {
            total,
            reconciled,
            pending: total - reconciled,
            errors,
        })
    }

    async fn count_failed_reconciliations(&self, transaction_id: Uuid) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM reconciliation_attempts WHERE transaction_id = $1 AND error IS NOT NULL",
        )
        .bind(transaction_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn delete_reconciliations_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM reconciliation_attempts WHERE checked_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    rail: String,
    amount: BigDecimal,
    status: String,
    order_reference: Option<String>,
    encoded_payload: String,
    provider_reference: Option<String>,
    external_confirmation_id: Option<String>,
    counterparty_account: Option<String>,
    counterparty_bank: Option<String>,
    confirmed_by: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    booking_synced_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<PaymentTransaction> {
        Ok(PaymentTransaction {
            id: self.id,
            rail: self.rail.parse().map_err(RepositoryError::Corrupt)?,
            amount: self.amount,
            status: self.status.parse().map_err(RepositoryError::Corrupt)?,
            order_reference: self.order_reference,
            encoded_payload: self.encoded_payload,
            provider_reference: self.provider_reference,
            external_confirmation_id: self.external_confirmation_id,
            counterparty_account: self.counterparty_account,
            counterparty_bank: self.counterparty_bank,
            confirmed_by: self.confirmed_by,
            failure_reason: self.failure_reason,
            created_at: self.created_at,
            expires_at: self.expires_at,
            confirmed_at: self.confirmed_at,
            booking_synced_at: self.booking_synced_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AttemptRow {
    id: Uuid,
    transaction_id: Uuid,
    booking_reference: Option<String>,
    triggered_by: String,
    system_status: String,
    bank_status: Option<String>,
    resulting_status: String,
    reconciled: bool,
    error: Option<String>,
    checked_at: DateTime<Utc>,
    reconciled_at: Option<DateTime<Utc>>,
}

impl AttemptRow {
    fn into_domain(self) -> RepositoryResult<ReconciliationAttempt> {
        Ok(ReconciliationAttempt {
            id: self.id,
            transaction_id: self.transaction_id,
            booking_reference: self.booking_reference,
            trigger: self.triggered_by.parse().map_err(RepositoryError::Corrupt)?,
            system_status: self.system_status.parse().map_err(RepositoryError::Corrupt)?,
            bank_status: self.bank_status,
            resulting_status: self.resulting_status.parse().map_err(RepositoryError::Corrupt)?,
            reconciled: self.reconciled,
            error: self.error,
            checked_at: self.checked_at,
            reconciled_at: self.reconciled_at,
        })
    }
}
