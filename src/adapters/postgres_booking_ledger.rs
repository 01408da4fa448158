//! Postgres implementation of BookingLedger against the booking service's
//! `bookings` table. Only the payment columns are touched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::ports::{BookingLedger, RepositoryResult};

#[derive(Clone)]
pub struct PostgresBookingLedger {
    pool: PgPool,
}

impl PostgresBookingLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingLedger for PostgresBookingLedger {
    async fn mark_paid(&self, booking_ref: &str, paid_at: DateTime<Utc>) -> RepositoryResult<bool> {
        // COALESCE keeps the first confirmation time on repeats.
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = 'confirmed',
                paid = TRUE,
                payment_confirmed_at = COALESCE(payment_confirmed_at, $2)
            WHERE id::text = $1
            "#,
        )
        .bind(booking_ref)
        .bind(paid_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
