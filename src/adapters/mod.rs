//! Storage adapters for the ports in `crate::ports`.

pub mod memory;
pub mod postgres_booking_ledger;
pub mod postgres_transaction_store;

pub use memory::{InMemoryBookingLedger, InMemoryTransactionStore};
pub use postgres_booking_ledger::PostgresBookingLedger;
pub use postgres_transaction_store::PostgresTransactionStore;
