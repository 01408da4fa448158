pub mod money;
pub mod reconciliation;
pub mod transaction;

pub use reconciliation::{ReconciliationAttempt, ReconciliationStats, ReconciliationTrigger};
pub use transaction::{Confirmation, PaymentRail, PaymentTransaction, TransactionStatus};
