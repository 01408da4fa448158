pub mod checkout;
pub mod payments;
pub mod polling;
pub mod settlement;
pub mod sweeper;
pub mod webhook_verifier;

pub use checkout::CheckoutService;
pub use payments::PaymentService;
pub use polling::StatusPoller;
pub use settlement::SettlementService;
pub use sweeper::{run_sweeper, ReconciliationSweeper};
pub use webhook_verifier::WebhookVerifier;
