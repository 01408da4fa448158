pub mod client;
pub mod status;

pub use client::{BankApiClient, BankApiError, BankStatus};
pub use status::{map_provider_status, ProviderStatus};
