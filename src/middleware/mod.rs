pub mod auth;
pub mod request_logger;

pub use auth::{operator_auth, Operator};
pub use request_logger::request_logger_middleware;
