//! Core utilities, configuration, and common functionality

pub mod amount;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod rate_limiter;
pub mod retry;
pub mod web_server;

// Re-exports for convenience
pub use amount::Doge;
pub use error::{AppError, AppResult, WithdrawError};
pub use logging::{init_logger, log_wallet_configuration};
