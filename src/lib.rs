//! DogeAds - Telegram bot paying DOGE rewards for watching ads
//!
//! # Module Structure
//!
//! - `core`: configuration, amounts, errors, logging, metrics, HTTP API
//! - `storage`: SQLite pool, migrations and the ledger queries
//! - `wallet`: hot wallet key, address checks and the BlockCypher client
//! - `withdraw`: the withdrawal pipeline
//! - `telegram`: bot commands, withdrawal dialog and admin tooling

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod cli;
pub mod core;
pub mod storage;
pub mod telegram;
pub mod wallet;
pub mod withdraw;

// Re-export commonly used types for convenience
pub use core::{config, Doge, WithdrawError};
pub use storage::{create_pool, get_connection, DbConnection, DbPool};
pub use withdraw::{WithdrawalLimits, WithdrawalReceipt, WithdrawalRequest, WithdrawalService};
