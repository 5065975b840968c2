//! Withdrawal pipeline: reserve → build → sign → broadcast → settle.
//!
//! Funds are debited in the ledger before anything reaches the blockchain
//! API. A definite failure refunds the reservation; a broadcast whose outcome
//! is unknown keeps the funds reserved until an operator resolves it.

mod service;

pub use service::WithdrawalService;

use async_trait::async_trait;

use crate::core::amount::Doge;
use crate::core::config;

/// Ledger limits applied to every withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawalLimits {
    pub house_id: i64,
    pub minimum: Doge,
    /// Network fee paid out of the withdrawn amount
    pub fee: Doge,
}

impl WithdrawalLimits {
    pub fn from_env() -> Self {
        Self {
            house_id: *config::ledger::HOUSE_ACCOUNT_ID,
            minimum: *config::ledger::MIN_WITHDRAW,
            fee: *config::ledger::NETWORK_FEE,
        }
    }

    /// Smallest amount that can be withdrawn: the configured minimum, raised
    /// to `fee + 1 koinu` so the output value stays positive.
    pub fn effective_minimum(&self) -> Doge {
        if self.minimum > self.fee {
            self.minimum
        } else {
            self.fee.checked_add(Doge::from_koinu(1)).unwrap_or(self.fee)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub user_id: i64,
    pub address: String,
    /// Debited from the user; the destination receives `amount - fee`
    pub amount: Doge,
    /// Client-chosen key; the same key never produces a second transfer
    pub request_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalReceipt {
    pub withdrawal_id: i64,
    pub tx_hash: String,
    pub amount: Doge,
    pub fee: Doge,
    /// True when the receipt comes from an earlier request with the same key
    pub replayed: bool,
}

/// Operator decision for a withdrawal stuck in `reserved` or `unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The transaction is on chain with this hash
    Sent(String),
    /// The transaction never left; return the funds
    Refund,
}

/// Receives messages that need a human, e.g. admin chats.
#[async_trait]
pub trait OperatorAlert: Send + Sync {
    async fn alert(&self, text: &str);
}
