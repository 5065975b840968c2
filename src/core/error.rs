use thiserror::Error;

use crate::core::amount::{AmountError, Doge};

/// Centralized error types for the application
///
/// Everything outside the withdrawal pipeline is converted to this enum.
/// Uses `thiserror` for automatic error conversion and display formatting.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// Anyhow errors (for general error handling)
    #[error("Application error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

/// Failures of the withdrawal pipeline.
///
/// Variants are split by where the pipeline stopped, so callers can tell a
/// user mistake from an upstream outage from a state that needs an operator.
#[derive(Error, Debug)]
pub enum WithdrawError {
    #[error("wallet credential {0} is not configured")]
    MissingCredential(&'static str),

    #[error("hot wallet private key is invalid: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid destination address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    #[error("amount {amount} is below the minimum of {minimum}")]
    BelowMinimum { amount: Doge, minimum: Doge },

    #[error("user {0} is not registered")]
    UnknownUser(i64),

    #[error("user balance {available} is lower than {requested}")]
    InsufficientUserBalance { available: Doge, requested: Doge },

    #[error("house balance {available} is lower than {requested}")]
    InsufficientHouseBalance { available: Doge, requested: Doge },

    #[error("withdrawal {0} is already being processed")]
    InProgress(i64),

    #[error("withdrawal cooldown active for another {0}s")]
    Cooldown(u64),

    #[error("request key reused with different parameters: {0}")]
    DuplicateRequest(String),

    #[error("blockchain API unreachable: {0}")]
    Network(String),

    #[error("blockchain API rejected the request: {0}")]
    ApiRejected(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("broadcast outcome unknown for withdrawal {id}: {reason}")]
    BroadcastUnknown { id: i64, reason: String },

    #[error("ledger error: {0}")]
    Ledger(String),
}

impl WithdrawError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            WithdrawError::MissingCredential(_) => "missing_credential",
            WithdrawError::InvalidPrivateKey(_) => "invalid_private_key",
            WithdrawError::InvalidAddress(_) => "invalid_address",
            WithdrawError::InvalidAmount(_) => "invalid_amount",
            WithdrawError::BelowMinimum { .. } => "below_minimum",
            WithdrawError::UnknownUser(_) => "unknown_user",
            WithdrawError::InsufficientUserBalance { .. } => "insufficient_user_balance",
            WithdrawError::InsufficientHouseBalance { .. } => "insufficient_house_balance",
            WithdrawError::InProgress(_) => "in_progress",
            WithdrawError::Cooldown(_) => "cooldown",
            WithdrawError::DuplicateRequest(_) => "duplicate_request",
            WithdrawError::Network(_) => "network",
            WithdrawError::ApiRejected(_) => "api_rejected",
            WithdrawError::Signing(_) => "signing",
            WithdrawError::BroadcastUnknown { .. } => "broadcast_unknown",
            WithdrawError::Ledger(_) => "ledger",
        }
    }

    /// Text shown to the chat user. Operator details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            WithdrawError::MissingCredential(_) | WithdrawError::InvalidPrivateKey(_) => {
                "⚠️ Saques estão temporariamente indisponíveis.".to_string()
            }
            WithdrawError::InvalidAddress(_) => "⚠️ Endereço DOGE inválido.".to_string(),
            WithdrawError::InvalidAmount(_) => "⚠️ Valor inválido. Envie apenas o número, ex: 10 ou 2.5".to_string(),
            WithdrawError::BelowMinimum { minimum, .. } => {
                format!("⚠️ O valor mínimo para saque é {} DOGE.", minimum)
            }
            WithdrawError::UnknownUser(_) => "⚠️ Você ainda não tem conta. Use /start".to_string(),
            WithdrawError::InsufficientUserBalance { available, .. } => {
                format!("⚠️ Saldo insuficiente. Seu saldo: {} DOGE", available)
            }
            WithdrawError::InsufficientHouseBalance { .. } => {
                "⚠️ A carteira do bot está sem fundos no momento. Tente mais tarde.".to_string()
            }
            WithdrawError::InProgress(_) => "⏳ Seu saque já está sendo processado.".to_string(),
            WithdrawError::Cooldown(secs) => format!("⏳ Aguarde {} segundos antes de um novo saque.", secs),
            WithdrawError::DuplicateRequest(_) => "⚠️ Pedido de saque duplicado. Comece de novo com /sacar".to_string(),
            WithdrawError::Network(_) | WithdrawError::ApiRejected(_) | WithdrawError::Signing(_) => {
                "⚠️ Não foi possível processar o saque. Seu saldo não foi alterado.".to_string()
            }
            WithdrawError::BroadcastUnknown { .. } | WithdrawError::Ledger(_) => {
                "⏳ Seu saque está em verificação. Um administrador foi avisado.".to_string()
            }
        }
    }

    /// Transient upstream failures that are safe to repeat.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WithdrawError::Network(_))
    }

    /// True when the ledger still holds the reservation and an operator must look.
    pub fn needs_operator(&self) -> bool {
        matches!(self, WithdrawError::BroadcastUnknown { .. } | WithdrawError::Ledger(_))
    }
}

impl From<rusqlite::Error> for WithdrawError {
    fn from(err: rusqlite::Error) -> Self {
        WithdrawError::Ledger(err.to_string())
    }
}

impl From<r2d2::Error> for WithdrawError {
    fn from(err: r2d2::Error) -> Self {
        WithdrawError::Ledger(err.to_string())
    }
}
