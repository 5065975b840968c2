//! Hot wallet: credentials, signing and the blockchain API client

pub mod client;
pub mod signer;

use secrecy::{ExposeSecret, SecretString};

use crate::core::config;
use crate::core::error::WithdrawError;

pub use client::{BlockCypherClient, ChainApi, ChainError, Transfer, TxSkeleton};
pub use signer::{validate_doge_address, HouseKey};

/// Raw, unvalidated wallet settings as read from the environment.
#[derive(Clone, Default)]
pub struct WalletSettings {
    pub address: Option<String>,
    pub private_key: Option<SecretString>,
    pub api_token: Option<SecretString>,
}

impl WalletSettings {
    pub fn from_env() -> Self {
        Self {
            address: config::wallet::HOT_WALLET_ADDRESS.clone(),
            private_key: config::wallet::HOT_WALLET_PRIVATE_KEY.clone(),
            api_token: config::wallet::BLOCKCYPHER_TOKEN.clone(),
        }
    }
}

/// Validated credentials needed to sign and broadcast a withdrawal.
#[derive(Debug)]
pub struct WalletCredentials {
    pub address: String,
    pub key: HouseKey,
}

impl WalletCredentials {
    /// Checks presence of every credential and parses the key.
    ///
    /// Runs before any ledger or network activity so a misconfigured
    /// deployment never reserves funds it cannot send.
    pub fn validate(settings: &WalletSettings) -> Result<Self, WithdrawError> {
        let address = settings
            .address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or(WithdrawError::MissingCredential("HOT_WALLET_ADDRESS"))?;
        let private_key = settings
            .private_key
            .as_ref()
            .ok_or(WithdrawError::MissingCredential("HOT_WALLET_PRIVATE_KEY"))?;
        if settings.api_token.is_none() {
            return Err(WithdrawError::MissingCredential("BLOCKCYPHER_TOKEN"));
        }

        let key = HouseKey::from_hex(private_key.expose_secret())?;
        Ok(Self {
            address: address.to_string(),
            key,
        })
    }

    /// Same as [`validate`](Self::validate) on the process environment.
    pub fn from_env() -> Result<Self, WithdrawError> {
        Self::validate(&WalletSettings::from_env())
    }
}
