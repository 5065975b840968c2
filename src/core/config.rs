use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Database file path
/// Read from DATABASE_PATH environment variable
/// Default: dogeads.sqlite
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "dogeads.sqlite".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: dogeads.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "dogeads.log".to_string()));

/// Bot token
/// Read from BOT_TOKEN or TELOXIDE_TOKEN environment variable
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .unwrap_or_else(|_| String::new())
});

/// Public base URL for webhook mode, e.g. https://bot.example.com
/// Read from WEBHOOK_URL environment variable
pub static WEBHOOK_URL: Lazy<Option<String>> = Lazy::new(|| non_empty_var("WEBHOOK_URL"));

/// HTTP port shared by the withdraw API, metrics and the webhook
/// Read from PORT environment variable
/// Default: 3000
pub static PORT: Lazy<u16> = Lazy::new(|| {
    env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000)
});

/// Bearer key required by POST /api/withdraw
/// Read from API_KEY environment variable; unset leaves the endpoint open
pub static API_KEY: Lazy<Option<String>> = Lazy::new(|| non_empty_var("API_KEY"));

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Hot wallet and blockchain API configuration
pub mod wallet {
    use once_cell::sync::Lazy;
    use secrecy::SecretString;
    use std::env;

    /// House DOGE address that funds every withdrawal
    /// Read from HOT_WALLET_ADDRESS environment variable
    pub static HOT_WALLET_ADDRESS: Lazy<Option<String>> = Lazy::new(|| super::non_empty_var("HOT_WALLET_ADDRESS"));

    /// Raw secp256k1 private key of the house address, 64 hex characters
    /// Read from HOT_WALLET_PRIVATE_KEY environment variable
    pub static HOT_WALLET_PRIVATE_KEY: Lazy<Option<SecretString>> =
        Lazy::new(|| super::non_empty_var("HOT_WALLET_PRIVATE_KEY").map(SecretString::from));

    /// BlockCypher API token
    /// Read from BLOCKCYPHER_TOKEN environment variable
    pub static BLOCKCYPHER_TOKEN: Lazy<Option<SecretString>> =
        Lazy::new(|| super::non_empty_var("BLOCKCYPHER_TOKEN").map(SecretString::from));

    /// BlockCypher chain endpoint
    /// Read from BLOCKCYPHER_BASE_URL environment variable
    pub static BLOCKCYPHER_BASE_URL: Lazy<String> = Lazy::new(|| {
        env::var("BLOCKCYPHER_BASE_URL").unwrap_or_else(|_| "https://api.blockcypher.com/v1/doge/main".to_string())
    });
}

/// Ledger and withdrawal limits
pub mod ledger {
    use once_cell::sync::Lazy;
    use std::env;

    use crate::core::amount::Doge;

    /// Ledger row that mirrors the hot wallet
    /// Read from HOUSE_ACCOUNT_ID environment variable
    /// Default: 0
    pub static HOUSE_ACCOUNT_ID: Lazy<i64> = Lazy::new(|| {
        env::var("HOUSE_ACCOUNT_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    });

    fn doge_var(name: &str, default: Doge) -> Doge {
        env::var(name)
            .ok()
            .and_then(|v| v.parse::<Doge>().ok())
            .unwrap_or(default)
    }

    /// Smallest amount a user may withdraw
    /// Read from MIN_WITHDRAW_DOGE environment variable
    /// Default: 1 DOGE
    pub static MIN_WITHDRAW: Lazy<Doge> =
        Lazy::new(|| doge_var("MIN_WITHDRAW_DOGE", Doge::from_koinu(100_000_000)));

    /// Network fee deducted from the withdrawn amount
    /// Read from NETWORK_FEE_DOGE environment variable
    /// Default: 0.5 DOGE
    pub static NETWORK_FEE: Lazy<Doge> = Lazy::new(|| doge_var("NETWORK_FEE_DOGE", Doge::from_koinu(50_000_000)));
}

/// Rate limiting configuration
pub mod rate_limit {
    use once_cell::sync::Lazy;
    use std::env;
    use std::time::Duration;

    /// Seconds between two withdrawals of the same user
    /// Read from WITHDRAW_COOLDOWN_SECS environment variable
    /// Default: 60
    pub static WITHDRAW_COOLDOWN_SECS: Lazy<u64> = Lazy::new(|| {
        env::var("WITHDRAW_COOLDOWN_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60)
    });

    pub fn withdraw_cooldown() -> Duration {
        Duration::from_secs(*WITHDRAW_COOLDOWN_SECS)
    }
}

/// Withdrawal dialog configuration
pub mod session {
    use once_cell::sync::Lazy;
    use std::env;
    use std::time::Duration;

    /// Idle dialogs are dropped after this many seconds
    /// Read from SESSION_TTL_SECS environment variable
    /// Default: 600
    pub static SESSION_TTL_SECS: Lazy<u64> = Lazy::new(|| {
        env::var("SESSION_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(600)
    });

    pub fn ttl() -> Duration {
        Duration::from_secs(*SESSION_TTL_SECS)
    }
}

/// Retry configuration
pub mod retry {
    use super::Duration;

    /// Maximum number of retries for dispatcher reconnection
    pub const MAX_DISPATCHER_RETRIES: u32 = 5;

    /// Delay between dispatcher retry attempts (in seconds)
    pub const DISPATCHER_RETRY_DELAY_SECS: u64 = 5;

    /// Base (in seconds) of the backoff after a dispatcher panic
    pub const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

    /// Startup attempts to reach the Bot API before giving up
    pub const STARTUP_MAX_RETRIES: u32 = 60;

    /// Dispatcher retry delay duration
    pub fn dispatcher_delay() -> Duration {
        Duration::from_secs(DISPATCHER_RETRY_DELAY_SECS)
    }
}

/// Network configuration
pub mod network {
    use super::Duration;

    /// Request timeout for Telegram and blockchain HTTP requests (in seconds)
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;

    /// Request timeout duration
    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}

/// Admin configuration
pub mod admin {
    use once_cell::sync::Lazy;
    use std::env;

    fn parse_admin_ids(raw: &str) -> Vec<i64> {
        raw.split([',', ' ', '\n', '\t'])
            .filter_map(|part| part.trim().parse::<i64>().ok())
            .collect()
    }

    /// Admin user IDs (comma-separated)
    /// Read from ADMIN_IDS environment variable
    pub static ADMIN_IDS: Lazy<Vec<i64>> = Lazy::new(|| {
        env::var("ADMIN_IDS")
            .ok()
            .map(|raw| parse_admin_ids(&raw))
            .unwrap_or_default()
    });

    pub fn is_admin(user_id: i64) -> bool {
        ADMIN_IDS.contains(&user_id)
    }

}
