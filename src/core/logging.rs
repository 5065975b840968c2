//! Logging initialization and configuration checking
//!
//! This module provides:
//! - Logger initialization (console + file)
//! - Wallet configuration check at startup (never prints secrets)

use anyhow::Result;
use simplelog::*;
use std::fs::OpenOptions;

use crate::core::config;

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `log_file_path` - Path to the log file (appended to, created if missing)
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Failed to open the file or a logger was already set
pub fn init_logger(log_file_path: &str) -> Result<()> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .map_err(|e| anyhow::anyhow!("Failed to open log file: {}", e))?;

    let config = ConfigBuilder::new()
        .add_filter_ignore_str("hyper")
        .add_filter_ignore_str("reqwest")
        .build();

    CombinedLogger::init(vec![
        TermLogger::new(LevelFilter::Info, config.clone(), TerminalMode::Mixed, ColorChoice::Auto),
        WriteLogger::new(LevelFilter::Info, config, log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Logs which hot wallet settings are present.
///
/// Withdrawals refuse to run without them, so a missing value is an error
/// line here rather than a surprise on the first /sacar.
pub fn log_wallet_configuration() {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("🐕 Hot Wallet Configuration Check");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut missing = Vec::new();

    match config::wallet::HOT_WALLET_ADDRESS.as_deref() {
        Some(address) => log::info!("✅ HOT_WALLET_ADDRESS: {}", address),
        None => missing.push("HOT_WALLET_ADDRESS"),
    }

    if config::wallet::HOT_WALLET_PRIVATE_KEY.is_some() {
        log::info!("✅ HOT_WALLET_PRIVATE_KEY: set");
    } else {
        missing.push("HOT_WALLET_PRIVATE_KEY");
    }

    if config::wallet::BLOCKCYPHER_TOKEN.is_some() {
        log::info!("✅ BLOCKCYPHER_TOKEN: set");
    } else {
        missing.push("BLOCKCYPHER_TOKEN");
    }

    log::info!("   API: {}", config::wallet::BLOCKCYPHER_BASE_URL.as_str());
    log::info!(
        "   House account: {}, min withdraw: {} DOGE, fee: {} DOGE",
        *config::ledger::HOUSE_ACCOUNT_ID,
        *config::ledger::MIN_WITHDRAW,
        *config::ledger::NETWORK_FEE
    );

    if missing.is_empty() {
        log::info!("✅ Withdrawals enabled");
    } else {
        for name in &missing {
            log::error!("❌ {}: not set", name);
        }
        log::error!("❌ Withdrawals will be REFUSED until the variables above are set");
    }
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}
