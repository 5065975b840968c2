//! Metrics collection using Prometheus
//!
//! Tracks withdrawal outcomes, DOGE paid out, ad rewards, command usage and
//! blockchain API latency. Exposed by the web server at `/metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, register_int_counter_vec, CounterVec,
    Encoder, HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    /// Finished withdrawal attempts
    /// Labels: outcome (sent/replayed/failed/unknown/<error kind>)
    pub static ref WITHDRAWALS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "dogeads_withdrawals_total",
        "Withdrawal attempts by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Koinu that left the hot wallet (amount including fee)
    pub static ref WITHDRAWN_KOINU_TOTAL: IntCounter = register_int_counter!(
        "dogeads_withdrawn_koinu_total",
        "Koinu debited for successfully broadcast withdrawals"
    )
    .unwrap();

    /// Ad rewards credited
    pub static ref AD_REWARDS_TOTAL: IntCounter = register_int_counter!(
        "dogeads_ad_rewards_total",
        "Ad views rewarded"
    )
    .unwrap();

    /// Bot commands handled
    /// Labels: command
    pub static ref COMMANDS_TOTAL: CounterVec = register_counter_vec!(
        "dogeads_commands_total",
        "Bot commands handled",
        &["command"]
    )
    .unwrap();

    /// Blockchain API latency
    /// Labels: operation (create/broadcast)
    pub static ref BLOCKCHAIN_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "dogeads_blockchain_request_duration_seconds",
        "Time spent in blockchain API calls",
        &["operation"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();

    /// Retried blockchain API calls
    /// Labels: operation
    pub static ref API_RETRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "dogeads_api_retries_total",
        "Retried blockchain API calls",
        &["operation"]
    )
    .unwrap();
}

/// Touch every metric so the exposition lists them before the first event.
pub fn init_metrics() {
    lazy_static::initialize(&WITHDRAWALS_TOTAL);
    lazy_static::initialize(&WITHDRAWN_KOINU_TOTAL);
    lazy_static::initialize(&AD_REWARDS_TOTAL);
    lazy_static::initialize(&COMMANDS_TOTAL);
    lazy_static::initialize(&BLOCKCHAIN_REQUEST_DURATION_SECONDS);
    lazy_static::initialize(&API_RETRIES_TOTAL);
    log::info!("Metrics registry initialized");
}

pub fn record_command(command: &str) {
    COMMANDS_TOTAL.with_label_values(&[command]).inc();
}

pub fn record_withdrawal(outcome: &str) {
    WITHDRAWALS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Renders all registered metrics in Prometheus text format.
pub fn render() -> Result<(String, String), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok((encoder.format_type().to_string(), String::from_utf8_lossy(&buffer).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_withdrawal_counter() {
        init_metrics();
        record_withdrawal("sent");
        let (content_type, body) = render().unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(body.contains("dogeads_withdrawals_total"));
    }
}
