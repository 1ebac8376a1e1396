//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define transport metrics
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `p2p_handshakes_total` (counter): handshakes by role and outcome
//! - `p2p_messages_received_total` (counter): messages queued for the consumer
//! - `p2p_messages_sent_total` (counter): messages written to peers
//! - `p2p_decode_errors_total` (counter): frames skipped as undecodable
//! - `p2p_reaped_connections_total` (counter): connections evicted as stale
//! - `p2p_accept_errors_total` (counter): failed accepts on the listener
//! - `p2p_active_connections` (gauge): current connection table size
//! - `p2p_known_peers` (gauge): current peer directory size
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests never need one
//! - Labels are fixed, low-cardinality strings (never peer ids)

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record a finished handshake. `outcome` is `"ok"` or a failure kind.
pub fn record_handshake(role: &'static str, outcome: &'static str) {
    ::metrics::counter!("p2p_handshakes_total", "role" => role, "outcome" => outcome).increment(1);
}

pub fn record_message_received() {
    ::metrics::counter!("p2p_messages_received_total").increment(1);
}

pub fn record_message_sent() {
    ::metrics::counter!("p2p_messages_sent_total").increment(1);
}

pub fn record_decode_error() {
    ::metrics::counter!("p2p_decode_errors_total").increment(1);
}

pub fn record_reaped(count: usize) {
    ::metrics::counter!("p2p_reaped_connections_total").increment(count as u64);
}

pub fn record_accept_error() {
    ::metrics::counter!("p2p_accept_errors_total").increment(1);
}

pub fn set_active_connections(count: usize) {
    ::metrics::gauge!("p2p_active_connections").set(count as f64);
}

pub fn set_known_peers(count: usize) {
    ::metrics::gauge!("p2p_known_peers").set(count as f64);
}
