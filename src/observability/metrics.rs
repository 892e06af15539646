//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define connectivity metrics (state, attempts, retries, queue depth)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `link_state_transitions_total` (counter): transitions by target state
//! - `link_connected` (gauge): 1=connected, 0=otherwise
//! - `link_request_attempts_total` (counter): transport attempts
//! - `link_retries_total` (counter): retries by error kind
//! - `link_request_failures_total` (counter): final failures by error kind
//! - `link_queue_depth` (gauge): queued offline operations
//! - `link_queue_evictions_total` (counter): evictions by reason
//! - `link_drain_operations_total` (counter): drain outcomes by result
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Labels are low-cardinality enum names only

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_state_transition(state: &'static str, connected: bool) {
    counter!("link_state_transitions_total", "state" => state).increment(1);
    gauge!("link_connected").set(if connected { 1.0 } else { 0.0 });
}

pub fn record_attempt() {
    counter!("link_request_attempts_total").increment(1);
}

pub fn record_retry(kind: &'static str) {
    counter!("link_retries_total", "kind" => kind).increment(1);
}

pub fn record_request_failure(kind: &'static str) {
    counter!("link_request_failures_total", "kind" => kind).increment(1);
}

pub fn record_queue_depth(depth: usize) {
    gauge!("link_queue_depth").set(depth as f64);
}

pub fn record_queue_eviction(reason: &'static str) {
    counter!("link_queue_evictions_total", "reason" => reason).increment(1);
}

pub fn record_drain_outcome(result: &'static str, count: usize) {
    counter!("link_drain_operations_total", "result" => result).increment(count as u64);
}
