//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by status and backend
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_rate_limited_total` (counter): admissions refused
//! - `proxy_quarantined_total` (counter): backends moved to quarantine
//! - `proxy_recovered_total` (counter): backends returned to the pool
//! - `proxy_active_backends` / `proxy_quarantined_backends` (gauges)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(status: u16, backend: &str, start: Instant) {
    let labels = [
        ("status", status.to_string()),
        ("backend", backend.to_string()),
    ];
    counter!("proxy_requests_total", &labels).increment(1);
    histogram!("proxy_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    counter!("proxy_rate_limited_total").increment(1);
}

pub fn record_quarantined() {
    counter!("proxy_quarantined_total").increment(1);
}

pub fn record_recovered() {
    counter!("proxy_recovered_total").increment(1);
}

pub fn record_pool_sizes(active: usize, quarantined: usize) {
    gauge!("proxy_active_backends").set(active as f64);
    gauge!("proxy_quarantined_backends").set(quarantined as f64);
}
