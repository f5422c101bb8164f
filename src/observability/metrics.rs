//! Metrics collection and exposition.
//!
//! # Metrics
//! - `harness_connections_total` (counter): accepted connections by listener
//! - `harness_udp_datagrams_total` (counter): datagrams echoed
//! - `harness_connection_resets_total` (counter): hard resets by listener
//! - `harness_open_connections` (gauge): open connections by listener
//! - `harness_http_requests_total` (counter): debug requests by method, status
//! - `harness_http_request_duration_seconds` (histogram): debug request latency
//!
//! Without an installed recorder every call is a no-op, which is what the
//! tests rely on.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);

    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection(listener: &'static str) {
    metrics::counter!("harness_connections_total", "listener" => listener).increment(1);
}

pub fn record_open_connections(listener: &'static str, open: u64) {
    metrics::gauge!("harness_open_connections", "listener" => listener).set(open as f64);
}

pub fn record_reset(listener: &'static str) {
    metrics::counter!("harness_connection_resets_total", "listener" => listener).increment(1);
}

pub fn record_datagram(bytes: usize) {
    metrics::counter!("harness_udp_datagrams_total").increment(1);
    metrics::counter!("harness_udp_bytes_total").increment(bytes as u64);
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let latency = start.elapsed().as_secs_f64();

    metrics::counter!(
        "harness_http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "harness_http_request_duration_seconds",
        "method" => method.to_string()
    )
    .record(latency);
}
