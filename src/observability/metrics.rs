//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dev_proxy_requests_total` (counter): forwarded HTTP requests by service, status
//! - `dev_proxy_request_duration_seconds` (histogram): latency by service
//! - `dev_proxy_websocket_sessions_total` (counter): relayed sessions by service

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics recorder"),
    }
}

/// Record one forwarded HTTP request.
pub fn record_request(service: &str, method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "dev_proxy_requests_total",
        "service" => service.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "dev_proxy_request_duration_seconds",
        "service" => service.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record one WebSocket session accepted for relay.
pub fn record_websocket_session(service: &str) {
    metrics::counter!(
        "dev_proxy_websocket_sessions_total",
        "service" => service.to_string()
    )
    .increment(1);
}
