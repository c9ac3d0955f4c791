//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, stream events, sessions)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): relayed requests by provider, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_stream_events_total` (counter): forwarded SSE events by provider
//! - `gateway_live_sessions` (gauge): currently open duplex sessions
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Provider label, never per-model (bounded cardinality)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus exporter on the given address.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one relayed request (unary or stream open).
pub fn record_request(provider: &'static str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "provider" => provider,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "provider" => provider)
        .record(start.elapsed().as_secs_f64());
}

/// Record one forwarded server-sent event.
pub fn record_stream_event(provider: &'static str) {
    counter!("gateway_stream_events_total", "provider" => provider).increment(1);
}

/// A duplex session reached `OPEN`.
pub fn live_session_opened() {
    gauge!("gateway_live_sessions").increment(1.0);
}

/// An open duplex session tore down.
pub fn live_session_closed() {
    gauge!("gateway_live_sessions").decrement(1.0);
}
