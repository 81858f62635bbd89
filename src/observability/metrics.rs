//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, auth, admission, key state)
//! - Expose a Prometheus-compatible scrape endpoint when configured
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, status
//! - `gateway_request_duration_seconds` (histogram): latency by route
//! - `gateway_upstream_failures_total` (counter): unreachable or timed-out backends
//! - `gateway_rate_limited_total` (counter): requests refused by admission
//! - `gateway_auth_rejections_total` (counter): protected-route refusals by reason
//! - `gateway_key_fetch_attempts_total` (counter): key fetches by outcome
//! - `gateway_key_ready` (gauge): 1 once the verification key is held
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so unit tests
//!   and the CLI never need an exporter
//! - Route labels use the route name, never the raw path

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);

    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed request.
pub fn record_request(route: &str, status: u16, start: Instant) {
    let route = route.to_string();
    counter!(
        "gateway_requests_total",
        "route" => route.clone(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_failure(route: &str) {
    counter!("gateway_upstream_failures_total", "route" => route.to_string()).increment(1);
}

pub fn record_rate_limited() {
    counter!("gateway_rate_limited_total").increment(1);
}

pub fn record_auth_rejection(reason: &'static str) {
    counter!("gateway_auth_rejections_total", "reason" => reason).increment(1);
}

pub fn record_key_fetch(outcome: &'static str) {
    counter!("gateway_key_fetch_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_key_ready(ready: bool) {
    gauge!("gateway_key_ready").set(if ready { 1.0 } else { 0.0 });
}
