//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_decisions_total` (counter): verdicts by `decision` and `reason`
//! - `gateway_policy_refresh_total` (counter): store reads by `outcome`
//! - `gateway_policy_rules` (gauge): rules in the current snapshot
//! - `gateway_upstream_requests_total` (counter): relayed requests by `status`
//! - `gateway_upstream_duration_seconds` (histogram): upstream latency

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_decision(decision: &'static str, reason: &'static str) {
    counter!("gateway_decisions_total", "decision" => decision, "reason" => reason).increment(1);
}

pub fn record_policy_refresh(success: bool, rules: usize) {
    let outcome = if success { "success" } else { "failure" };
    counter!("gateway_policy_refresh_total", "outcome" => outcome).increment(1);
    if success {
        gauge!("gateway_policy_rules").set(rules as f64);
    }
}

/// `status` is the upstream status code, or `None` on a transport error.
pub fn record_upstream(status: Option<u16>, start: Instant) {
    let status = status.map_or_else(|| "error".to_string(), |s| s.to_string());
    counter!("gateway_upstream_requests_total", "status" => status).increment(1);
    histogram!("gateway_upstream_duration_seconds").record(start.elapsed().as_secs_f64());
}
