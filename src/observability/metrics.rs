//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_rate_limited_total` (counter): rejections by caller tier
//! - `guard_rate_limit_entries` (gauge): tracked client windows after a sweep
//! - `guard_csrf_failures_total` (counter): failures by internal reason
//! - `guard_csrf_tokens_issued_total` (counter): tokens bound to sessions
//! - `guard_sessions` (gauge): stored sessions after a sweep
//! - `guard_auth_events_total` (counter): auth outcomes by classification
//! - `guard_request_duration_seconds` (histogram): auth route latency

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

pub fn record_rate_limited(tier: &'static str) {
    ::metrics::counter!("guard_rate_limited_total", "tier" => tier).increment(1);
}

pub fn record_rate_limit_entries(entries: usize) {
    ::metrics::gauge!("guard_rate_limit_entries").set(entries as f64);
}

pub fn record_csrf_failure(reason: &'static str) {
    ::metrics::counter!("guard_csrf_failures_total", "reason" => reason).increment(1);
}

pub fn record_csrf_token_issued() {
    ::metrics::counter!("guard_csrf_tokens_issued_total").increment(1);
}

pub fn record_sessions(sessions: usize) {
    ::metrics::gauge!("guard_sessions").set(sessions as f64);
}

pub fn record_auth_event(outcome: &'static str) {
    ::metrics::counter!("guard_auth_events_total", "outcome" => outcome).increment(1);
}

pub fn record_auth_duration(elapsed: Duration) {
    ::metrics::histogram!("guard_request_duration_seconds").record(elapsed.as_secs_f64());
}
