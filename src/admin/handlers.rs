use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;
use crate::security::auth_monitor::AuthMetricsSnapshot;
use crate::security::rate_limit::TierLimits;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub rate_limit_enabled: bool,
    pub csrf_enabled: bool,
    pub auth_monitor_enabled: bool,
    pub active_sessions: usize,
}

#[derive(Serialize)]
pub struct RateLimitSummary {
    pub window_secs: u64,
    pub tracked_keys: usize,
    pub limits: TierLimits,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let config = &state.config;
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        rate_limit_enabled: config.rate_limit.enabled,
        csrf_enabled: config.csrf.enabled,
        auth_monitor_enabled: config.auth_monitor.enabled,
        active_sessions: state.sessions.len(),
    })
}

pub async fn get_auth_metrics(State(state): State<AppState>) -> Json<AuthMetricsSnapshot> {
    Json(state.auth_monitor.snapshot())
}

pub async fn get_rate_limits(State(state): State<AppState>) -> Json<RateLimitSummary> {
    let limiter = &state.rate_limiter;
    Json(RateLimitSummary {
        window_secs: limiter.window().as_secs(),
        tracked_keys: limiter.tracked_keys(),
        limits: limiter.limits(),
    })
}
