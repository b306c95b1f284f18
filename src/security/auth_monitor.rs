//! Authentication outcome monitoring.
//!
//! Observes requests under the authentication route prefix, keeps process-wide
//! outcome counters and flags suspicious failures. It never changes a
//! response.
//!
//! # Rollup
//! Counters are summarised and reset once more than `rollup_interval` has
//! elapsed since the window started. The check runs when a request arrives,
//! not on a timer, so a quiet period delays the next rollup until traffic
//! resumes.

use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{header, Method, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::config::AuthMonitorConfig;
use crate::observability::metrics;
use crate::security::path_within;

/// Largest error body inspected for an error code.
const MAX_INSPECTED_BODY: u64 = 16 * 1024;

/// User-agent fragments typical of scripted credential stuffing.
const AUTOMATION_MARKERS: &[&str] = &["python", "curl", "wget", "bot"];

/// Outcome counters for one rollup window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuthCounters {
    pub total_requests: u64,
    pub auth_successes: u64,
    pub auth_failures: u64,
    pub token_refreshes: u64,
    pub suspicious_activity: u64,
}

impl AuthCounters {
    /// Successes as a percentage of all requests, 0 when there were none.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.auth_successes as f64 / self.total_requests as f64 * 100.0
        }
    }
}

/// Summary emitted when a window is rolled up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthRollup {
    #[serde(flatten)]
    pub counters: AuthCounters,
    pub success_rate: f64,
    pub window_secs: u64,
}

/// Live view of the current window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthMetricsSnapshot {
    #[serde(flatten)]
    pub counters: AuthCounters,
    /// Unix time the window started.
    pub window_start: u64,
    /// Seconds since the last reset.
    pub elapsed_secs: u64,
}

/// Classification of one observed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Success,
    Refresh,
    Failure { suspicious: bool },
    Ignored,
}

impl AuthOutcome {
    fn label(&self) -> &'static str {
        match self {
            AuthOutcome::Success => "success",
            AuthOutcome::Refresh => "refresh",
            AuthOutcome::Failure { suspicious: true } => "suspicious_failure",
            AuthOutcome::Failure { suspicious: false } => "failure",
            AuthOutcome::Ignored => "other",
        }
    }
}

/// What the monitor sees of a completed request.
#[derive(Debug, Clone, Copy)]
pub struct ResponseObservation<'a> {
    pub path: &'a str,
    pub status: StatusCode,
    pub error_code: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

/// Tunables, resolved from [`AuthMonitorConfig`].
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub path_prefix: String,
    pub rollup_interval: Duration,
    pub slow_request: Duration,
    pub invalid_token_code: String,
    pub refresh_failed_code: String,
}

impl From<&AuthMonitorConfig> for MonitorSettings {
    fn from(config: &AuthMonitorConfig) -> Self {
        Self {
            path_prefix: config.path_prefix.clone(),
            rollup_interval: Duration::from_secs(config.rollup_interval_secs),
            slow_request: Duration::from_millis(config.slow_request_ms),
            invalid_token_code: config.invalid_token_code.clone(),
            refresh_failed_code: config.refresh_failed_code.clone(),
        }
    }
}

struct MonitorWindow {
    counters: AuthCounters,
    started: Instant,
    started_at: SystemTime,
}

impl MonitorWindow {
    fn starting(now: Instant) -> Self {
        Self {
            counters: AuthCounters::default(),
            started: now,
            started_at: SystemTime::now(),
        }
    }
}

/// Process-wide authentication anomaly monitor.
pub struct AuthAnomalyMonitor {
    settings: MonitorSettings,
    window: Mutex<MonitorWindow>,
}

impl AuthAnomalyMonitor {
    pub fn new(settings: MonitorSettings) -> Self {
        Self::starting_at(settings, Instant::now())
    }

    /// Create a monitor whose first window starts at `now`.
    pub fn starting_at(settings: MonitorSettings, now: Instant) -> Self {
        Self {
            settings,
            window: Mutex::new(MonitorWindow::starting(now)),
        }
    }

    pub fn from_config(config: &AuthMonitorConfig) -> Self {
        Self::new(MonitorSettings::from(config))
    }

    /// Whether `path` is an authentication route. The prefix matches whole
    /// path segments.
    pub fn applies_to(&self, path: &str) -> bool {
        path_within(path, &self.settings.path_prefix)
    }

    fn lock(&self) -> MutexGuard<'_, MonitorWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_request(&self) -> Option<AuthRollup> {
        self.record_request_at(Instant::now())
    }

    /// Count an arriving request, rolling up the previous window first if it
    /// has run past the interval.
    pub fn record_request_at(&self, now: Instant) -> Option<AuthRollup> {
        let mut window = self.lock();

        let elapsed = now.saturating_duration_since(window.started);
        let rollup = if elapsed > self.settings.rollup_interval {
            let counters = window.counters;
            let rollup = AuthRollup {
                counters,
                success_rate: counters.success_rate(),
                window_secs: elapsed.as_secs(),
            };
            tracing::info!(
                total_requests = counters.total_requests,
                auth_successes = counters.auth_successes,
                auth_failures = counters.auth_failures,
                token_refreshes = counters.token_refreshes,
                suspicious_activity = counters.suspicious_activity,
                success_rate = %format!("{:.2}%", rollup.success_rate),
                window_secs = rollup.window_secs,
                "Authentication metrics rollup"
            );
            *window = MonitorWindow::starting(now);
            Some(rollup)
        } else {
            None
        };

        window.counters.total_requests += 1;
        rollup
    }

    /// Classify a completed request and update the counters.
    pub fn record_response(&self, observation: &ResponseObservation<'_>) -> AuthOutcome {
        let status = observation.status;
        let path = observation.path;

        let outcome = if status.is_success() && (path.contains("login") || path.contains("register")) {
            AuthOutcome::Success
        } else if status.is_success() && path.contains("refresh") {
            AuthOutcome::Refresh
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            AuthOutcome::Failure {
                suspicious: self.is_suspicious(observation),
            }
        } else {
            AuthOutcome::Ignored
        };

        {
            let mut window = self.lock();
            let counters = &mut window.counters;
            match outcome {
                AuthOutcome::Success => counters.auth_successes += 1,
                AuthOutcome::Refresh => counters.token_refreshes += 1,
                AuthOutcome::Failure { suspicious } => {
                    counters.auth_failures += 1;
                    if suspicious {
                        counters.suspicious_activity += 1;
                    }
                }
                AuthOutcome::Ignored => {}
            }
        }

        if let AuthOutcome::Failure { suspicious: true } = outcome {
            tracing::warn!(
                path = %path,
                status = status.as_u16(),
                error_code = ?observation.error_code,
                user_agent = ?observation.user_agent,
                "Suspicious authentication activity"
            );
        }
        metrics::record_auth_event(outcome.label());

        outcome
    }

    /// Log requests slower than the threshold. Returns true when slow.
    pub fn record_duration(&self, method: &Method, path: &str, elapsed: Duration) -> bool {
        metrics::record_auth_duration(elapsed);
        let slow = elapsed > self.settings.slow_request;
        if slow {
            tracing::warn!(
                method = %method,
                path = %path,
                duration_ms = elapsed.as_millis() as u64,
                "Slow authentication request"
            );
        }
        slow
    }

    pub fn snapshot(&self) -> AuthMetricsSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> AuthMetricsSnapshot {
        let window = self.lock();
        AuthMetricsSnapshot {
            counters: window.counters,
            window_start: window
                .started_at
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            elapsed_secs: now.saturating_duration_since(window.started).as_secs(),
        }
    }

    fn is_suspicious(&self, observation: &ResponseObservation<'_>) -> bool {
        let code = observation.error_code;

        let invalid_token_burst = code == Some(self.settings.invalid_token_code.as_str())
            && is_high_frequency_request(observation);
        let refresh_failure = code == Some(self.settings.refresh_failed_code.as_str())
            && observation.path.contains("refresh");

        invalid_token_burst || refresh_failure || is_automation_agent(observation.user_agent)
    }
}

/// Placeholder: there is no per-client request frequency tracker, so this
/// never reports a burst.
fn is_high_frequency_request(_observation: &ResponseObservation<'_>) -> bool {
    false
}

/// Credential-stuffing profile: no user agent, or one from a script, a
/// command-line HTTP tool or a bot.
fn is_automation_agent(user_agent: Option<&str>) -> bool {
    match user_agent.map(str::trim).filter(|ua| !ua.is_empty()) {
        None => true,
        Some(ua) => {
            let ua = ua.to_ascii_lowercase();
            AUTOMATION_MARKERS.iter().any(|marker| ua.contains(marker))
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<String>,
}

/// Middleware observing authentication routes.
pub async fn auth_monitor_middleware(
    State(monitor): State<Arc<AuthAnomalyMonitor>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if !monitor.applies_to(&path) {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let started = Instant::now();
    monitor.record_request();

    let response = next.run(request).await;
    let status = response.status();

    let (response, error_code) = if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        read_error_code(response).await
    } else {
        (response, None)
    };

    monitor.record_response(&ResponseObservation {
        path: &path,
        status,
        error_code: error_code.as_deref(),
        user_agent: user_agent.as_deref(),
    });
    monitor.record_duration(&method, &path, started.elapsed());

    response
}

/// Pull the `code` field out of a small JSON error body, handing back an
/// identical response.
async fn read_error_code(response: Response) -> (Response, Option<String>) {
    let inspectable = response
        .body()
        .size_hint()
        .exact()
        .is_some_and(|len| len <= MAX_INSPECTED_BODY);
    if !inspectable {
        return (response, None);
    }

    let (parts, body) = response.into_parts();
    match axum::body::to_bytes(body, MAX_INSPECTED_BODY as usize).await {
        Ok(bytes) => {
            let code = serde_json::from_slice::<ErrorBody>(&bytes)
                .ok()
                .and_then(|body| body.code);
            (Response::from_parts(parts, Body::from(bytes)), code)
        }
        Err(err) => {
            tracing::warn!(error = %err, "Failed to read authentication error body");
            (Response::from_parts(parts, Body::empty()), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor_at(now: Instant) -> AuthAnomalyMonitor {
        AuthAnomalyMonitor::starting_at(MonitorSettings::from(&AuthMonitorConfig::default()), now)
    }

    fn observe<'a>(path: &'a str, status: StatusCode) -> ResponseObservation<'a> {
        ResponseObservation {
            path,
            status,
            error_code: None,
            user_agent: Some("Mozilla/5.0 (X11; Linux x86_64)"),
        }
    }

    #[test]
    fn test_success_and_refresh_classification() {
        let monitor = monitor_at(Instant::now());

        assert_eq!(monitor.record_response(&observe("/api/auth/login", StatusCode::OK)), AuthOutcome::Success);
        assert_eq!(monitor.record_response(&observe("/api/auth/register", StatusCode::CREATED)), AuthOutcome::Success);
        assert_eq!(monitor.record_response(&observe("/api/auth/refresh", StatusCode::OK)), AuthOutcome::Refresh);
        assert_eq!(monitor.record_response(&observe("/api/auth/me", StatusCode::OK)), AuthOutcome::Ignored);
        assert_eq!(
            monitor.record_response(&observe("/api/auth/login", StatusCode::INTERNAL_SERVER_ERROR)),
            AuthOutcome::Ignored
        );

        let counters = monitor.snapshot().counters;
        assert_eq!(counters.auth_successes, 2);
        assert_eq!(counters.token_refreshes, 1);
        assert_eq!(counters.auth_failures, 0);
    }

    #[test]
    fn test_failures_with_browser_agent_are_not_suspicious() {
        let monitor = monitor_at(Instant::now());
        assert_eq!(
            monitor.record_response(&observe("/api/auth/login", StatusCode::UNAUTHORIZED)),
            AuthOutcome::Failure { suspicious: false }
        );
        assert_eq!(
            monitor.record_response(&observe("/api/auth/login", StatusCode::FORBIDDEN)),
            AuthOutcome::Failure { suspicious: false }
        );
        let counters = monitor.snapshot().counters;
        assert_eq!(counters.auth_failures, 2);
        assert_eq!(counters.suspicious_activity, 0);
    }

    #[test]
    fn test_invalid_token_is_not_flagged_by_frequency_placeholder() {
        let monitor = monitor_at(Instant::now());
        let observation = ResponseObservation {
            error_code: Some("INVALID_TOKEN"),
            ..observe("/api/auth/me", StatusCode::UNAUTHORIZED)
        };
        assert_eq!(monitor.record_response(&observation), AuthOutcome::Failure { suspicious: false });
    }

    #[test]
    fn test_refresh_failure_is_suspicious_only_on_refresh_path() {
        let monitor = monitor_at(Instant::now());
        let on_refresh = ResponseObservation {
            error_code: Some("REFRESH_FAILED"),
            ..observe("/api/auth/refresh", StatusCode::UNAUTHORIZED)
        };
        assert_eq!(monitor.record_response(&on_refresh), AuthOutcome::Failure { suspicious: true });

        let elsewhere = ResponseObservation {
            error_code: Some("REFRESH_FAILED"),
            ..observe("/api/auth/login", StatusCode::UNAUTHORIZED)
        };
        assert_eq!(monitor.record_response(&elsewhere), AuthOutcome::Failure { suspicious: false });
        assert_eq!(monitor.snapshot().counters.suspicious_activity, 1);
    }

    #[test]
    fn test_automation_agents() {
        assert!(is_automation_agent(None));
        assert!(is_automation_agent(Some("  ")));
        assert!(is_automation_agent(Some("python-requests/2.31")));
        assert!(is_automation_agent(Some("curl/8.4.0")));
        assert!(is_automation_agent(Some("Googlebot/2.1")));
        assert!(!is_automation_agent(Some("Mozilla/5.0 (Macintosh) Safari/605.1.15")));

        let monitor = monitor_at(Instant::now());
        let observation = ResponseObservation {
            user_agent: None,
            ..observe("/api/auth/login", StatusCode::UNAUTHORIZED)
        };
        assert_eq!(monitor.record_response(&observation), AuthOutcome::Failure { suspicious: true });
    }

    #[test]
    fn test_success_rate() {
        assert_eq!(AuthCounters::default().success_rate(), 0.0);
        let counters = AuthCounters {
            total_requests: 4,
            auth_successes: 1,
            ..Default::default()
        };
        assert_eq!(counters.success_rate(), 25.0);
    }

    #[test]
    fn test_slow_request_threshold() {
        let monitor = monitor_at(Instant::now());
        assert!(!monitor.record_duration(&Method::POST, "/api/auth/login", Duration::from_millis(1000)));
        assert!(monitor.record_duration(&Method::POST, "/api/auth/login", Duration::from_millis(1001)));
    }

    #[test]
    fn test_one_rollup_per_elapsed_hour() {
        let start = Instant::now();
        let monitor = monitor_at(start);
        let minute = Duration::from_secs(60);

        // Traffic during the first hour.
        for i in 0..5 {
            assert!(monitor.record_request_at(start + minute * i).is_none());
        }
        monitor.record_response(&observe("/api/auth/login", StatusCode::OK));
        monitor.record_response(&observe("/api/auth/login", StatusCode::OK));
        monitor.record_response(&observe("/api/auth/refresh", StatusCode::OK));
        monitor.record_response(&observe("/api/auth/login", StatusCode::UNAUTHORIZED));
        assert!(monitor.record_request_at(start + minute * 60).is_none());

        let rollup = monitor
            .record_request_at(start + minute * 61)
            .expect("first hour should roll up");
        assert_eq!(
            rollup.counters,
            AuthCounters {
                total_requests: 6,
                auth_successes: 2,
                auth_failures: 1,
                token_refreshes: 1,
                suspicious_activity: 0,
            }
        );
        assert!((rollup.success_rate - 200.0 / 6.0).abs() < 1e-9);

        // The triggering request opens the new window.
        assert_eq!(monitor.snapshot_at(start + minute * 61).counters.total_requests, 1);
        assert_eq!(monitor.snapshot_at(start + minute * 61).elapsed_secs, 0);

        for m in 62..=121 {
            assert!(monitor.record_request_at(start + minute * m).is_none(), "minute {}", m);
        }
        let second = monitor.record_request_at(start + minute * 122).expect("second hour should roll up");
        assert_eq!(second.counters.total_requests, 61);
    }

    #[test]
    fn test_quiet_period_delays_rollup() {
        let start = Instant::now();
        let monitor = monitor_at(start);
        monitor.record_request_at(start);

        // Five idle hours produce a single rollup once traffic resumes.
        let resumed = start + Duration::from_secs(5 * 3600);
        let rollup = monitor.record_request_at(resumed).unwrap();
        assert_eq!(rollup.counters.total_requests, 1);
        assert_eq!(rollup.window_secs, 5 * 3600);
        assert!(monitor.record_request_at(resumed + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_applies_to_prefix() {
        let monitor = monitor_at(Instant::now());
        assert!(monitor.applies_to("/api/auth/login"));
        assert!(!monitor.applies_to("/api/services"));
        assert!(monitor.applies_to("/api/auth"));
        assert!(!monitor.applies_to("/api/authors"));
    }
}
