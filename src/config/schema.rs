//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the marketplace guard.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Deployment-wide security settings.
    pub security: SecurityConfig,

    /// Per-client rate limiting.
    pub rate_limit: RateLimitConfig,

    /// CSRF protection.
    pub csrf: CsrfConfig,

    /// Authentication outcome monitoring.
    pub auth_monitor: AuthMonitorConfig,

    /// Session cookie settings.
    pub session: SessionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,

    /// Production mode: cookies are marked `Secure`.
    pub production: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
            production: false,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Fixed window length in seconds.
    pub window_secs: u64,

    /// How often expired entries are swept, in seconds.
    pub sweep_interval_secs: u64,

    /// Requests per window for admins.
    pub privileged_per_window: u32,

    /// Requests per window for other authenticated callers.
    pub authenticated_per_window: u32,

    /// Requests per window for anonymous callers.
    pub anonymous_per_window: u32,

    /// Key clients by the first `X-Forwarded-For` address.
    /// Only enable behind a proxy that sets the header.
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 60,
            sweep_interval_secs: 300,
            privileged_per_window: 100,
            authenticated_per_window: 30,
            anonymous_per_window: 10,
            trust_forwarded_for: true,
        }
    }
}

/// CSRF treatment of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutePolicy {
    Exempt,
    Enforced,
}

/// One entry of the CSRF route table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteRule {
    /// Path prefix, matched on whole segments.
    pub path_prefix: String,

    pub policy: RoutePolicy,
}

/// CSRF protection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Enable CSRF protection.
    pub enabled: bool,

    /// Name of the script-readable token cookie.
    pub cookie_name: String,

    /// Headers checked for the presented token, in priority order.
    pub header_names: Vec<String>,

    /// Body field checked when no header carries the token.
    pub body_field: String,

    /// Token cookie lifetime in seconds.
    pub cookie_max_age_secs: u64,

    /// Route policy table; the longest matching prefix wins.
    pub routes: Vec<RouteRule>,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        let exempt = |prefix: &str| RouteRule {
            path_prefix: prefix.to_string(),
            policy: RoutePolicy::Exempt,
        };

        Self {
            enabled: true,
            cookie_name: "csrf-token".to_string(),
            header_names: vec!["x-csrf-token".to_string(), "x-xsrf-token".to_string()],
            body_field: "_csrf".to_string(),
            cookie_max_age_secs: 24 * 60 * 60,
            routes: vec![
                exempt("/api/auth/login"),
                exempt("/api/auth/register"),
                exempt("/api/auth/refresh"),
                exempt("/api/webhooks"),
                exempt("/health"),
            ],
        }
    }
}

/// Authentication monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthMonitorConfig {
    /// Enable the monitor.
    pub enabled: bool,

    /// Route prefix of authentication endpoints.
    pub path_prefix: String,

    /// Minimum age of a window before it is rolled up, in seconds.
    pub rollup_interval_secs: u64,

    /// Requests slower than this are logged, in milliseconds.
    pub slow_request_ms: u64,

    /// Error code the account service returns for invalid tokens.
    pub invalid_token_code: String,

    /// Error code the account service returns for failed refreshes.
    pub refresh_failed_code: String,
}

impl Default for AuthMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path_prefix: "/api/auth".to_string(),
            rollup_interval_secs: 60 * 60,
            slow_request_ms: 1000,
            invalid_token_code: "INVALID_TOKEN".to_string(),
            refresh_failed_code: "REFRESH_FAILED".to_string(),
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the HttpOnly session cookie.
    pub cookie_name: String,

    /// Sessions unused for this long expire, in seconds.
    pub idle_timeout_secs: u64,

    /// How often idle sessions are swept, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "sid".to_string(),
            idle_timeout_secs: 24 * 60 * 60,
            sweep_interval_secs: 300,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level filter (trace, debug, info, warn, error or a directive list).
    pub log_level: String,

    /// Pretty output for development, JSON for production.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

/// Placeholder key rejected by validation when the admin API is enabled.
pub const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_API_KEY.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
