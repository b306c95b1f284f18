//! Marketplace Guard
//!
//! HTTP request security layer for a multi-tenant service marketplace:
//! tiered rate limiting, CSRF protection, authentication anomaly monitoring
//! and password policy enforcement.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::GuardConfig;
pub use http::GuardServer;
pub use lifecycle::Shutdown;
