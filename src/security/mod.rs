//! Request security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → identity.rs (attach caller identity, if the account service knows it)
//!     → rate_limit.rs (per-client fixed window, mutating methods only)
//!     → csrf.rs (double-submit token, state-changing methods only)
//!     → auth_monitor.rs (observe /api/auth/* outcomes)
//!     → handler
//!
//! Account creation / password change (external flow):
//!     → password.rs (policy validation + strength score)
//! ```
//!
//! # Design Decisions
//! - Each component owns its state and is constructed once at startup
//! - Fail closed: any failed check terminates the request
//! - The auth monitor is a pure observer and never fails a request

pub mod auth_monitor;
pub mod csrf;
pub mod error;
pub mod identity;
pub mod password;
pub mod rate_limit;

pub use auth_monitor::AuthAnomalyMonitor;
pub use csrf::CsrfGuard;
pub use error::{CsrfFailure, SecurityError};
pub use identity::{CallerIdentity, CallerTier, IdentityResolver, Role};
pub use rate_limit::RateLimiter;

/// Whether `path` is `prefix` or lies below it, on whole segments.
///
/// `/api/auth` covers `/api/auth` and `/api/auth/login` but not
/// `/api/authors`. A trailing `/` on the prefix is ignored.
pub(crate) fn path_within(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}
