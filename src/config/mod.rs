//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GuardConfig (validated, immutable)
//!     → components built from it at startup
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps the rate limit tiers in place
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Only rate limit tiers are hot-reloadable; everything else needs a restart
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, AuthMonitorConfig, CsrfConfig, GuardConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, RateLimitConfig, RoutePolicy, RouteRule, SecurityConfig, SessionConfig,
    TimeoutConfig, TlsConfig,
};
pub use validation::{validate_config, ValidationError};
