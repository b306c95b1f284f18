//! HTTP integration subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (router, middleware stack, serving)
//!     → session.rs (attach the caller's session)
//!     → [security middleware]
//!     → handlers.rs (guard's own endpoints) or mounted routes
//! ```

pub mod cookie;
pub mod handlers;
pub mod server;
pub mod session;
pub mod tls;

pub use server::{AppState, GuardServer};
pub use session::{Session, SessionStore};
