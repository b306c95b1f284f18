//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → shutdown_signal() resolves
//!
//! Shutdown (shutdown.rs):
//!     trigger() → HTTP servers stop accepting and drain
//!               → rate limit and session sweepers exit
//!
//! Sweepers (sweeper.rs):
//!     interval tick → drop expired entries from an in-memory table
//! ```

pub mod shutdown;
pub mod signals;
pub mod sweeper;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
pub use sweeper::{spawn_sweeper, SweeperHandle};
