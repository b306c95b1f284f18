//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Security components produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through the trace span of every request
//! - Metric updates go through the `metrics` facade; with no exporter
//!   installed they are no-ops

pub mod logging;
pub mod metrics;
