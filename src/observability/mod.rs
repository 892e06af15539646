//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! monitor / executor / queue produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log output (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - State transitions and retries log at info; data loss logs at warn
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
