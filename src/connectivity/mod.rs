//! Connectivity tracking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (health.rs):
//!     Clock-driven interval
//!     → GET probe target through the Transport
//!     → monitor.on_probe_result
//!
//! Passive signals (passive.rs):
//!     Platform interface up/down
//!     → monitor.on_passive_signal
//!
//! State machine (monitor.rs):
//!     Unknown → Connecting → Connected ⇄ Error
//!     any → Disconnected → Connecting
//! ```
//!
//! # Design Decisions
//! - Active and passive sources are independent tasks feeding one writer
//! - Disconnected means "no interface", Error means "backend unreachable"
//! - Passive signals take precedence over probe results

pub mod health;
pub mod monitor;
pub mod passive;
pub mod state;

pub use health::{HealthChecker, ProbeSettings};
pub use monitor::ConnectivityMonitor;
pub use state::{ConnectivityState, PassiveSignal, StateSnapshot, StateTransition};
