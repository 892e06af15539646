//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (service.rs):
//!     Load config → Validate → Build monitor/queue/executor → Spawn tasks
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop probes and reconnect trigger → Await in-flight drain → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - A drain pass that already started is allowed to finish
//! - No new probes or drains are scheduled after shutdown

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
