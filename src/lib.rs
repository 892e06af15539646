//! Resilient connectivity and retry layer.
//!
//! ```text
//!   caller
//!     │ execute(op, policy)
//!     ▼
//! ┌──────────────┐  current_state()  ┌─────────────────────┐ ◀── passive signals
//! │  executor    │ ────────────────▶ │ ConnectivityMonitor │ ◀── HealthChecker probes
//! └──────┬───────┘                   └──────────┬──────────┘
//!        │ attempts + backoff                   │ Disconnected/Error → Connected
//!        ▼                                      ▼
//! ┌──────────────┐   queueable op    ┌─────────────────────┐
//! │  Transport   │ ◀──────────────── │    OfflineQueue     │
//! └──────────────┘      replay       └─────────────────────┘
//! ```

pub mod clock;
pub mod config;
pub mod connectivity;
pub mod executor;
pub mod lifecycle;
pub mod observability;
pub mod queue;
pub mod resilience;
pub mod service;
pub mod transport;

pub use clock::{Clock, TokioClock};
pub use config::ClientConfig;
pub use connectivity::{ConnectivityMonitor, ConnectivityState, PassiveSignal};
pub use executor::{BatchOutcome, Operation, RequestExecutor};
pub use queue::{DrainReport, OfflineQueue, OperationDescriptor};
pub use resilience::{ClassifiedError, ErrorKind, RetryPolicy};
pub use service::ConnectivityService;
pub use transport::{HttpTransport, Method, Request, Response, Transport, TransportError};
