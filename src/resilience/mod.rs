//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Transport outcome:
//!     → classify.rs (status / transport failure → ClassifiedError)
//!     → policy.rs (retryable for this policy?)
//!     → backoff.rs (jittered exponential delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Classification is a fixed table; policies only widen the retryable set
//! - Jittered backoff prevents synchronized retry storms across clients
//! - Policies are immutable values

pub mod backoff;
pub mod classify;
pub mod policy;

pub use classify::{ClassifiedError, ErrorKind};
pub use policy::{PolicyError, RetryPolicy};
