//! Time source abstraction.
//!
//! Backoff sleeps, health probe scheduling and queue TTL checks go through
//! [`Clock`] so tests can run on tokio's paused clock or substitute their own.

use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::time::Instant;

/// Monotonic time and schedulable delays.
pub trait Clock: Send + Sync {
    /// Current monotonic instant.
    fn now(&self) -> Instant;

    /// Suspend for `duration`.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Clock backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}
