//! Offline operation queue.
//!
//! # Data Flow
//! ```text
//! executor (Disconnected, queueable op) / application code
//!     → enqueue (evict oldest when full)
//!
//! reconnect trigger (single background consumer)
//!     → drain
//!         1. evict entries older than ttl
//!         2. replay each remaining entry once, FIFO
//!         3. success → remove
//!         4. failure → attempts += 1; drop at max_attempts, else move to tail
//! ```
//!
//! # Design Decisions
//! - Bounded: capacity enforced on every enqueue, data loss logged at warn
//! - One mutex guards the items; it is never held across a replay await
//! - Single-flight drain: a second drain while one runs returns `None`
//! - Failed entries move to the tail so a poison entry cannot block the head
//! - An entry evicted while its replay is in flight is still reported:
//!   success counts as `succeeded`, failure lands in `dropped`
//! - Replay is at-least-once; descriptors must be idempotent
//! - In-memory only

pub mod descriptor;
pub mod replay;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::QueueConfig;
use crate::observability::metrics;

pub use descriptor::OperationDescriptor;
pub use replay::{replay_fn, OperationHandler, ReplayError, Replayer, TransportReplayer};

/// Queue bounds in runtime form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    pub capacity: usize,
    pub ttl: Duration,
}

impl From<&QueueConfig> for QueueSettings {
    fn from(config: &QueueConfig) -> Self {
        Self {
            capacity: config.capacity,
            ttl: Duration::from_secs(config.ttl_secs),
        }
    }
}

/// A deferred unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedOperation {
    pub id: Uuid,
    pub enqueued_at: Instant,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub descriptor: OperationDescriptor,
}

/// An operation removed without being delivered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedOperation {
    pub id: Uuid,
    pub label: String,
    pub attempts: u32,
    pub reason: String,
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrainReport {
    /// Replayed successfully and removed.
    pub succeeded: usize,
    /// Failed but kept for a later drain.
    pub retried: usize,
    /// Exhausted their attempt budget.
    pub dropped: Vec<DroppedOperation>,
    /// Evicted for exceeding the TTL before replay.
    pub expired: Vec<DroppedOperation>,
}

impl DrainReport {
    /// True when anything was lost in this pass.
    pub fn has_losses(&self) -> bool {
        !self.dropped.is_empty() || !self.expired.is_empty()
    }
}

/// Bounded FIFO of operations waiting for connectivity.
pub struct OfflineQueue {
    items: Mutex<VecDeque<QueuedOperation>>,
    settings: QueueSettings,
    draining: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl OfflineQueue {
    pub fn new(settings: QueueSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(settings.capacity.min(1024))),
            settings,
            draining: AtomicBool::new(false),
            clock,
        }
    }

    pub fn settings(&self) -> QueueSettings {
        self.settings
    }

    /// Append an operation, evicting the oldest entry if the queue is full.
    ///
    /// `max_attempts` below 1 is treated as 1.
    pub fn enqueue(&self, descriptor: OperationDescriptor, max_attempts: u32) -> Uuid {
        let op = QueuedOperation {
            id: Uuid::new_v4(),
            enqueued_at: self.clock.now(),
            attempt_count: 0,
            max_attempts: max_attempts.max(1),
            descriptor,
        };
        let id = op.id;

        let mut items = self.lock();
        while items.len() >= self.settings.capacity.max(1) {
            if let Some(evicted) = items.pop_front() {
                tracing::warn!(
                    id = %evicted.id,
                    operation = %evicted.descriptor.label(),
                    capacity = self.settings.capacity,
                    "Offline queue full, evicting oldest operation"
                );
                metrics::record_queue_eviction("capacity");
            }
        }
        tracing::info!(id = %id, operation = %op.descriptor.label(), depth = items.len() + 1, "Operation queued for replay");
        items.push_back(op);
        metrics::record_queue_depth(items.len());
        id
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the queued operations in FIFO order.
    pub fn snapshot(&self) -> Vec<QueuedOperation> {
        self.lock().iter().cloned().collect()
    }

    /// Remove everything. Returns how many operations were discarded.
    pub fn clear(&self) -> usize {
        let mut items = self.lock();
        let count = items.len();
        items.clear();
        metrics::record_queue_depth(0);
        if count > 0 {
            tracing::warn!(count, "Offline queue cleared");
        }
        count
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Run one drain pass. Returns `None` if another pass is already in flight.
    pub async fn drain(&self, replayer: &dyn Replayer) -> Option<DrainReport> {
        let Some(_guard) = DrainGuard::acquire(&self.draining) else {
            tracing::debug!("Drain already in flight, ignoring trigger");
            return None;
        };

        let mut report = DrainReport::default();
        let batch: Vec<Uuid> = {
            let mut items = self.lock();
            report.expired = self.evict_expired(&mut items);
            items.iter().map(|op| op.id).collect()
        };

        tracing::info!(pending = batch.len(), expired = report.expired.len(), "Draining offline queue");

        for id in batch {
            let (descriptor, attempt_count) = {
                let items = self.lock();
                match items.iter().find(|op| op.id == id) {
                    Some(op) => (op.descriptor.clone(), op.attempt_count),
                    // Evicted by a concurrent enqueue.
                    None => continue,
                }
            };

            let outcome = replayer.replay(&descriptor).await;

            let mut items = self.lock();
            let Some(pos) = items.iter().position(|op| op.id == id) else {
                // Evicted while the replay was in flight; a failure has nowhere
                // left to be retried from.
                match outcome {
                    Ok(()) => report.succeeded += 1,
                    Err(e) => {
                        tracing::warn!(
                            id = %id,
                            operation = %descriptor.label(),
                            error = %e,
                            "Replay failed for an operation evicted mid-drain"
                        );
                        report.dropped.push(DroppedOperation {
                            id,
                            label: descriptor.label(),
                            attempts: attempt_count + 1,
                            reason: format!("evicted during replay: {}", e),
                        });
                    }
                }
                continue;
            };
            let Some(mut op) = items.remove(pos) else {
                continue;
            };

            match outcome {
                Ok(()) => {
                    tracing::debug!(id = %id, operation = %op.descriptor.label(), "Replayed queued operation");
                    report.succeeded += 1;
                }
                Err(e) => {
                    op.attempt_count += 1;
                    if op.attempt_count >= op.max_attempts {
                        tracing::warn!(
                            id = %id,
                            operation = %op.descriptor.label(),
                            attempts = op.attempt_count,
                            error = %e,
                            "Dropping queued operation after exhausting attempts"
                        );
                        report.dropped.push(DroppedOperation {
                            id,
                            label: op.descriptor.label(),
                            attempts: op.attempt_count,
                            reason: e.to_string(),
                        });
                    } else {
                        tracing::info!(
                            id = %id,
                            attempts = op.attempt_count,
                            max_attempts = op.max_attempts,
                            error = %e,
                            "Replay failed, keeping operation for next drain"
                        );
                        items.push_back(op);
                        report.retried += 1;
                    }
                }
            }
        }

        let depth = self.len();
        metrics::record_queue_depth(depth);
        metrics::record_drain_outcome("succeeded", report.succeeded);
        metrics::record_drain_outcome("retried", report.retried);
        metrics::record_drain_outcome("dropped", report.dropped.len());
        metrics::record_drain_outcome("expired", report.expired.len());
        tracing::info!(
            succeeded = report.succeeded,
            retried = report.retried,
            dropped = report.dropped.len(),
            expired = report.expired.len(),
            remaining = depth,
            "Drain pass complete"
        );

        Some(report)
    }

    fn evict_expired(&self, items: &mut VecDeque<QueuedOperation>) -> Vec<DroppedOperation> {
        let now = self.clock.now();
        let ttl = self.settings.ttl;
        let mut expired = Vec::new();

        items.retain(|op| {
            let age = now.saturating_duration_since(op.enqueued_at);
            if age <= ttl {
                return true;
            }
            tracing::warn!(
                id = %op.id,
                operation = %op.descriptor.label(),
                age = ?age,
                "Evicting expired queued operation"
            );
            metrics::record_queue_eviction("ttl");
            expired.push(DroppedOperation {
                id: op.id,
                label: op.descriptor.label(),
                attempts: op.attempt_count,
                reason: format!("expired after {:?}", age),
            });
            false
        });

        expired
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<QueuedOperation>> {
        self.items.lock().expect("offline queue mutex poisoned")
    }
}

impl std::fmt::Debug for OfflineQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineQueue")
            .field("settings", &self.settings)
            .field("len", &self.len())
            .field("draining", &self.is_draining())
            .finish()
    }
}

/// Holds the single-flight flag for the duration of a drain pass.
struct DrainGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
