//! Connectivity state machine.
//!
//! # State Transitions
//! ```text
//! Unknown → Connecting:                first probe dispatched
//! Connecting/Connected/Error → Connected: probe succeeded
//! Connecting/Connected/Error → Error:     probe failed
//! any → Disconnected:                  passive "interface down" (highest priority)
//! Disconnected/Unknown → Connecting:   passive "interface up"
//! any → Disconnected / Connected:      force_offline / force_online
//! ```
//!
//! # Design Decisions
//! - Single writer: every event source goes through one mutex, so passive
//!   signals and probe results can never interleave half-applied updates
//! - Readers get whole snapshots through a `watch` channel
//! - Every subscriber owns an unbounded channel fed while the lock is held:
//!   each one sees every transition, in the order they were applied, no
//!   matter how far behind it falls
//! - Subscribers whose receiver was dropped are pruned on the next transition
//! - Repeating the current state is not a transition and is not published
//! - Probe results are dropped while Disconnected or while a manual
//!   override is active; the next passive signal clears the override

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::clock::Clock;
use crate::connectivity::state::{ConnectivityState, PassiveSignal, StateSnapshot, StateTransition};
use crate::observability::metrics;

struct MonitorInner {
    state: ConnectivityState,
    since: Instant,
    last_connected: Option<Instant>,
    overridden: bool,
    subscribers: Vec<mpsc::UnboundedSender<StateTransition>>,
}

/// Tracks reachability from passive signals, health probes and manual overrides.
pub struct ConnectivityMonitor {
    inner: Mutex<MonitorInner>,
    snapshot_tx: watch::Sender<StateSnapshot>,
    clock: Arc<dyn Clock>,
}

impl ConnectivityMonitor {
    /// Create a monitor in the `Unknown` state.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let inner = MonitorInner {
            state: ConnectivityState::Unknown,
            since: now,
            last_connected: None,
            overridden: false,
            subscribers: Vec::new(),
        };
        let (snapshot_tx, _) = watch::channel(Self::snapshot_of(&inner));

        Self {
            inner: Mutex::new(inner),
            snapshot_tx,
            clock,
        }
    }

    pub fn current_state(&self) -> ConnectivityState {
        self.snapshot_tx.borrow().state.clone()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Receive every transition applied from now on.
    ///
    /// Nothing is ever dropped for a slow receiver. The stream ends when the
    /// monitor is dropped.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StateTransition> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .expect("connectivity monitor mutex poisoned")
            .subscribers
            .push(tx);
        rx
    }

    /// Watch the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<StateSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Time elapsed since the monitor last entered `Connected`.
    pub fn time_since_last_connected(&self) -> Option<Duration> {
        let last = self.snapshot_tx.borrow().last_connected?;
        Some(self.clock.now().saturating_duration_since(last))
    }

    pub fn on_passive_signal(&self, signal: PassiveSignal) -> bool {
        self.apply(|inner| {
            inner.overridden = false;
            match signal {
                PassiveSignal::InterfaceDown => Some(ConnectivityState::Disconnected),
                PassiveSignal::InterfaceUp => match inner.state {
                    ConnectivityState::Disconnected | ConnectivityState::Unknown => {
                        Some(ConnectivityState::Connecting)
                    }
                    _ => None,
                },
            }
        })
    }

    /// Record that a probe is about to be sent.
    ///
    /// Returns false when the probe should be skipped (no interface, or override active).
    pub fn on_probe_dispatched(&self) -> bool {
        let mut dispatch = true;
        self.apply(|inner| {
            if inner.overridden || inner.state == ConnectivityState::Disconnected {
                dispatch = false;
                return None;
            }
            match inner.state {
                ConnectivityState::Unknown => Some(ConnectivityState::Connecting),
                _ => None,
            }
        });
        dispatch
    }

    /// Feed a probe outcome into the state machine.
    pub fn on_probe_result(&self, result: Result<(), String>) -> bool {
        self.apply(|inner| {
            if inner.overridden || inner.state == ConnectivityState::Disconnected {
                return None;
            }
            match result {
                Ok(()) => Some(ConnectivityState::Connected),
                Err(reason) => Some(ConnectivityState::Error(reason)),
            }
        })
    }

    /// Force `Disconnected` and ignore probes until the next passive signal.
    pub fn force_offline(&self) -> bool {
        self.apply(|inner| {
            inner.overridden = true;
            Some(ConnectivityState::Disconnected)
        })
    }

    /// Force `Connected` and ignore probes until the next passive signal.
    pub fn force_online(&self) -> bool {
        self.apply(|inner| {
            inner.overridden = true;
            Some(ConnectivityState::Connected)
        })
    }

    /// Apply one event under the lock. Returns true when a transition was published.
    fn apply<F>(&self, event: F) -> bool
    where
        F: FnOnce(&mut MonitorInner) -> Option<ConnectivityState>,
    {
        let mut inner = self.inner.lock().expect("connectivity monitor mutex poisoned");
        let overridden_before = inner.overridden;
        let next = event(&mut *inner);

        let next = match next {
            Some(next) if next != inner.state => next,
            _ => {
                if inner.overridden != overridden_before {
                    self.snapshot_tx.send_replace(Self::snapshot_of(&inner));
                }
                return false;
            }
        };

        let now = self.clock.now();
        let from = std::mem::replace(&mut inner.state, next.clone());
        inner.since = now;
        if next.is_connected() {
            inner.last_connected = Some(now);
        }

        tracing::info!(from = %from, to = %next, overridden = inner.overridden, "Connectivity state changed");
        metrics::record_state_transition(next.name(), next.is_connected());

        self.snapshot_tx.send_replace(Self::snapshot_of(&inner));
        let transition = StateTransition { from, to: next, at: now };
        inner.subscribers.retain(|tx| tx.send(transition.clone()).is_ok());
        true
    }

    fn snapshot_of(inner: &MonitorInner) -> StateSnapshot {
        StateSnapshot {
            state: inner.state.clone(),
            since: inner.since,
            last_connected: inner.last_connected,
            overridden: inner.overridden,
        }
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("snapshot", &*self.snapshot_tx.borrow())
            .finish_non_exhaustive()
    }
}
