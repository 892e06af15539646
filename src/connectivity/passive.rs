//! Passive reachability signals.
//!
//! # Responsibilities
//! - Receive interface-level up/down notifications from the platform
//! - Forward them into the monitor on their own task, independent of probes

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::connectivity::monitor::ConnectivityMonitor;
use crate::connectivity::state::PassiveSignal;

/// Forward signals from `signals` into `monitor` until the channel closes or shutdown.
pub async fn run_passive_listener(
    monitor: Arc<ConnectivityMonitor>,
    mut signals: mpsc::Receiver<PassiveSignal>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            signal = signals.recv() => {
                match signal {
                    Some(signal) => {
                        tracing::debug!(signal = ?signal, "Passive connectivity signal");
                        monitor.on_passive_signal(signal);
                    }
                    None => {
                        tracing::info!("Passive signal source closed");
                        break;
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Passive listener received shutdown signal, exiting loop");
                break;
            }
        }
    }
}
