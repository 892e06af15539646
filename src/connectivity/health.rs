//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe a cheap, side-effect-free backend endpoint
//! - Feed pass/fail into the connectivity monitor
//!
//! # Design Decisions
//! - The interval and the per-probe timeout are both waited out on the
//!   injected `Clock`, so a substituted clock controls probe cadence
//! - The next interval starts after the previous probe completes; slow
//!   probes push later ones back instead of bunching up

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::clock::Clock;
use crate::config::ProbeConfig;
use crate::connectivity::monitor::ConnectivityMonitor;
use crate::transport::{Request, Transport};

/// Probe settings in runtime form.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub interval: Duration,
    pub timeout: Duration,
    pub target: String,
}

impl From<&ProbeConfig> for ProbeSettings {
    fn from(config: &ProbeConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs),
            timeout: Duration::from_secs(config.timeout_secs),
            target: config.target.clone(),
        }
    }
}

pub struct HealthChecker {
    monitor: Arc<ConnectivityMonitor>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    settings: ProbeSettings,
}

impl HealthChecker {
    pub fn new(
        monitor: Arc<ConnectivityMonitor>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        settings: ProbeSettings,
    ) -> Self {
        Self {
            monitor,
            transport,
            clock,
            settings,
        }
    }

    /// Probe once per interval until shutdown. The first probe fires immediately.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval = ?self.settings.interval,
            url = %self.settings.target,
            "Health checker starting"
        );

        loop {
            self.check_once().await;

            tokio::select! {
                _ = self.clock.sleep(self.settings.interval) => {}
                _ = shutdown.recv() => {
                    tracing::info!("Health checker received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run a single probe and report it. Returns `None` if the probe was skipped.
    pub async fn check_once(&self) -> Option<Result<(), String>> {
        if !self.monitor.on_probe_dispatched() {
            tracing::debug!("Health probe skipped");
            return None;
        }

        let request = Request::get(self.settings.target.clone())
            .header("user-agent", "resilient-link-health-check");

        let sent = tokio::select! {
            sent = self.transport.send(request) => Ok(sent),
            _ = self.clock.sleep(self.settings.timeout) => Err(()),
        };

        let result = match sent {
            Ok(Ok(response)) if response.is_success() => Ok(()),
            Ok(Ok(response)) => {
                tracing::warn!(url = %self.settings.target, status = response.status, "Health check failed: non-success status");
                Err(format!("status {}", response.status))
            }
            Ok(Err(e)) => {
                tracing::warn!(url = %self.settings.target, error = %e, "Health check failed: transport error");
                Err(e.to_string())
            }
            Err(_) => {
                tracing::warn!(url = %self.settings.target, "Health check failed: timeout");
                Err("probe timed out".to_string())
            }
        };

        self.monitor.on_probe_result(result.clone());
        Some(result)
    }
}
