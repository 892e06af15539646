//! Retry policy hot reload.
//!
//! # Responsibilities
//! - Watch the config file and re-read it on modify/create events
//! - Publish only configurations whose retry section produces a valid,
//!   changed `RetryPolicy`
//!
//! # Design Decisions
//! - Only the retry policy is hot-swappable; queue and probe settings are
//!   read once at startup and a change to them is logged and ignored
//! - A file that fails to parse or validate keeps the current policy
//! - Updates go through a `watch` channel: a burst of editor writes
//!   collapses into the latest policy

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::watch;

use crate::config::loader::load_config;
use crate::config::schema::ClientConfig;
use crate::resilience::policy::RetryPolicy;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Watches a config file and publishes reloaded retry policies.
pub struct PolicyWatcher {
    path: PathBuf,
    current: Arc<Mutex<ClientConfig>>,
    policy_tx: watch::Sender<Arc<RetryPolicy>>,
}

impl PolicyWatcher {
    /// `initial` is the configuration already in effect.
    ///
    /// Fails if its retry section does not form a valid policy.
    pub fn new(
        path: &Path,
        initial: ClientConfig,
    ) -> Result<(Self, watch::Receiver<Arc<RetryPolicy>>), crate::resilience::PolicyError> {
        let policy = RetryPolicy::try_from(&initial.retry)?;
        let (policy_tx, policy_rx) = watch::channel(Arc::new(policy));

        Ok((
            Self {
                path: path.to_path_buf(),
                current: Arc::new(Mutex::new(initial)),
                policy_tx,
            },
            policy_rx,
        ))
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let current = self.current.clone();
        let policy_tx = self.policy_tx.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    tracing::debug!(path = ?path, "Config file change detected");
                    let mut current = current.lock().expect("config watcher mutex poisoned");
                    if let Some(policy) = reload(&path, &mut current) {
                        policy_tx.send_replace(Arc::new(policy));
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(POLL_INTERVAL),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Retry policy watcher started");
        Ok(watcher)
    }
}

/// Re-read `path` and return the new policy if the retry section changed.
///
/// `current` is updated to the accepted configuration.
pub fn reload(path: &Path, current: &mut ClientConfig) -> Option<RetryPolicy> {
    let next = match load_config(path) {
        Ok(next) => next,
        Err(e) => {
            tracing::error!(error = %e, "Failed to reload config, keeping current retry policy");
            return None;
        }
    };

    if next.queue != current.queue || next.probe != current.probe || next.transport != current.transport {
        tracing::warn!("Queue, probe and transport settings only take effect after a restart");
    }
    if next.retry == current.retry {
        tracing::debug!("Retry section unchanged");
        return None;
    }

    match RetryPolicy::try_from(&next.retry) {
        Ok(policy) => {
            current.retry = next.retry;
            Some(policy)
        }
        Err(e) => {
            tracing::error!(error = %e, "Rejected reloaded retry policy");
            None
        }
    }
}
