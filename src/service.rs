//! Connectivity service wiring.
//!
//! # Responsibilities
//! - Build monitor, queue, replayer and executor from one `ClientConfig`
//! - Spawn the health checker, passive listener and reconnect trigger
//! - Drain the offline queue when connectivity returns after Disconnected/Error
//! - Publish every `DrainReport` to interested callers
//! - Stop all background work on shutdown
//!
//! # Design Decisions
//! - Explicitly constructed and passed around; there is no global instance
//! - The whole `ClientConfig` is validated before anything is built
//! - Transport and Clock are injected so tests can substitute fakes
//! - Each drain runs on its own task; the queue's single-flight guard turns a
//!   trigger that arrives mid-drain into a no-op
//! - Shutdown waits for an in-flight drain to finish its pass

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};

use crate::clock::Clock;
use crate::config::loader::join_errors;
use crate::config::validation::{validate_config, ValidationError};
use crate::config::ClientConfig;
use crate::connectivity::passive::run_passive_listener;
use crate::connectivity::{ConnectivityMonitor, HealthChecker, PassiveSignal, ProbeSettings, StateTransition};
use crate::executor::RequestExecutor;
use crate::lifecycle::Shutdown;
use crate::queue::{DrainReport, OfflineQueue, OperationHandler, QueueSettings, Replayer, TransportReplayer};
use crate::resilience::policy::{PolicyError, RetryPolicy};
use crate::transport::Transport;

const PASSIVE_CHANNEL_CAPACITY: usize = 16;
const REPORT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid configuration: {}", join_errors(.0))]
    Config(Vec<ValidationError>),

    #[error("invalid retry policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("service already started")]
    AlreadyStarted,

    #[error("service has been shut down")]
    ShutDown,
}

pub struct ConnectivityService {
    monitor: Arc<ConnectivityMonitor>,
    queue: Arc<OfflineQueue>,
    executor: Arc<RequestExecutor>,
    replayer: Arc<TransportReplayer>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    probe: Option<ProbeSettings>,
    shutdown: Shutdown,
    reports: broadcast::Sender<DrainReport>,
    passive_tx: mpsc::Sender<PassiveSignal>,
    passive_rx: Mutex<Option<mpsc::Receiver<PassiveSignal>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConnectivityService {
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ServiceError> {
        validate_config(config).map_err(ServiceError::Config)?;
        let policy = RetryPolicy::try_from(&config.retry)?;
        let monitor = Arc::new(ConnectivityMonitor::new(clock.clone()));
        let queue = Arc::new(OfflineQueue::new(QueueSettings::from(&config.queue), clock.clone()));
        let executor = Arc::new(RequestExecutor::new(
            transport.clone(),
            monitor.clone(),
            queue.clone(),
            clock.clone(),
            policy,
            config.queue.default_max_attempts,
        ));
        let replayer = Arc::new(TransportReplayer::new(transport.clone()));
        let probe = config.probe.enabled.then(|| ProbeSettings::from(&config.probe));
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        let (passive_tx, passive_rx) = mpsc::channel(PASSIVE_CHANNEL_CAPACITY);

        Ok(Self {
            monitor,
            queue,
            executor,
            replayer,
            transport,
            clock,
            probe,
            shutdown: Shutdown::new(),
            reports,
            passive_tx,
            passive_rx: Mutex::new(Some(passive_rx)),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn queue(&self) -> &Arc<OfflineQueue> {
        &self.queue
    }

    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }

    /// Channel for platform interface up/down notifications.
    pub fn passive_sender(&self) -> mpsc::Sender<PassiveSignal> {
        self.passive_tx.clone()
    }

    /// Receive a report after every drain pass, including terminal failures.
    pub fn drain_reports(&self) -> broadcast::Receiver<DrainReport> {
        self.reports.subscribe()
    }

    /// Register the replay handler for `Named` operations called `name`.
    pub fn register_handler(&self, name: impl Into<String>, handler: Arc<dyn OperationHandler>) {
        self.replayer.register_handler(name, handler);
    }

    /// Spawn background tasks. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), ServiceError> {
        if self.shutdown.is_triggered() {
            return Err(ServiceError::ShutDown);
        }
        let passive_rx = self
            .passive_rx
            .lock()
            .expect("passive receiver mutex poisoned")
            .take()
            .ok_or(ServiceError::AlreadyStarted)?;

        let mut tasks = self.tasks.lock().expect("task list mutex poisoned");

        tasks.push(tokio::spawn(run_passive_listener(
            self.monitor.clone(),
            passive_rx,
            self.shutdown.subscribe(),
        )));

        let trigger = ReconnectTrigger {
            monitor: self.monitor.clone(),
            queue: self.queue.clone(),
            replayer: self.replayer.clone(),
            reports: self.reports.clone(),
        };
        let transitions = self.monitor.subscribe();
        tasks.push(tokio::spawn(trigger.run(transitions, self.shutdown.subscribe())));

        match &self.probe {
            Some(settings) => {
                let checker = HealthChecker::new(
                    self.monitor.clone(),
                    self.transport.clone(),
                    self.clock.clone(),
                    settings.clone(),
                );
                tasks.push(tokio::spawn(checker.run(self.shutdown.subscribe())));
            }
            None => tracing::info!("Active health checks disabled"),
        }

        tracing::info!(tasks = tasks.len(), "Connectivity service started");
        Ok(())
    }

    /// Stop probes and further drains, then wait for background tasks to exit.
    pub async fn shutdown(&self) {
        let listeners = self.shutdown.receiver_count();
        if !self.shutdown.trigger() {
            return;
        }
        tracing::info!(listeners, "Shutdown signalled to background tasks");
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .expect("task list mutex poisoned")
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Background task failed during shutdown");
            }
        }
        tracing::info!(queued = self.queue.len(), "Connectivity service stopped");
    }
}

impl std::fmt::Debug for ConnectivityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityService")
            .field("monitor", &self.monitor)
            .field("queue", &self.queue)
            .field("probe", &self.probe)
            .finish()
    }
}

/// Watches transitions and drains the queue on reconnect.
struct ReconnectTrigger {
    monitor: Arc<ConnectivityMonitor>,
    queue: Arc<OfflineQueue>,
    replayer: Arc<TransportReplayer>,
    reports: broadcast::Sender<DrainReport>,
}

impl ReconnectTrigger {
    async fn run(
        self,
        mut transitions: mpsc::UnboundedReceiver<StateTransition>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut was_offline = self.monitor.current_state().is_offline();
        let mut drains = JoinSet::new();

        loop {
            tokio::select! {
                transition = transitions.recv() => match transition {
                    Some(transition) => {
                        if transition.to.is_offline() {
                            was_offline = true;
                        } else if transition.to.is_connected() && was_offline {
                            was_offline = false;
                            tracing::info!(from = %transition.from, "Connectivity restored, draining offline queue");
                            self.spawn_drain(&mut drains);
                        }
                    }
                    None => break,
                },
                Some(finished) = drains.join_next(), if !drains.is_empty() => {
                    if let Err(e) = finished {
                        tracing::error!(error = %e, "Drain task failed");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Reconnect trigger received shutdown signal, exiting loop");
                    break;
                }
            }
        }

        while let Some(finished) = drains.join_next().await {
            if let Err(e) = finished {
                tracing::error!(error = %e, "Drain task failed");
            }
        }
    }

    fn spawn_drain(&self, drains: &mut JoinSet<()>) {
        let queue = self.queue.clone();
        let replayer = self.replayer.clone();
        let reports = self.reports.clone();
        drains.spawn(async move {
            let replayer: &dyn Replayer = replayer.as_ref();
            if let Some(report) = queue.drain(replayer).await {
                if report.has_losses() {
                    tracing::warn!(
                        dropped = report.dropped.len(),
                        expired = report.expired.len(),
                        "Offline operations were lost during sync"
                    );
                }
                let _ = reports.send(report);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use crate::transport::{Request, Response, TransportError};
    use futures_util::future::BoxFuture;

    struct AlwaysOk;

    impl Transport for AlwaysOk {
        fn send(&self, _request: Request) -> BoxFuture<'_, Result<Response, TransportError>> {
            Box::pin(async { Ok(Response::new(200, "")) })
        }
    }

    fn service() -> ConnectivityService {
        let mut config = ClientConfig::default();
        config.probe.enabled = false;
        ConnectivityService::new(&config, Arc::new(AlwaysOk), Arc::new(TokioClock)).unwrap()
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let service = service();
        service.start().unwrap();
        assert!(matches!(service.start(), Err(ServiceError::AlreadyStarted)));
        service.shutdown().await;
        assert!(matches!(service.start(), Err(ServiceError::ShutDown)));
    }

    #[tokio::test]
    async fn test_invalid_policy_rejected() {
        let mut config = ClientConfig::default();
        config.retry.backoff_multiplier = 0.5;
        let err = ConnectivityService::new(&config, Arc::new(AlwaysOk), Arc::new(TokioClock)).unwrap_err();
        match err {
            ServiceError::Config(errors) => assert_eq!(errors[0].field, "retry.backoff_multiplier"),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_health_interval_rejected() {
        let mut config = ClientConfig::default();
        config.probe.interval_secs = 0;
        config.queue.capacity = 0;
        let err = ConnectivityService::new(&config, Arc::new(AlwaysOk), Arc::new(TokioClock)).unwrap_err();

        let ServiceError::Config(errors) = &err else {
            panic!("expected config error, got {:?}", err);
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["queue.capacity", "probe.interval_secs"]);
        assert!(err.to_string().contains("probe.interval_secs: must be greater than 0"));
    }

    #[tokio::test]
    async fn test_background_tasks_listen_for_shutdown() {
        let service = service();
        service.start().unwrap();
        // Passive listener and reconnect trigger; health checks are disabled.
        assert_eq!(service.shutdown.receiver_count(), 2);

        service.shutdown().await;
        assert_eq!(service.shutdown.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_passive_sender_drives_monitor() {
        let service = service();
        service.start().unwrap();
        let mut transitions = service.monitor().subscribe();

        service.passive_sender().send(PassiveSignal::InterfaceDown).await.unwrap();
        let transition = transitions.recv().await.unwrap();
        assert!(transition.to.is_offline());

        service.shutdown().await;
    }
}
