//! resilient-link command line.
//!
//! # Commands
//! - `watch`: run the connectivity service, log state transitions and
//!   drain reports, hot-reload the retry policy when the config file changes
//! - `request <url>`: perform one call through the retrying executor and
//!   print a JSON summary of the outcome

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;

use resilient_link::config::watcher::PolicyWatcher;
use resilient_link::config::{load_config, ClientConfig};
use resilient_link::lifecycle::signals::wait_for_shutdown_signal;
use resilient_link::observability::{logging, metrics};
use resilient_link::{
    ConnectivityService, HttpTransport, Method, Operation, Request, RetryPolicy, TokioClock,
};

#[derive(Parser)]
#[command(name = "resilient-link")]
#[command(about = "Connectivity monitor, retrying executor and offline queue", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor connectivity until interrupted
    Watch,
    /// Send one request through the retrying executor
    Request {
        url: String,

        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Defer the request to the offline queue if it cannot complete
        #[arg(long)]
        queueable: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!("resilient-link v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    match cli.command {
        Commands::Watch => run_watch(config, cli.config.as_deref()).await,
        Commands::Request { url, method, queueable } => {
            request(config, &url, &method, queueable).await
        }
    }
}

async fn run_watch(config: ClientConfig, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let transport = Arc::new(HttpTransport::new(&config.transport)?);
    let service = ConnectivityService::new(&config, transport, Arc::new(TokioClock))?;
    service.start()?;

    tracing::info!(
        probe_target = %config.probe.target,
        probe_interval_secs = config.probe.interval_secs,
        queue_capacity = config.queue.capacity,
        max_retries = config.retry.max_retries,
        "Configuration loaded"
    );

    // Kept alive for the duration of the command.
    let mut _watcher = None;
    let mut policies = None;
    if let Some(path) = path {
        let (watcher, rx) = PolicyWatcher::new(path, config.clone())?;
        match watcher.run() {
            Ok(w) => {
                _watcher = Some(w);
                policies = Some(rx);
            }
            Err(e) => tracing::warn!(error = %e, "Config hot reload unavailable"),
        }
    }

    let mut transitions = service.monitor().subscribe();
    let mut reports = service.drain_reports();
    let signal = wait_for_shutdown_signal();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            _ = &mut signal => break,
            transition = transitions.recv() => match transition {
                Some(t) => tracing::info!(from = %t.from, to = %t.to, "Connectivity changed"),
                None => break,
            },
            report = reports.recv() => match report {
                Ok(report) => tracing::info!(
                    succeeded = report.succeeded,
                    retried = report.retried,
                    dropped = report.dropped.len(),
                    expired = report.expired.len(),
                    "Offline queue drained"
                ),
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "Missed drain reports"),
                Err(RecvError::Closed) => break,
            },
            Some(policy) = next_policy(&mut policies) => {
                service.executor().set_default_policy(policy.as_ref().clone());
            }
        }
    }

    service.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolve with the next reloaded policy; never resolves without a watcher.
async fn next_policy(
    policies: &mut Option<watch::Receiver<Arc<RetryPolicy>>>,
) -> Option<Arc<RetryPolicy>> {
    match policies {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(rx.borrow_and_update().clone()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}

async fn request(
    config: ClientConfig,
    url: &str,
    method: &str,
    queueable: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let method: Method = serde_json::from_value(json!(method.to_uppercase()))?;
    let transport = Arc::new(HttpTransport::new(&config.transport)?);
    let service = ConnectivityService::new(&config, transport, Arc::new(TokioClock))?;

    let mut op = Operation::new(Request::new(method, url));
    if queueable {
        op = op.queueable();
    }

    let started = tokio::time::Instant::now();
    let result = service.executor().execute_default(op).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let summary = match &result {
        Ok(response) => json!({
            "url": url,
            "method": method,
            "outcome": "success",
            "status": response.status,
            "body_bytes": response.body.len(),
            "elapsed_ms": elapsed_ms,
        }),
        Err(e) => json!({
            "url": url,
            "method": method,
            "outcome": "failure",
            "error_kind": e.kind(),
            "error": e.to_string(),
            "status": e.status(),
            "queued": service.queue().len(),
            "elapsed_ms": elapsed_ms,
        }),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if result.is_err() {
        std::process::exit(1);
    }
    Ok(())
}
