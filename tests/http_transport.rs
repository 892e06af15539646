//! Executor and health checker against a real HTTP backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resilient_link::config::TransportConfig;
use resilient_link::connectivity::{HealthChecker, ProbeSettings};
use resilient_link::{
    ClassifiedError, ConnectivityMonitor, ConnectivityState, ConnectivityService, HttpTransport,
    Operation, Request, RetryPolicy, TokioClock,
};

mod common;

fn fast_policy() -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(3)
        .base_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(50))
        .build()
        .unwrap()
}

fn http_transport() -> Arc<HttpTransport> {
    let config = TransportConfig {
        connect_timeout_secs: 2,
        request_timeout_secs: 5,
        ..TransportConfig::default()
    };
    Arc::new(HttpTransport::new(&config).unwrap())
}

#[tokio::test]
async fn test_retry_on_failure() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let addr = common::start_programmable_backend(move |index| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if index < 2 {
                (503, "Service Unavailable".into())
            } else {
                (200, "{\"ok\":true}".into())
            }
        }
    })
    .await;

    let service = ConnectivityService::new(&common::quiet_config(), http_transport(), Arc::new(TokioClock)).unwrap();
    let value: serde_json::Value = service
        .executor()
        .execute_json(Operation::new(Request::get(format!("http://{}/items", addr))), &fast_policy())
        .await
        .unwrap();

    assert_eq!(value["ok"], true);
    assert_eq!(hits.load(Ordering::SeqCst), 3, "should have attempted 3 times");
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let addr = common::start_programmable_backend(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { (404, "missing".into()) }
    })
    .await;

    let service = ConnectivityService::new(&common::quiet_config(), http_transport(), Arc::new(TokioClock)).unwrap();
    let err = service
        .executor()
        .execute(Operation::new(Request::get(format!("http://{}/gone", addr))), &fast_policy())
        .await
        .unwrap_err();

    assert_eq!(err, ClassifiedError::NotFound);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_refused_connection_is_transport_failure() {
    let addr = common::unused_addr().await;
    let service = ConnectivityService::new(&common::quiet_config(), http_transport(), Arc::new(TokioClock)).unwrap();

    let err = service
        .executor()
        .execute(Operation::new(Request::get(format!("http://{}/", addr))), &RetryPolicy::no_retry())
        .await
        .unwrap_err();

    assert!(matches!(err, ClassifiedError::TransportFailure(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_health_probe_tracks_backend() {
    let addr = common::start_programmable_backend(|index| async move {
        if index == 0 {
            (200, "ok".into())
        } else {
            (503, "down".into())
        }
    })
    .await;

    let monitor = Arc::new(ConnectivityMonitor::new(Arc::new(TokioClock)));
    let checker = HealthChecker::new(
        monitor.clone(),
        http_transport(),
        Arc::new(TokioClock),
        ProbeSettings {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(2),
            target: format!("http://{}/health", addr),
        },
    );

    assert_eq!(checker.check_once().await, Some(Ok(())));
    assert_eq!(monitor.current_state(), ConnectivityState::Connected);

    let second = checker.check_once().await;
    assert!(matches!(second, Some(Err(_))));
    assert!(matches!(monitor.current_state(), ConnectivityState::Error(_)));
}
