//! Request execution with retries and offline hand-off.
//!
//! # Responsibilities
//! - Gate every call on the monitor's current state
//! - Run attempts through the Transport under a RetryPolicy
//! - Hand queueable operations to the offline queue when they cannot complete now
//! - Surface exactly one typed outcome per call
//!
//! # Design Decisions
//! - Retries are invisible to callers except through logs and metrics
//! - Queueing is a side effect; the caller still gets `NoConnection`
//! - Cancellation is dropping the future (or `execute_until`): the in-flight
//!   attempt and any pending backoff sleep are abandoned, nothing more is retried,
//!   and an enqueue that already happened is kept

use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwap;
use futures_util::future::join_all;
use serde::de::DeserializeOwned;

use crate::clock::Clock;
use crate::connectivity::{ConnectivityMonitor, ConnectivityState};
use crate::observability::metrics;
use crate::queue::{OfflineQueue, OperationDescriptor};
use crate::resilience::classify::{classify_outcome, decode_json, ClassifiedError};
use crate::resilience::policy::RetryPolicy;
use crate::transport::{Request, Response, Transport};

/// One logical call.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub request: Request,
    queueable: bool,
    max_attempts: Option<u32>,
}

impl Operation {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            queueable: false,
            max_attempts: None,
        }
    }

    /// Queue for later replay if it cannot complete now, with the executor's default attempt budget.
    ///
    /// Only mark idempotent writes queueable: replay is at-least-once.
    pub fn queueable(mut self) -> Self {
        self.queueable = true;
        self
    }

    /// Like [`Operation::queueable`] with an explicit replay attempt budget.
    pub fn queueable_with(mut self, max_attempts: u32) -> Self {
        self.queueable = true;
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn is_queueable(&self) -> bool {
        self.queueable
    }
}

impl From<Request> for Operation {
    fn from(request: Request) -> Self {
        Operation::new(request)
    }
}

/// Results of a concurrent batch, in input order.
#[derive(Debug)]
pub struct BatchOutcome {
    pub results: Vec<Result<Response, ClassifiedError>>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// Every operation in the batch succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed() == 0
    }

    pub fn errors(&self) -> impl Iterator<Item = (usize, &ClassifiedError)> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().err().map(|e| (i, e)))
    }
}

pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    monitor: Arc<ConnectivityMonitor>,
    queue: Arc<OfflineQueue>,
    clock: Arc<dyn Clock>,
    default_policy: ArcSwap<RetryPolicy>,
    default_max_attempts: u32,
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        monitor: Arc<ConnectivityMonitor>,
        queue: Arc<OfflineQueue>,
        clock: Arc<dyn Clock>,
        default_policy: RetryPolicy,
        default_max_attempts: u32,
    ) -> Self {
        Self {
            transport,
            monitor,
            queue,
            clock,
            default_policy: ArcSwap::from_pointee(default_policy),
            default_max_attempts: default_max_attempts.max(1),
        }
    }

    pub fn default_policy(&self) -> Arc<RetryPolicy> {
        self.default_policy.load_full()
    }

    /// Replace the policy used by [`RequestExecutor::execute_default`].
    pub fn set_default_policy(&self, policy: RetryPolicy) {
        tracing::info!(
            max_retries = policy.max_retries(),
            base_delay = ?policy.base_delay(),
            max_delay = ?policy.max_delay(),
            "Default retry policy updated"
        );
        self.default_policy.store(Arc::new(policy));
    }

    /// Execute with the current default policy.
    pub async fn execute_default(&self, op: Operation) -> Result<Response, ClassifiedError> {
        let policy = self.default_policy.load_full();
        self.execute(op, &policy).await
    }

    /// Execute one logical call under `policy`.
    pub async fn execute(&self, op: Operation, policy: &RetryPolicy) -> Result<Response, ClassifiedError> {
        if self.monitor.current_state() == ConnectivityState::Disconnected {
            tracing::info!(method = %op.request.method, url = %op.request.target, "No connection, skipping network call");
            self.defer(op, &ClassifiedError::NoConnection);
            metrics::record_request_failure(ClassifiedError::NoConnection.kind().as_str());
            return Err(ClassifiedError::NoConnection);
        }

        let mut attempt: u32 = 0;
        loop {
            metrics::record_attempt();
            let outcome = classify_outcome(self.transport.send(op.request.clone()).await);

            let err = match outcome {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::info!(url = %op.request.target, attempts = attempt + 1, "Request succeeded after retries");
                    }
                    return Ok(response);
                }
                Err(err) => err,
            };

            let retryable = policy.is_retryable(&err);
            if !retryable || attempt >= policy.max_retries() {
                if retryable {
                    tracing::warn!(
                        url = %op.request.target,
                        attempts = attempt + 1,
                        error = %err,
                        "Retries exhausted"
                    );
                    self.defer(op, &err);
                } else {
                    tracing::debug!(url = %op.request.target, error = %err, "Non-retryable failure");
                }
                metrics::record_request_failure(err.kind().as_str());
                return Err(err);
            }

            let delay = policy.delay_for(attempt);
            tracing::info!(
                method = %op.request.method,
                url = %op.request.target,
                attempt = attempt + 1,
                delay = ?delay,
                error = %err,
                "Retrying request"
            );
            metrics::record_retry(err.kind().as_str());
            self.clock.sleep(delay).await;
            attempt += 1;
        }
    }

    /// Execute and decode a JSON body. Undecodable payloads are `DataCorrupted`.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        op: Operation,
        policy: &RetryPolicy,
    ) -> Result<T, ClassifiedError> {
        let response = self.execute(op, policy).await?;
        decode_json(&response)
    }

    /// Execute until `cancel` resolves, whichever comes first.
    pub async fn execute_until<C>(
        &self,
        op: Operation,
        policy: &RetryPolicy,
        cancel: C,
    ) -> Result<Response, ClassifiedError>
    where
        C: Future<Output = ()>,
    {
        let target = op.request.target.clone();
        tokio::select! {
            biased;
            _ = cancel => {
                tracing::info!(url = %target, "Request cancelled by caller");
                Err(ClassifiedError::Cancelled)
            }
            result = self.execute(op, policy) => result,
        }
    }

    /// Run all operations concurrently and collect every result before returning.
    pub async fn execute_all(&self, ops: Vec<Operation>, policy: &RetryPolicy) -> BatchOutcome {
        let results = join_all(ops.into_iter().map(|op| self.execute(op, policy))).await;
        let outcome = BatchOutcome { results };
        if !outcome.is_complete() {
            tracing::warn!(
                succeeded = outcome.succeeded(),
                failed = outcome.failed(),
                "Batch completed partially"
            );
        }
        outcome
    }

    fn defer(&self, op: Operation, cause: &ClassifiedError) {
        if !op.queueable {
            return;
        }
        let max_attempts = op.max_attempts.unwrap_or(self.default_max_attempts);
        let id = self
            .queue
            .enqueue(OperationDescriptor::request(op.request), max_attempts);
        tracing::info!(id = %id, cause = %cause, "Deferred operation to offline queue");
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("default_policy", &self.default_policy.load_full())
            .field("default_max_attempts", &self.default_max_attempts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use crate::queue::QueueSettings;
    use crate::transport::{Method, TransportError};
    use futures_util::future::BoxFuture;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers with queued outcomes, then repeats the last one.
    struct Script {
        outcomes: Mutex<VecDeque<Result<u16, TransportError>>>,
        calls: Mutex<usize>,
    }

    impl Script {
        fn new(outcomes: Vec<Result<u16, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    impl Transport for Script {
        fn send(&self, _request: Request) -> BoxFuture<'_, Result<Response, TransportError>> {
            *self.calls.lock().unwrap() += 1;
            let mut outcomes = self.outcomes.lock().unwrap();
            let next = if outcomes.len() > 1 {
                outcomes.pop_front().unwrap()
            } else {
                outcomes.front().cloned().unwrap()
            };
            Box::pin(async move { next.map(|status| Response::new(status, r#"{"id":"e1"}"#)) })
        }
    }

    fn executor(script: Arc<Script>) -> (RequestExecutor, Arc<ConnectivityMonitor>, Arc<OfflineQueue>) {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock);
        let monitor = Arc::new(ConnectivityMonitor::new(clock.clone()));
        let queue = Arc::new(OfflineQueue::new(
            QueueSettings { capacity: 10, ttl: Duration::from_secs(3600) },
            clock.clone(),
        ));
        let exec = RequestExecutor::new(script, monitor.clone(), queue.clone(), clock, RetryPolicy::default(), 3);
        (exec, monitor, queue)
    }

    fn write() -> Operation {
        Operation::new(Request::new(Method::Put, "https://api.example.com/events/e1"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_single_attempt() {
        let script = Script::new(vec![Ok(404)]);
        let (exec, _, _) = executor(script.clone());
        let result = exec.execute(write(), &RetryPolicy::default()).await;
        assert_eq!(result, Err(ClassifiedError::NotFound));
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_required_is_single_attempt() {
        let script = Script::new(vec![Ok(401)]);
        let (exec, _, _) = executor(script.clone());
        assert_eq!(exec.execute(write(), &RetryPolicy::default()).await, Err(ClassifiedError::AuthRequired));
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_unavailable_exhausts_retries() {
        let script = Script::new(vec![Ok(503)]);
        let (exec, _, queue) = executor(script.clone());
        let result = exec.execute(write(), &RetryPolicy::default()).await;
        assert_eq!(result, Err(ClassifiedError::ServerError(503)));
        assert_eq!(script.calls(), 4);
        // Not queueable, so nothing deferred.
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_suspends_between_attempts() {
        let script = Script::new(vec![Err(TransportError::Timeout), Ok(200)]);
        let (exec, _, _) = executor(script.clone());
        let start = tokio::time::Instant::now();
        exec.execute(write(), &RetryPolicy::default()).await.unwrap();
        let waited = start.elapsed();
        // First retry sleeps base_delay × jitter, jitter in [0.5, 1.0).
        assert!(waited >= Duration::from_millis(500));
        assert!(waited <= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_queueable_write_is_deferred() {
        let script = Script::new(vec![Err(TransportError::Reset("peer".into()))]);
        let (exec, _, queue) = executor(script.clone());
        let policy = RetryPolicy::builder().max_retries(1).build().unwrap();
        let result = exec.execute(write().queueable_with(7), &policy).await;
        assert!(matches!(result, Err(ClassifiedError::TransportFailure(_))));
        assert_eq!(script.calls(), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.snapshot()[0].max_attempts, 7);
    }

    #[tokio::test]
    async fn test_disconnected_queues_and_reports_no_connection() {
        let script = Script::new(vec![Ok(200)]);
        let (exec, monitor, queue) = executor(script.clone());
        monitor.force_offline();

        let result = exec.execute(write().queueable(), &RetryPolicy::default()).await;
        assert_eq!(result, Err(ClassifiedError::NoConnection));
        assert_eq!(script.calls(), 0);
        assert_eq!(queue.snapshot()[0].max_attempts, 3);

        // Reads are not queueable by default.
        let result = exec.execute(Operation::new(Request::get("https://api.example.com/events")), &RetryPolicy::default()).await;
        assert_eq!(result, Err(ClassifiedError::NoConnection));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_execute_json_decodes_and_flags_corruption() {
        #[derive(serde::Deserialize)]
        struct Event {
            id: String,
        }

        let script = Script::new(vec![Ok(200)]);
        let (exec, _, _) = executor(script.clone());
        let event: Event = exec.execute_json(write(), &RetryPolicy::default()).await.unwrap();
        assert_eq!(event.id, "e1");

        let err = exec
            .execute_json::<Vec<u32>>(write(), &RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifiedError::DataCorrupted(_)));
        // Corrupted data is never retried.
        assert_eq!(script.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_backoff() {
        let script = Script::new(vec![Ok(503)]);
        let (exec, _, _) = executor(script.clone());
        let cancel = tokio::time::sleep(Duration::from_millis(100));

        let result = exec.execute_until(write(), &RetryPolicy::default(), cancel).await;
        assert_eq!(result, Err(ClassifiedError::Cancelled));
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_all_collects_partial_results() {
        let script = Script::new(vec![Ok(200), Ok(404), Ok(200)]);
        let (exec, _, _) = executor(script.clone());
        let ops = vec![write(), write(), write()];

        let outcome = exec.execute_all(ops, &RetryPolicy::no_retry()).await;
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.succeeded(), 2);
        assert!(!outcome.is_complete());
        assert_eq!(outcome.errors().count(), 1);
    }

    #[tokio::test]
    async fn test_default_policy_swap() {
        let script = Script::new(vec![Ok(503)]);
        let (exec, _, _) = executor(script.clone());
        exec.set_default_policy(RetryPolicy::no_retry());
        assert_eq!(exec.default_policy().max_retries(), 0);

        let result = exec.execute_default(write()).await;
        assert_eq!(result, Err(ClassifiedError::ServerError(503)));
        assert_eq!(script.calls(), 1);
    }
}
