//! Replay of queued operations.
//!
//! # Responsibilities
//! - Define the [`Replayer`] seam the queue drains through
//! - Replay `Request` descriptors with a single transport exchange
//! - Dispatch `Named` descriptors to handlers registered at runtime

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::queue::descriptor::OperationDescriptor;
use crate::resilience::classify::{classify_outcome, ClassifiedError};
use crate::transport::Transport;

/// Why a single replay attempt failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Request(#[from] ClassifiedError),

    #[error("no handler registered for '{0}'")]
    UnknownHandler(String),
}

/// Performs one replay attempt of a descriptor.
pub trait Replayer: Send + Sync {
    fn replay<'a>(&'a self, descriptor: &'a OperationDescriptor) -> BoxFuture<'a, Result<(), ReplayError>>;
}

/// Application handler for `Named` descriptors.
pub trait OperationHandler: Send + Sync {
    fn handle<'a>(&'a self, params: &'a serde_json::Value) -> BoxFuture<'a, Result<(), ClassifiedError>>;
}

/// Adapts a closure into a [`Replayer`].
pub struct FnReplayer<F>(F);

pub fn replay_fn<F, Fut>(f: F) -> FnReplayer<F>
where
    F: Fn(&OperationDescriptor) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ReplayError>> + Send + 'static,
{
    FnReplayer(f)
}

impl<F, Fut> Replayer for FnReplayer<F>
where
    F: Fn(&OperationDescriptor) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ReplayError>> + Send + 'static,
{
    fn replay<'a>(&'a self, descriptor: &'a OperationDescriptor) -> BoxFuture<'a, Result<(), ReplayError>> {
        Box::pin((self.0)(descriptor))
    }
}

/// Replays requests through a transport and named operations through registered handlers.
pub struct TransportReplayer {
    transport: Arc<dyn Transport>,
    handlers: DashMap<String, Arc<dyn OperationHandler>>,
}

impl TransportReplayer {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            handlers: DashMap::new(),
        }
    }

    /// Register (or replace) the handler for `name`.
    pub fn register_handler(&self, name: impl Into<String>, handler: Arc<dyn OperationHandler>) {
        let name = name.into();
        if self.handlers.insert(name.clone(), handler).is_some() {
            tracing::debug!(name = %name, "Replaced operation handler");
        }
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    async fn replay_descriptor(&self, descriptor: &OperationDescriptor) -> Result<(), ReplayError> {
        match descriptor {
            OperationDescriptor::Request { request } => {
                let outcome = self.transport.send(request.clone()).await;
                classify_outcome(outcome)?;
                Ok(())
            }
            OperationDescriptor::Named { name, params } => {
                // Clone out of the map so no shard lock is held across the await.
                let handler = self
                    .handlers
                    .get(name)
                    .map(|entry| entry.value().clone())
                    .ok_or_else(|| ReplayError::UnknownHandler(name.clone()))?;
                handler.handle(params).await?;
                Ok(())
            }
        }
    }
}

impl Replayer for TransportReplayer {
    fn replay<'a>(&'a self, descriptor: &'a OperationDescriptor) -> BoxFuture<'a, Result<(), ReplayError>> {
        Box::pin(self.replay_descriptor(descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Request, Response, TransportError};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedStatus(u16);

    impl Transport for FixedStatus {
        fn send(&self, _request: Request) -> BoxFuture<'_, Result<Response, TransportError>> {
            let status = self.0;
            Box::pin(async move { Ok(Response::new(status, "")) })
        }
    }

    struct CountingHandler(AtomicUsize);

    impl OperationHandler for CountingHandler {
        fn handle<'a>(&'a self, params: &'a serde_json::Value) -> BoxFuture<'a, Result<(), ClassifiedError>> {
            Box::pin(async move {
                self.0.fetch_add(1, Ordering::SeqCst);
                if params["fail"].as_bool().unwrap_or(false) {
                    Err(ClassifiedError::ServerError(500))
                } else {
                    Ok(())
                }
            })
        }
    }

    #[tokio::test]
    async fn test_request_replay_classifies_status() {
        let ok = TransportReplayer::new(Arc::new(FixedStatus(201)));
        let op = OperationDescriptor::request(Request::get("https://api.example.com/events"));
        assert!(ok.replay(&op).await.is_ok());

        let failing = TransportReplayer::new(Arc::new(FixedStatus(503)));
        assert_eq!(
            failing.replay(&op).await,
            Err(ReplayError::Request(ClassifiedError::ServerError(503)))
        );
    }

    #[tokio::test]
    async fn test_named_dispatch() {
        let replayer = TransportReplayer::new(Arc::new(FixedStatus(200)));
        let handler = Arc::new(CountingHandler(AtomicUsize::new(0)));
        replayer.register_handler("rsvp", handler.clone());
        assert!(replayer.has_handler("rsvp"));

        assert!(replayer.replay(&OperationDescriptor::named("rsvp", json!({}))).await.is_ok());
        assert!(replayer
            .replay(&OperationDescriptor::named("rsvp", json!({ "fail": true })))
            .await
            .is_err());
        assert_eq!(handler.0.load(Ordering::SeqCst), 2);

        assert_eq!(
            replayer.replay(&OperationDescriptor::named("missing", json!(null))).await,
            Err(ReplayError::UnknownHandler("missing".into()))
        );
    }

    #[tokio::test]
    async fn test_fn_replayer() {
        let replayer = replay_fn(|op: &OperationDescriptor| {
            let ok = op.label() == "ok";
            async move {
                if ok {
                    Ok(())
                } else {
                    Err(ReplayError::Request(ClassifiedError::Timeout))
                }
            }
        });
        assert!(replayer.replay(&OperationDescriptor::named("ok", json!(null))).await.is_ok());
        assert!(replayer.replay(&OperationDescriptor::named("no", json!(null))).await.is_err());
    }
}
