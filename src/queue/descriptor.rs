//! Replayable operation descriptors.

use serde::{Deserialize, Serialize};

use crate::transport::Request;

/// A deferred unit of work, described as data rather than a closure.
///
/// Descriptors are serializable so a persistent queue could store them; the
/// queue in this crate keeps them in memory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationDescriptor {
    /// Re-send a transport request as-is.
    Request { request: Request },
    /// Dispatch to an application handler registered under `name`.
    Named {
        name: String,
        #[serde(default)]
        params: serde_json::Value,
    },
}

impl OperationDescriptor {
    pub fn request(request: Request) -> Self {
        OperationDescriptor::Request { request }
    }

    pub fn named(name: impl Into<String>, params: serde_json::Value) -> Self {
        OperationDescriptor::Named {
            name: name.into(),
            params,
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> String {
        match self {
            OperationDescriptor::Request { request } => {
                format!("{} {}", request.method, request.target)
            }
            OperationDescriptor::Named { name, .. } => name.clone(),
        }
    }
}
