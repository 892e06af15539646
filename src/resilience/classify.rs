//! Failure classification.
//!
//! # Responsibilities
//! - Map status codes and transport failures onto [`ClassifiedError`]
//! - Expose a fieldless [`ErrorKind`] for configuration and metrics labels
//!
//! # Classification Table
//! ```text
//! 200-299                 → success
//! 401                     → AuthRequired      (never retried)
//! 403                     → Forbidden         (never retried)
//! 404                     → NotFound          (never retried)
//! 408                     → Timeout
//! 429                     → RateLimited
//! other 4xx/5xx           → ServerError(code) (retried if code is configured)
//! 1xx/3xx                 → InvalidResponse
//! transport timeout       → Timeout
//! other transport failure → TransportFailure
//! undecodable body        → DataCorrupted     (never retried)
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::{Response, TransportError};

/// The error a caller of the executor receives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifiedError {
    #[error("no network connection")]
    NoConnection,

    #[error("request timed out")]
    Timeout,

    #[error("invalid response (status {0})")]
    InvalidResponse(u16),

    #[error("server error (status {0})")]
    ServerError(u16),

    #[error("rate limited")]
    RateLimited,

    #[error("authentication required")]
    AuthRequired,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("response data corrupted: {0}")]
    DataCorrupted(String),

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("request cancelled")]
    Cancelled,
}

impl ClassifiedError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClassifiedError::NoConnection => ErrorKind::NoConnection,
            ClassifiedError::Timeout => ErrorKind::Timeout,
            ClassifiedError::InvalidResponse(_) => ErrorKind::InvalidResponse,
            ClassifiedError::ServerError(_) => ErrorKind::ServerError,
            ClassifiedError::RateLimited => ErrorKind::RateLimited,
            ClassifiedError::AuthRequired => ErrorKind::AuthRequired,
            ClassifiedError::Forbidden => ErrorKind::Forbidden,
            ClassifiedError::NotFound => ErrorKind::NotFound,
            ClassifiedError::DataCorrupted(_) => ErrorKind::DataCorrupted,
            ClassifiedError::TransportFailure(_) => ErrorKind::TransportFailure,
            ClassifiedError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Status code carried by the error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClassifiedError::InvalidResponse(code) | ClassifiedError::ServerError(code) => {
                Some(*code)
            }
            ClassifiedError::AuthRequired => Some(401),
            ClassifiedError::Forbidden => Some(403),
            ClassifiedError::NotFound => Some(404),
            ClassifiedError::RateLimited => Some(429),
            _ => None,
        }
    }
}

/// Fieldless discriminant of [`ClassifiedError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoConnection,
    Timeout,
    InvalidResponse,
    ServerError,
    RateLimited,
    AuthRequired,
    Forbidden,
    NotFound,
    DataCorrupted,
    TransportFailure,
    Cancelled,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 11] = [
        ErrorKind::NoConnection,
        ErrorKind::Timeout,
        ErrorKind::InvalidResponse,
        ErrorKind::ServerError,
        ErrorKind::RateLimited,
        ErrorKind::AuthRequired,
        ErrorKind::Forbidden,
        ErrorKind::NotFound,
        ErrorKind::DataCorrupted,
        ErrorKind::TransportFailure,
        ErrorKind::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NoConnection => "no_connection",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidResponse => "invalid_response",
            ErrorKind::ServerError => "server_error",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::AuthRequired => "auth_required",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::DataCorrupted => "data_corrupted",
            ErrorKind::TransportFailure => "transport_failure",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    /// Kinds that no policy may mark retryable.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ErrorKind::NoConnection
                | ErrorKind::AuthRequired
                | ErrorKind::Forbidden
                | ErrorKind::NotFound
                | ErrorKind::DataCorrupted
                | ErrorKind::Cancelled
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown kind name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown error kind '{0}'")]
pub struct UnknownErrorKind(pub String);

impl FromStr for ErrorKind {
    type Err = UnknownErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownErrorKind(s.to_string()))
    }
}

/// Classify a status code. `None` means success.
pub fn classify_status(status: u16) -> Option<ClassifiedError> {
    match status {
        200..=299 => None,
        401 => Some(ClassifiedError::AuthRequired),
        403 => Some(ClassifiedError::Forbidden),
        404 => Some(ClassifiedError::NotFound),
        408 => Some(ClassifiedError::Timeout),
        429 => Some(ClassifiedError::RateLimited),
        400..=599 => Some(ClassifiedError::ServerError(status)),
        _ => Some(ClassifiedError::InvalidResponse(status)),
    }
}

/// Classify the outcome of a single transport exchange.
pub fn classify_outcome(
    outcome: Result<Response, TransportError>,
) -> Result<Response, ClassifiedError> {
    match outcome {
        Ok(response) => match classify_status(response.status) {
            None => Ok(response),
            Some(err) => Err(err),
        },
        Err(e) => Err(classify_transport(&e)),
    }
}

pub fn classify_transport(error: &TransportError) -> ClassifiedError {
    match error {
        TransportError::Timeout => ClassifiedError::Timeout,
        other => ClassifiedError::TransportFailure(other.to_string()),
    }
}

/// Decode a successful JSON body; malformed payloads are `DataCorrupted`.
pub fn decode_json<T: serde::de::DeserializeOwned>(
    response: &Response,
) -> Result<T, ClassifiedError> {
    serde_json::from_slice(&response.body)
        .map_err(|e| ClassifiedError::DataCorrupted(e.to_string()))
}
