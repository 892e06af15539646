//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (delays > 0, multiplier > 1, capacity > 0)
//! - Check the probe target parses as a URL
//! - Reject 408/429 in `retryable_status_codes`: those statuses classify as
//!   timeout/rate_limited and are decided by `retryable_kinds`
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::ClientConfig;
use crate::resilience::classify::{classify_status, ErrorKind};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let retry = &config.retry;
    if retry.base_delay_ms == 0 {
        errors.push(ValidationError::new("retry.base_delay_ms", "must be greater than 0"));
    }
    if retry.max_delay_ms < retry.base_delay_ms {
        errors.push(ValidationError::new(
            "retry.max_delay_ms",
            format!("must be >= base_delay_ms ({})", retry.base_delay_ms),
        ));
    }
    if retry.backoff_multiplier <= 1.0 || !retry.backoff_multiplier.is_finite() {
        errors.push(ValidationError::new(
            "retry.backoff_multiplier",
            format!("must be a finite value > 1.0, got {}", retry.backoff_multiplier),
        ));
    }
    for code in &retry.retryable_status_codes {
        if !(400..=599).contains(code) {
            errors.push(ValidationError::new(
                "retry.retryable_status_codes",
                format!("{} is not an error status", code),
            ));
        } else if let Some(kind) = classify_status(*code)
            .map(|e| e.kind())
            .filter(|k| *k != ErrorKind::ServerError)
        {
            errors.push(ValidationError::new(
                "retry.retryable_status_codes",
                format!("{} is classified as '{}'; list that kind in retryable_kinds instead", code, kind),
            ));
        }
    }
    for kind in &retry.retryable_kinds {
        match kind.parse::<ErrorKind>() {
            Ok(parsed) if parsed.is_terminal() => errors.push(ValidationError::new(
                "retry.retryable_kinds",
                format!("'{}' is never retryable", kind),
            )),
            Ok(_) => {}
            Err(_) => errors.push(ValidationError::new(
                "retry.retryable_kinds",
                format!("unknown error kind '{}'", kind),
            )),
        }
    }

    if config.queue.capacity == 0 {
        errors.push(ValidationError::new("queue.capacity", "must be greater than 0"));
    }
    if config.queue.ttl_secs == 0 {
        errors.push(ValidationError::new("queue.ttl_secs", "must be greater than 0"));
    }
    if config.queue.default_max_attempts == 0 {
        errors.push(ValidationError::new(
            "queue.default_max_attempts",
            "must be greater than 0",
        ));
    }

    if config.probe.interval_secs == 0 {
        errors.push(ValidationError::new("probe.interval_secs", "must be greater than 0"));
    }
    if config.probe.timeout_secs == 0 {
        errors.push(ValidationError::new("probe.timeout_secs", "must be greater than 0"));
    }
    if let Err(e) = Url::parse(&config.probe.target) {
        errors.push(ValidationError::new(
            "probe.target",
            format!("invalid URL '{}': {}", config.probe.target, e),
        ));
    }

    if config.transport.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "transport.request_timeout_secs",
            "must be greater than 0",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
