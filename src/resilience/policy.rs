//! Retry policy.
//!
//! # Responsibilities
//! - Hold immutable retry configuration
//! - Decide whether a classified failure is retryable
//! - Compute the jittered backoff delay for a retry index
//!
//! # Design Decisions
//! - Constructed through a validating builder; never mutated afterwards
//! - Shared by value (cheap clone) or behind `ArcSwap` for hot reload
//! - 401/403/404, corrupted data, missing connectivity and cancellation are
//!   never retryable, whatever the configured sets contain
//! - Exactly one set decides each failure: `retryable_status_codes` covers
//!   `ServerError(code)` only, and `retryable_kinds` covers everything else.
//!   408 and 429 classify as `Timeout` and `RateLimited`, so they are governed
//!   by the kind set and never appear in the default code set

use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;

use crate::config::RetryConfig;
use crate::resilience::backoff::{calculate_backoff, exponential_delay, scaled_delay};
use crate::resilience::classify::{ClassifiedError, ErrorKind};

/// Invalid retry policy parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("base delay must be greater than zero")]
    ZeroBaseDelay,

    #[error("max delay {max:?} is shorter than base delay {base:?}")]
    MaxBelowBase { base: Duration, max: Duration },

    #[error("backoff multiplier must be a finite value > 1.0, got {0}")]
    InvalidMultiplier(f64),

    #[error("{0} can never be retried")]
    TerminalKind(ErrorKind),

    #[error("unknown error kind '{0}'")]
    UnknownKind(String),
}

/// Immutable retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    /// Consulted for `ServerError(code)` only.
    retryable_status_codes: HashSet<u16>,
    /// Consulted for every non-terminal kind except `ServerError`.
    retryable_kinds: HashSet<ErrorKind>,
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// Policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    pub fn retryable_status_codes(&self) -> &HashSet<u16> {
        &self.retryable_status_codes
    }

    pub fn retryable_kinds(&self) -> &HashSet<ErrorKind> {
        &self.retryable_kinds
    }

    /// Total attempts this policy allows, first attempt included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn is_retryable(&self, error: &ClassifiedError) -> bool {
        let kind = error.kind();
        if kind.is_terminal() {
            return false;
        }
        match error {
            ClassifiedError::ServerError(code) => self.retryable_status_codes.contains(code),
            _ => self.retryable_kinds.contains(&kind),
        }
    }

    /// Jittered delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_delay, self.backoff_multiplier, self.max_delay)
    }

    /// Delay before retry number `attempt` with no jitter applied.
    pub fn nominal_delay_for(&self, attempt: u32) -> Duration {
        exponential_delay(attempt, self.base_delay, self.backoff_multiplier, self.max_delay)
    }

    /// Delay with a caller-supplied jitter factor.
    pub fn delay_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        scaled_delay(attempt, self.base_delay, self.backoff_multiplier, self.max_delay, jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            retryable_status_codes: [500, 502, 503, 504].into_iter().collect(),
            retryable_kinds: [
                ErrorKind::Timeout,
                ErrorKind::RateLimited,
                ErrorKind::TransportFailure,
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl TryFrom<&RetryConfig> for RetryPolicy {
    type Error = PolicyError;

    fn try_from(config: &RetryConfig) -> Result<Self, Self::Error> {
        let kinds = config
            .retryable_kinds
            .iter()
            .map(|name| {
                name.parse::<ErrorKind>()
                    .map_err(|_| PolicyError::UnknownKind(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        RetryPolicy::builder()
            .max_retries(config.max_retries)
            .base_delay(Duration::from_millis(config.base_delay_ms))
            .max_delay(Duration::from_millis(config.max_delay_ms))
            .backoff_multiplier(config.backoff_multiplier)
            .retryable_status_codes(config.retryable_status_codes.iter().copied())
            .retryable_kinds(kinds)
            .build()
    }
}

/// Builder for [`RetryPolicy`]; starts from the defaults.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.policy.max_retries = max_retries;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.policy.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.policy.backoff_multiplier = multiplier;
        self
    }

    pub fn retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.policy.retryable_status_codes = codes.into_iter().collect();
        self
    }

    pub fn retryable_kinds(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.policy.retryable_kinds = kinds.into_iter().collect();
        self
    }

    pub fn build(self) -> Result<RetryPolicy, PolicyError> {
        let policy = self.policy;
        if policy.base_delay.is_zero() {
            return Err(PolicyError::ZeroBaseDelay);
        }
        if policy.max_delay < policy.base_delay {
            return Err(PolicyError::MaxBelowBase {
                base: policy.base_delay,
                max: policy.max_delay,
            });
        }
        if !policy.backoff_multiplier.is_finite() || policy.backoff_multiplier <= 1.0 {
            return Err(PolicyError::InvalidMultiplier(policy.backoff_multiplier));
        }
        if let Some(kind) = policy.retryable_kinds.iter().find(|k| k.is_terminal()) {
            return Err(PolicyError::TerminalKind(*kind));
        }
        Ok(policy)
    }
}
