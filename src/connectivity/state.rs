//! Connectivity state types.

use std::fmt;

use tokio::time::Instant;

/// Current reachability belief.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityState {
    /// Nothing observed yet.
    Unknown,
    /// Interface is up, waiting on a probe result.
    Connecting,
    /// Backend reachable.
    Connected,
    /// No network interface.
    Disconnected,
    /// Interface up but backend unreachable.
    Error(String),
}

impl ConnectivityState {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectivityState::Unknown => "unknown",
            ConnectivityState::Connecting => "connecting",
            ConnectivityState::Connected => "connected",
            ConnectivityState::Disconnected => "disconnected",
            ConnectivityState::Error(_) => "error",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectivityState::Connected)
    }

    /// Disconnected or Error: states after which a return to Connected counts as a reconnect.
    pub fn is_offline(&self) -> bool {
        matches!(self, ConnectivityState::Disconnected | ConnectivityState::Error(_))
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivityState::Error(reason) => write!(f, "error({})", reason),
            other => f.write_str(other.name()),
        }
    }
}

/// Consistent view of the monitor at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    pub state: ConnectivityState,
    /// When `state` was entered.
    pub since: Instant,
    /// When the monitor last entered `Connected`.
    pub last_connected: Option<Instant>,
    /// Probe results are being ignored due to a manual override.
    pub overridden: bool,
}

/// A published state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ConnectivityState,
    pub to: ConnectivityState,
    pub at: Instant,
}

/// Interface-level reachability signal from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassiveSignal {
    InterfaceUp,
    InterfaceDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_states() {
        assert!(ConnectivityState::Disconnected.is_offline());
        assert!(ConnectivityState::Error("dns".into()).is_offline());
        assert!(!ConnectivityState::Connecting.is_offline());
        assert!(!ConnectivityState::Unknown.is_offline());
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectivityState::Connected.to_string(), "connected");
        assert_eq!(
            ConnectivityState::Error("status 503".into()).to_string(),
            "error(status 503)"
        );
    }
}
