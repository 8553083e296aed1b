//! Reconnection policy: retry on transient loss, stop on explicit logout.

use std::time::Duration;

use wagate_transport::CloseReason;

/// Fixed delay between reconnect attempts. Constant rather than
/// exponential: one session, at most one pending timer, so the reconnect
/// rate is already bounded.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// What to do after a connection closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Schedule one reconnect attempt after the fixed delay.
    Retry,
    /// Stay down until an explicit `start()`.
    Terminal,
}

/// Classify a closure reason. An explicit logout, local or remote, is
/// terminal; every other closure self-heals.
pub fn classify(reason: CloseReason) -> ReconnectDecision {
    match reason {
        CloseReason::LoggedOut => ReconnectDecision::Terminal,
        CloseReason::ConnectionLost
        | CloseReason::ServerRestart
        | CloseReason::Timeout
        | CloseReason::Unknown => ReconnectDecision::Retry,
    }
}
