//! Session state owned by the lifecycle manager.

use std::sync::Arc;

use {serde::Serialize, wagate_transport::TransportHandle};

/// Connectivity phase of the single process-wide session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    AwaitingPairing,
    Connected,
    /// Terminal for the current credential set: no automatic reconnect
    /// until an explicit `start()` after a credential reset.
    LoggedOut,
}

impl SessionPhase {
    /// A connection attempt is in flight or active; `start()` is a no-op.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::AwaitingPairing | Self::Connected
        )
    }
}

/// The mutable session entity. Only the manager touches it, always behind
/// its lock; exactly one live transport handle exists at a time.
pub(crate) struct SessionState {
    pub(crate) phase: SessionPhase,
    pub(crate) pairing_code: Option<String>,
    pub(crate) account_id: Option<String>,
    pub(crate) handle: Option<Arc<dyn TransportHandle>>,
    /// Bumped on every connect attempt and explicit disconnect. Events and
    /// in-flight opens from superseded connections compare against it and
    /// drop themselves.
    pub(crate) epoch: u64,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        Self {
            phase: SessionPhase::Disconnected,
            pairing_code: None,
            account_id: None,
            handle: None,
            epoch: 0,
        }
    }

    pub(crate) fn clear_artifacts(&mut self) {
        self.pairing_code = None;
        self.account_id = None;
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            pairing_code: self.pairing_code.clone(),
            account_id: self.account_id.clone(),
        }
    }
}

/// Read-only point-in-time copy for the control surface. Never carries the
/// transport handle.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    /// Present exactly while awaiting pairing.
    pub pairing_code: Option<String>,
    /// Present exactly while connected.
    pub account_id: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn phase_activity() {
        assert!(SessionPhase::Connecting.is_active());
        assert!(SessionPhase::AwaitingPairing.is_active());
        assert!(SessionPhase::Connected.is_active());
        assert!(!SessionPhase::Disconnected.is_active());
        assert!(!SessionPhase::LoggedOut.is_active());
    }

    #[test]
    fn phase_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SessionPhase::AwaitingPairing).unwrap(),
            "\"awaiting_pairing\""
        );
        assert_eq!(
            serde_json::to_string(&SessionPhase::LoggedOut).unwrap(),
            "\"logged_out\""
        );
    }

    #[test]
    fn snapshot_copies_fields() {
        let mut state = SessionState::new();
        state.phase = SessionPhase::AwaitingPairing;
        state.pairing_code = Some("ABC123".into());

        let snap = state.snapshot();
        assert_eq!(snap.phase, SessionPhase::AwaitingPairing);
        assert_eq!(snap.pairing_code.as_deref(), Some("ABC123"));
        assert_eq!(snap.account_id, None);
    }
}
