//! Transport client capability interface.
//!
//! The session manager drives exactly one messaging-network connection at a
//! time through the [`Transport`] and [`TransportHandle`] traits; concrete
//! protocol clients live behind them. Lifecycle events flow back over the
//! mpsc channel handed to [`Transport::open`].

#[cfg(feature = "mock")]
pub mod mock;
pub mod ws;

use std::{fmt, sync::Arc};

use {async_trait::async_trait, serde::Deserialize, serde::Serialize, tokio::sync::mpsc};

pub use ws::WsTransport;

// ── Credentials ──────────────────────────────────────────────────────────────

/// Opaque credential material allowing a session to resume without
/// re-pairing. Versioning is the protocol client's business; this process
/// only loads, holds, and persists the bytes.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialBlob(Vec<u8>);

impl CredentialBlob {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// An empty blob is valid and means "no prior session" (fresh pairing).
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Debug for CredentialBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialBlob({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for CredentialBlob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

// ── Events ───────────────────────────────────────────────────────────────────

/// Why a connection closed. Drives the retry-vs-terminal decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The account was explicitly signed out, locally or by the network.
    LoggedOut,
    /// Ordinary network loss.
    ConnectionLost,
    /// The remote end is restarting.
    ServerRestart,
    /// The connection timed out.
    Timeout,
    /// Anything the protocol client could not classify.
    Unknown,
}

/// Lifecycle events emitted by a transport after `open` returns.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A pairing artifact was issued (may rotate before the session opens).
    Pairing { code: String },
    /// The session is live under the given account identifier.
    Opened { account_id: String },
    /// The connection closed.
    Closed { reason: CloseReason },
    /// The protocol client rotated its credential material.
    CredentialUpdate { blob: CredentialBlob },
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("failed to open transport: {0}")]
    Open(String),

    /// An outbound send was not accepted.
    #[error("send failed: {0}")]
    Send(String),

    /// The network logout call failed.
    #[error("logout failed: {0}")]
    Logout(String),

    /// The underlying connection is gone.
    #[error("transport connection closed")]
    Closed,
}

// ── Capability traits ────────────────────────────────────────────────────────

/// Opens sessions against the messaging network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish a connection with the given credentials. Events are
    /// delivered on `events` asynchronously after this returns; the returned
    /// handle is the only way to reach the live connection.
    async fn open(
        &self,
        credentials: CredentialBlob,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Arc<dyn TransportHandle>, TransportError>;
}

/// A live connection. Exactly one exists per session; the manager replaces
/// it wholesale on reconnect.
#[async_trait]
pub trait TransportHandle: Send + Sync {
    /// Send a text message to a fully-normalized address.
    async fn send_text(&self, address: &str, body: &str) -> Result<(), TransportError>;

    /// Sign the account out at the network level.
    async fn logout(&self) -> Result<(), TransportError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn credential_blob_debug_redacts_contents() {
        let blob = CredentialBlob::new(b"secret-session-keys".to_vec());
        assert_eq!(format!("{blob:?}"), "CredentialBlob(19 bytes)");
    }

    #[test]
    fn empty_blob_is_empty() {
        assert!(CredentialBlob::empty().is_empty());
        assert!(CredentialBlob::default().is_empty());
        assert!(!CredentialBlob::new(vec![1]).is_empty());
    }

    #[test]
    fn close_reason_wire_encoding() {
        let json = serde_json::to_string(&CloseReason::LoggedOut).unwrap();
        assert_eq!(json, "\"logged_out\"");
        let back: CloseReason = serde_json::from_str("\"connection_lost\"").unwrap();
        assert_eq!(back, CloseReason::ConnectionLost);
    }
}
