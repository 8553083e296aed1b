//! Outbound dispatch gateway.
//!
//! Validates a send request against the live session and forwards it to
//! the transport. No retries and no local message log; a failed send is
//! the caller's problem to repeat.

use {
    chrono::{DateTime, Utc},
    serde::Serialize,
    tracing::debug,
    wagate_transport::TransportError,
};

use crate::manager::SessionManager;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The session is not connected; the transport was never contacted.
    #[error("session is not connected")]
    NotConnected,

    /// The recipient held no digits and no network qualifier.
    #[error("recipient is not a valid address")]
    InvalidRecipient,

    /// Empty message body.
    #[error("message body is empty")]
    InvalidPayload,

    /// The transport refused the send.
    #[error("dispatch failed: {0}")]
    Dispatch(#[source] TransportError),
}

/// Acknowledgement of an accepted send. No delivery confirmation implied.
#[derive(Debug, Clone, Serialize)]
pub struct SendReceipt {
    /// Locally generated timestamp-based token.
    pub message_id: String,
    /// The normalized address the message went to.
    pub to: String,
    pub timestamp: DateTime<Utc>,
}

/// Normalize a recipient into a network address. Input already carrying a
/// network qualifier (`@`) passes through untouched; everything else is
/// reduced to its digits.
pub fn normalize_recipient(recipient: &str) -> Result<String, DispatchError> {
    if recipient.contains('@') {
        return Ok(recipient.to_string());
    }
    let digits: String = recipient.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(DispatchError::InvalidRecipient);
    }
    Ok(digits)
}

impl SessionManager {
    /// Validate and forward one outbound message. Checks run in order:
    /// connectivity, recipient, payload — the transport is only reached
    /// when all three pass.
    pub async fn send_text(
        &self,
        recipient: &str,
        body: &str,
    ) -> Result<SendReceipt, DispatchError> {
        let handle = self
            .connected_handle()
            .await
            .ok_or(DispatchError::NotConnected)?;
        let address = normalize_recipient(recipient)?;
        if body.is_empty() {
            return Err(DispatchError::InvalidPayload);
        }

        handle
            .send_text(&address, body)
            .await
            .map_err(DispatchError::Dispatch)?;

        let timestamp = Utc::now();
        let receipt = SendReceipt {
            message_id: format!("snd-{}", timestamp.timestamp_millis()),
            to: address,
            timestamp,
        };
        debug!(to = %receipt.to, id = %receipt.message_id, "message dispatched");
        Ok(receipt)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use {
        async_trait::async_trait,
        tokio::sync::Mutex,
        wagate_transport::{CredentialBlob, TransportEvent, mock::MockTransport},
    };

    use {
        super::*,
        crate::{
            manager::SessionConfig,
            state::SessionPhase,
            store::{CredentialStore, StoreError},
        },
    };

    #[derive(Default)]
    struct MemStore(Mutex<Option<CredentialBlob>>);

    #[async_trait]
    impl CredentialStore for MemStore {
        async fn load(&self) -> Result<Option<CredentialBlob>, StoreError> {
            Ok(self.0.lock().await.clone())
        }

        async fn save(&self, blob: &CredentialBlob) -> Result<(), StoreError> {
            *self.0.lock().await = Some(blob.clone());
            Ok(())
        }

        async fn reset(&self) -> Result<(), StoreError> {
            *self.0.lock().await = None;
            Ok(())
        }
    }

    async fn connected_manager() -> (SessionManager, MockTransport) {
        let transport = MockTransport::new();
        let manager = SessionManager::new(
            Arc::new(transport.clone()),
            Arc::new(MemStore::default()),
            SessionConfig::default(),
        );
        manager.start().await;
        transport
            .emit(TransportEvent::Opened {
                account_id: "15551234567".into(),
            })
            .await;
        for _ in 0..200 {
            if manager.snapshot().await.phase == SessionPhase::Connected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        (manager, transport)
    }

    #[test]
    fn normalization_strips_everything_but_digits() {
        assert_eq!(
            normalize_recipient("+1 (555) 123-4567").unwrap(),
            "15551234567"
        );
        assert_eq!(normalize_recipient("555-123-4567").unwrap(), "5551234567");
    }

    #[test]
    fn qualified_addresses_pass_through_unchanged() {
        assert_eq!(
            normalize_recipient("15551234567@domain").unwrap(),
            "15551234567@domain"
        );
    }

    #[test]
    fn digitless_recipient_is_invalid() {
        assert!(matches!(
            normalize_recipient("not a number"),
            Err(DispatchError::InvalidRecipient)
        ));
        assert!(matches!(
            normalize_recipient(""),
            Err(DispatchError::InvalidRecipient)
        ));
    }

    #[tokio::test]
    async fn send_rejected_when_not_connected() {
        let transport = MockTransport::new();
        let manager = SessionManager::new(
            Arc::new(transport.clone()),
            Arc::new(MemStore::default()),
            SessionConfig::default(),
        );

        let result = manager.send_text("15551234567", "hello").await;
        assert!(matches!(result, Err(DispatchError::NotConnected)));
        assert!(transport.sent().is_empty(), "transport was never contacted");
    }

    #[tokio::test]
    async fn connected_send_forwards_normalized_address() {
        let (manager, transport) = connected_manager().await;

        let receipt = manager.send_text("+1 (555) 123-4567", "hello").await.unwrap();
        assert_eq!(receipt.to, "15551234567");
        assert!(receipt.message_id.starts_with("snd-"));
        assert_eq!(
            transport.sent(),
            vec![("15551234567".to_string(), "hello".to_string())]
        );
    }

    #[tokio::test]
    async fn empty_body_is_rejected_before_the_transport() {
        let (manager, transport) = connected_manager().await;

        let result = manager.send_text("15551234567", "").await;
        assert!(matches!(result, Err(DispatchError::InvalidPayload)));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_surfaces_as_dispatch_error() {
        let (manager, transport) = connected_manager().await;
        transport.fail_sends(true);

        let result = manager.send_text("15551234567", "hello").await;
        assert!(matches!(result, Err(DispatchError::Dispatch(_))));
    }
}
