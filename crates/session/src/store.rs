//! Credential store capability.
//!
//! The manager only needs load/save/reset over one opaque blob; storage
//! mechanics live in `wagate-store`.

use {async_trait::async_trait, wagate_transport::CredentialBlob};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("credential store io: {0}")]
    Io(#[from] std::io::Error),

    #[error("credential store backend: {0}")]
    Backend(String),
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the persisted blob, if any.
    async fn load(&self) -> Result<Option<CredentialBlob>, StoreError>;

    /// Durably save the blob. Must be atomic: a crash mid-save leaves
    /// either the old or the new blob, never a torn one.
    async fn save(&self, blob: &CredentialBlob) -> Result<(), StoreError>;

    /// Drop persisted credentials; the next start pairs fresh.
    async fn reset(&self) -> Result<(), StoreError>;
}
