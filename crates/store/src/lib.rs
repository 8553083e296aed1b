//! Credential store backends.
//!
//! One opaque blob, loaded at startup and overwritten on every credential
//! update from the transport. The sled backend is the durable default; the
//! in-memory backend serves ephemeral sessions and tests.

use std::path::Path;

use {
    async_trait::async_trait,
    tokio::sync::Mutex,
    tracing::debug,
    wagate_session::{CredentialStore, StoreError},
    wagate_transport::CredentialBlob,
};

/// Single fixed key: this process owns exactly one account.
const CREDENTIAL_KEY: &[u8] = b"credentials";

fn backend(e: sled::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

// ── Sled backend ─────────────────────────────────────────────────────────────

/// Durable credential store on a sled tree. Saves flush before returning,
/// so a completed `save` survives a crash.
pub struct SledCredentialStore {
    db: sled::Db,
}

impl SledCredentialStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref()).map_err(backend)?;
        debug!(path = %path.as_ref().display(), "opened credential store");
        Ok(Self { db })
    }
}

#[async_trait]
impl CredentialStore for SledCredentialStore {
    async fn load(&self) -> Result<Option<CredentialBlob>, StoreError> {
        let value = self.db.get(CREDENTIAL_KEY).map_err(backend)?;
        Ok(value.map(|bytes| CredentialBlob::new(bytes.to_vec())))
    }

    async fn save(&self, blob: &CredentialBlob) -> Result<(), StoreError> {
        self.db
            .insert(CREDENTIAL_KEY, blob.as_bytes())
            .map_err(backend)?;
        self.db.flush_async().await.map_err(backend)?;
        Ok(())
    }

    async fn reset(&self) -> Result<(), StoreError> {
        self.db.remove(CREDENTIAL_KEY).map_err(backend)?;
        self.db.flush_async().await.map_err(backend)?;
        Ok(())
    }
}

// ── In-memory backend ────────────────────────────────────────────────────────

/// Ephemeral credential store; every process start pairs fresh.
#[derive(Default)]
pub struct MemoryCredentialStore {
    blob: Mutex<Option<CredentialBlob>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<CredentialBlob>, StoreError> {
        Ok(self.blob.lock().await.clone())
    }

    async fn save(&self, blob: &CredentialBlob) -> Result<(), StoreError> {
        *self.blob.lock().await = Some(blob.clone());
        Ok(())
    }

    async fn reset(&self) -> Result<(), StoreError> {
        *self.blob.lock().await = None;
        Ok(())
    }
}
