//! In-process mock transport for tests (behind the `mock` feature).
//!
//! Records opens, sends, and logouts, and lets tests inject lifecycle
//! events into whatever connection is currently live.

use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use {async_trait::async_trait, tokio::sync::mpsc};

use crate::{CredentialBlob, Transport, TransportError, TransportEvent, TransportHandle};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct MockInner {
    opens: AtomicUsize,
    logouts: AtomicUsize,
    fail_open: AtomicBool,
    fail_send: AtomicBool,
    fail_logout: AtomicBool,
    events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    opened_with: Mutex<Vec<CredentialBlob>>,
    sent: Mutex<Vec<(String, String)>>,
}

/// Scripted transport double. Cheap to clone; all clones share state.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `open` calls accepted so far.
    pub fn open_count(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    pub fn logout_count(&self) -> usize {
        self.inner.logouts.load(Ordering::SeqCst)
    }

    /// Credentials each successful `open` was called with, in order.
    pub fn opened_with(&self) -> Vec<CredentialBlob> {
        lock(&self.inner.opened_with).clone()
    }

    /// `(address, body)` pairs accepted by the live handle, in order.
    pub fn sent(&self) -> Vec<(String, String)> {
        lock(&self.inner.sent).clone()
    }

    pub fn fail_next_open(&self, fail: bool) {
        self.inner.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.inner.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn fail_logouts(&self, fail: bool) {
        self.inner.fail_logout.store(fail, Ordering::SeqCst);
    }

    /// Inject an event into the most recently opened connection. Returns
    /// false when no connection is live or the manager stopped listening.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        let sender = lock(&self.inner.events).clone();
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(
        &self,
        credentials: CredentialBlob,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Arc<dyn TransportHandle>, TransportError> {
        if self.inner.fail_open.load(Ordering::SeqCst) {
            return Err(TransportError::Open("mock open failure".into()));
        }
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.opened_with).push(credentials);
        *lock(&self.inner.events) = Some(events);
        Ok(Arc::new(MockHandle {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MockHandle {
    inner: Arc<MockInner>,
}

#[async_trait]
impl TransportHandle for MockHandle {
    async fn send_text(&self, address: &str, body: &str) -> Result<(), TransportError> {
        if self.inner.fail_send.load(Ordering::SeqCst) {
            return Err(TransportError::Send("mock send failure".into()));
        }
        lock(&self.inner.sent).push((address.to_string(), body.to_string()));
        Ok(())
    }

    async fn logout(&self) -> Result<(), TransportError> {
        self.inner.logouts.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_logout.load(Ordering::SeqCst) {
            return Err(TransportError::Logout("mock logout failure".into()));
        }
        Ok(())
    }
}
