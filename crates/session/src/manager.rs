//! Session lifecycle manager.
//!
//! The state machine owning connection establishment, credential
//! persistence, pairing issuance, disconnect classification, and the
//! single-slot reconnect timer. All state mutation is serialized behind one
//! lock; transport events for a connection are consumed by one sequential
//! loop, and events from superseded connections are dropped via an epoch
//! check.

use std::{
    sync::{Arc, Mutex as StdMutex, MutexGuard},
    time::Duration,
};

use {
    qrcode::{QrCode, render::unicode},
    tokio::{
        sync::{Mutex, RwLock, mpsc},
        task::JoinHandle,
    },
    tracing::{debug, info, warn},
};

use wagate_transport::{
    CloseReason, CredentialBlob, Transport, TransportError, TransportEvent, TransportHandle,
};

use crate::{
    policy::{self, DEFAULT_RECONNECT_DELAY, ReconnectDecision},
    state::{SessionPhase, SessionSnapshot, SessionState},
    store::{CredentialStore, StoreError},
};

/// Buffered transport events per connection.
const EVENT_BUFFER: usize = 32;

fn lock<T>(m: &StdMutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Lifecycle tunables.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Fixed delay before a reconnect attempt.
    pub reconnect_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Outcome of a disconnect request. Always a success from the caller's
/// perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// A live or in-flight session was torn down and marked logged out.
    LoggedOut,
    /// There was nothing to tear down.
    NoActiveSession,
}

struct ManagerInner {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    config: SessionConfig,
    state: RwLock<SessionState>,
    /// Last credentials seen this process lifetime. Preferred over the
    /// store on reconnect so a failed durable write never forces
    /// re-pairing mid-run.
    credentials: Mutex<Option<CredentialBlob>>,
    /// Single slot for the pending reconnect timer.
    reconnect: StdMutex<Option<JoinHandle<()>>>,
}

/// Owner of the single process-wide session. Cheap to clone; all clones
/// share the same state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                transport,
                store,
                config,
                state: RwLock::new(SessionState::new()),
                credentials: Mutex::new(None),
                reconnect: StdMutex::new(None),
            }),
        }
    }

    /// Begin (or resume) the session. Idempotent: a no-op while a
    /// connection attempt is in flight or active. Open and load failures
    /// are absorbed into the retry path, never returned.
    pub async fn start(&self) {
        let epoch = {
            let mut state = self.inner.state.write().await;
            if state.phase.is_active() {
                debug!(phase = ?state.phase, "start ignored, session already in flight");
                return;
            }
            state.phase = SessionPhase::Connecting;
            state.clear_artifacts();
            state.epoch += 1;
            state.epoch
        };
        self.cancel_reconnect();
        info!("opening session");

        if let Err(e) = self.connect(epoch).await {
            warn!(error = %e, "connection attempt failed, scheduling retry");
            let superseded = {
                let mut state = self.inner.state.write().await;
                if state.epoch == epoch {
                    state.phase = SessionPhase::Disconnected;
                    false
                } else {
                    true
                }
            };
            if !superseded {
                self.schedule_reconnect();
            }
        }
    }

    /// Consistent point-in-time view for the control surface.
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.read().await.snapshot()
    }

    /// User-initiated disconnect. Local state transitions to `LoggedOut`
    /// regardless of whether the network logout succeeds; with no active
    /// session this is a no-op (the timer slot is still cleared).
    pub async fn request_disconnect(&self) -> DisconnectOutcome {
        self.cancel_reconnect();
        let handle = {
            let mut state = self.inner.state.write().await;
            if !state.phase.is_active() && state.handle.is_none() {
                return DisconnectOutcome::NoActiveSession;
            }
            state.epoch += 1;
            state.clear_artifacts();
            state.phase = SessionPhase::LoggedOut;
            state.handle.take()
        };

        if let Some(handle) = handle {
            if let Err(e) = handle.logout().await {
                warn!(error = %e, "network logout failed; session is logged out locally regardless");
            }
        }
        info!("session disconnected by request");
        DisconnectOutcome::LoggedOut
    }

    /// Drop credential material, in memory and durably. The next `start()`
    /// pairs fresh; this is the recovery path out of `LoggedOut`.
    pub async fn reset_credentials(&self) -> Result<(), SessionError> {
        self.inner.credentials.lock().await.take();
        self.inner.store.reset().await?;
        info!("credentials cleared, next start pairs fresh");
        Ok(())
    }

    /// True while a reconnect timer is pending.
    pub fn has_pending_reconnect(&self) -> bool {
        lock(&self.inner.reconnect)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Phase and handle read atomically; `None` unless connected.
    pub(crate) async fn connected_handle(&self) -> Option<Arc<dyn TransportHandle>> {
        let state = self.inner.state.read().await;
        if state.phase != SessionPhase::Connected {
            return None;
        }
        state.handle.clone()
    }

    // ── Connection establishment ─────────────────────────────────────────

    async fn connect(&self, epoch: u64) -> Result<(), SessionError> {
        let credentials = self.credentials_for_connect().await?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let handle = self.inner.transport.open(credentials, events_tx).await?;

        {
            let mut state = self.inner.state.write().await;
            if state.epoch != epoch {
                // A disconnect raced the open; the fresh handle is dropped
                // unused and its events never consumed.
                debug!("connection superseded during open, discarding handle");
                return Ok(());
            }
            state.handle = Some(handle);
        }

        let manager = self.clone();
        tokio::spawn(async move { manager.event_loop(events_rx, epoch).await });
        Ok(())
    }

    async fn credentials_for_connect(&self) -> Result<CredentialBlob, SessionError> {
        if let Some(blob) = self.inner.credentials.lock().await.clone() {
            return Ok(blob);
        }
        // First connect this run: load from the store. Absent is fine and
        // means fresh pairing.
        let loaded = self.inner.store.load().await?.unwrap_or_default();
        *self.inner.credentials.lock().await = Some(loaded.clone());
        Ok(loaded)
    }

    // ── Event handling ───────────────────────────────────────────────────

    /// One sequential loop per connection. Ends at the `Closed` event; any
    /// later traffic belongs to the successor connection.
    async fn event_loop(&self, mut events: mpsc::Receiver<TransportEvent>, epoch: u64) {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::CredentialUpdate { blob } => {
                    self.handle_credential_update(blob).await;
                },
                TransportEvent::Pairing { code } => self.handle_pairing(code, epoch).await,
                TransportEvent::Opened { account_id } => {
                    self.handle_opened(account_id, epoch).await;
                },
                TransportEvent::Closed { reason } => {
                    self.handle_closed(reason, epoch).await;
                    break;
                },
            }
        }
    }

    async fn handle_credential_update(&self, blob: CredentialBlob) {
        *self.inner.credentials.lock().await = Some(blob.clone());
        // Persisted before the next event is consumed; the loop is
        // sequential, so nothing credential-dependent runs until this
        // returns.
        match self.inner.store.save(&blob).await {
            Ok(()) => debug!(len = blob.as_bytes().len(), "persisted credential update"),
            Err(e) => {
                warn!(error = %e, "failed to persist credentials; keeping in-memory copy for this run");
            },
        }
    }

    async fn handle_pairing(&self, code: String, epoch: u64) {
        {
            let mut state = self.inner.state.write().await;
            if state.epoch != epoch {
                return;
            }
            state.phase = SessionPhase::AwaitingPairing;
            state.account_id = None;
            state.pairing_code = Some(code.clone());
        }
        info!("pairing code issued, scan to link this device");
        log_pairing_qr(&code);
    }

    async fn handle_opened(&self, account_id: String, epoch: u64) {
        {
            let mut state = self.inner.state.write().await;
            if state.epoch != epoch {
                return;
            }
            state.phase = SessionPhase::Connected;
            state.pairing_code = None;
            state.account_id = Some(account_id.clone());
        }
        self.cancel_reconnect();
        info!(account = %account_id, "session connected");
    }

    async fn handle_closed(&self, reason: CloseReason, epoch: u64) {
        let decision = policy::classify(reason);
        {
            let mut state = self.inner.state.write().await;
            if state.epoch != epoch {
                return;
            }
            state.clear_artifacts();
            state.handle = None;
            state.phase = match decision {
                ReconnectDecision::Retry => SessionPhase::Disconnected,
                ReconnectDecision::Terminal => SessionPhase::LoggedOut,
            };
        }

        match decision {
            ReconnectDecision::Retry => {
                info!(
                    ?reason,
                    delay_ms = self.inner.config.reconnect_delay.as_millis() as u64,
                    "connection closed, reconnecting"
                );
                self.schedule_reconnect();
            },
            ReconnectDecision::Terminal => {
                info!(?reason, "account logged out; staying down until restarted explicitly");
                self.cancel_reconnect();
            },
        }
    }

    // ── Reconnect timer ──────────────────────────────────────────────────

    /// Arm the single timer slot, replacing any pending timer. Retries
    /// never stack.
    fn schedule_reconnect(&self) {
        let manager = self.clone();
        let delay = self.inner.config.reconnect_delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Vacate the slot first so start()'s cancel pass cannot abort
            // the very task calling it.
            drop(lock(&manager.inner.reconnect).take());
            debug!("reconnect timer fired");
            manager.start().await;
        });
        if let Some(previous) = lock(&self.inner.reconnect).replace(task) {
            previous.abort();
        }
    }

    fn cancel_reconnect(&self) {
        if let Some(task) = lock(&self.inner.reconnect).take() {
            task.abort();
        }
    }
}

/// Render the pairing artifact as a unicode QR block into the logs, so a
/// terminal session can be linked without any other surface.
fn log_pairing_qr(code: &str) {
    match QrCode::new(code.as_bytes()) {
        Ok(qr) => {
            let rendered = qr.render::<unicode::Dense1x2>().build();
            info!("\n{rendered}");
        },
        Err(e) => warn!(error = %e, "could not render pairing code as QR"),
    }
}
