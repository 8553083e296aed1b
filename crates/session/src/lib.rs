//! Session lifecycle core.
//!
//! Owns the single process-wide messaging session: connection
//! establishment, credential persistence, pairing-artifact issuance,
//! disconnect classification, reconnection policy, and the outbound
//! dispatch gateway. Everything network-shaped happens behind the
//! `wagate-transport` capability traits; everything storage-shaped behind
//! [`CredentialStore`].

pub mod dispatch;
pub mod manager;
pub mod policy;
pub mod state;
pub mod store;

pub use dispatch::{DispatchError, SendReceipt, normalize_recipient};
pub use manager::{DisconnectOutcome, SessionConfig, SessionError, SessionManager};
pub use policy::{DEFAULT_RECONNECT_DELAY, ReconnectDecision, classify};
pub use state::{SessionPhase, SessionSnapshot};
pub use store::{CredentialStore, StoreError};
