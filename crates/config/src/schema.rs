//! Config schema types (server, session, transport).

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WagateConfig {
    pub server: ServerConfig,
    pub session: SessionSection,
    pub transport: TransportSection,
}

/// Control-surface HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Bearer token for the control API. The `WAGATE_TOKEN` environment
    /// variable takes precedence when set.
    pub auth_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 3000,
            auth_token: None,
        }
    }
}

impl ServerConfig {
    /// Resolve the control token: environment first, then config. Empty
    /// values count as absent.
    pub fn resolve_auth_token(&self) -> Option<String> {
        std::env::var("WAGATE_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.auth_token.clone().filter(|t| !t.is_empty()))
    }
}

/// Session lifecycle tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Fixed reconnect delay in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Credential store location; defaults to `<data_dir>/credentials`.
    pub credential_path: Option<std::path::PathBuf>,
    /// Keep credentials in memory only; every start pairs fresh.
    pub ephemeral: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 3_000,
            credential_path: None,
            ephemeral: false,
        }
    }
}

/// Messaging-network broker endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    pub url: String,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8799/session".into(),
        }
    }
}
