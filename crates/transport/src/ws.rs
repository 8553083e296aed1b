//! WebSocket reference transport.
//!
//! Speaks a small serde-tagged JSON frame protocol with a broker endpoint
//! that fronts the actual messaging network: a hello frame carrying the
//! credential blob outbound, then pairing / opened / closed / credentials
//! frames inbound and send / logout frames outbound.

use std::sync::Arc;

use {
    async_trait::async_trait,
    base64::{Engine as _, engine::general_purpose::STANDARD as BASE64},
    futures::{
        SinkExt, StreamExt,
        stream::{SplitSink, SplitStream},
    },
    serde::{Deserialize, Serialize},
    tokio::{net::TcpStream, sync::mpsc},
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message},
    tracing::{debug, warn},
};

use crate::{
    CloseReason, CredentialBlob, Transport, TransportError, TransportEvent, TransportHandle,
};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Buffered outbound frames between handle callers and the write loop.
const OUTBOUND_BUFFER: usize = 16;

// ── Wire frames ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame<'a> {
    /// First frame on every connection; credentials are base64-encoded.
    Hello { credentials: String },
    Send { to: &'a str, body: &'a str },
    Logout,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    Pairing {
        code: String,
    },
    Opened {
        account: String,
    },
    Closed {
        #[serde(default)]
        reason: Option<CloseReason>,
    },
    Credentials {
        blob: String,
    },
}

// ── Transport ────────────────────────────────────────────────────────────────

/// Transport backed by a WebSocket broker endpoint.
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(
        &self,
        credentials: CredentialBlob,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Arc<dyn TransportHandle>, TransportError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Open(e.to_string()))?;
        let (mut sink, source) = stream.split();

        let hello = encode_frame(&ClientFrame::Hello {
            credentials: BASE64.encode(credentials.as_bytes()),
        })
        .map_err(|e| TransportError::Open(e.to_string()))?;
        sink.send(Message::Text(hello.into()))
            .await
            .map_err(|e| TransportError::Open(e.to_string()))?;

        let (out_tx, out_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
        tokio::spawn(write_loop(sink, out_rx));
        tokio::spawn(read_loop(source, events));

        Ok(Arc::new(WsHandle { out: out_tx }))
    }
}

fn encode_frame(frame: &ClientFrame<'_>) -> Result<String, serde_json::Error> {
    serde_json::to_string(frame)
}

async fn write_loop(mut sink: WsSink, mut out_rx: mpsc::Receiver<String>) {
    while let Some(frame) = out_rx.recv().await {
        if let Err(e) = sink.send(Message::Text(frame.into())).await {
            debug!(error = %e, "websocket write failed, stopping write loop");
            break;
        }
    }
}

/// Translate inbound frames into transport events. Always finishes with a
/// single `Closed` event so the session manager sees every disconnect.
async fn read_loop(mut source: WsSource, events: mpsc::Sender<TransportEvent>) {
    let mut close_reason = CloseReason::ConnectionLost;

    while let Some(item) = source.next().await {
        let event = match item {
            Ok(Message::Text(txt)) => match serde_json::from_str::<ServerFrame>(txt.as_str()) {
                Ok(ServerFrame::Pairing { code }) => TransportEvent::Pairing { code },
                Ok(ServerFrame::Opened { account }) => TransportEvent::Opened {
                    account_id: account,
                },
                Ok(ServerFrame::Closed { reason }) => {
                    close_reason = reason.unwrap_or(CloseReason::ConnectionLost);
                    break;
                },
                Ok(ServerFrame::Credentials { blob }) => match BASE64.decode(blob.as_bytes()) {
                    Ok(bytes) => TransportEvent::CredentialUpdate {
                        blob: CredentialBlob::new(bytes),
                    },
                    Err(e) => {
                        warn!(error = %e, "dropping credential frame with invalid base64");
                        continue;
                    },
                },
                Err(e) => {
                    warn!(error = %e, "dropping unrecognized frame");
                    continue;
                },
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(error = %e, "websocket read failed");
                break;
            },
        };

        if events.send(event).await.is_err() {
            // Manager is gone; nothing left to report to.
            return;
        }
    }

    let _ = events
        .send(TransportEvent::Closed {
            reason: close_reason,
        })
        .await;
}

// ── Handle ───────────────────────────────────────────────────────────────────

struct WsHandle {
    out: mpsc::Sender<String>,
}

#[async_trait]
impl TransportHandle for WsHandle {
    async fn send_text(&self, address: &str, body: &str) -> Result<(), TransportError> {
        let frame = encode_frame(&ClientFrame::Send { to: address, body })
            .map_err(|e| TransportError::Send(e.to_string()))?;
        self.out
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn logout(&self) -> Result<(), TransportError> {
        let frame =
            encode_frame(&ClientFrame::Logout).map_err(|e| TransportError::Logout(e.to_string()))?;
        self.out
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed)
    }
}
