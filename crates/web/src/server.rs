use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Json, Router,
        extract::State,
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
        routing::{get, post},
    },
    chrono::Utc,
    serde::Deserialize,
    serde_json::json,
    tower_http::cors::{Any, CorsLayer},
    tracing::info,
    wagate_session::{DisconnectOutcome, DispatchError, SessionManager},
};

use crate::auth::require_bearer;

// ── State ────────────────────────────────────────────────────────────────────

/// Shared state behind every control-surface handler.
pub struct ControlState {
    pub manager: SessionManager,
    /// Bearer token expected on every route except `/`.
    pub auth_token: String,
}

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the control-surface router. Split from [`serve`] so tests can drive
/// it with `tower::ServiceExt::oneshot`.
pub fn build_control_app(state: Arc<ControlState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/status", get(status))
        .route("/send", post(send))
        .route("/disconnect", post(disconnect))
        .layer(cors)
        .with_state(state)
}

/// Bind and run the control surface until the process exits.
pub async fn serve(bind: &str, port: u16, state: Arc<ControlState>) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "control surface listening");
    axum::serve(listener, build_control_app(state)).await?;
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// Unauthenticated liveness banner.
async fn root() -> Response {
    Json(json!({
        "status": "online",
        "service": "wagate",
        "version": env!("CARGO_PKG_VERSION"),
    }))
    .into_response()
}

async fn status(State(state): State<Arc<ControlState>>, headers: HeaderMap) -> Response {
    if let Err(denied) = require_bearer(&headers, &state.auth_token) {
        return denied;
    }

    let snapshot = state.manager.snapshot().await;
    Json(json!({
        "status": snapshot.phase,
        "account": snapshot.account_id,
        "pairing_code": snapshot.pairing_code,
        "timestamp": Utc::now(),
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    to: String,
    message: String,
}

async fn send(
    State(state): State<Arc<ControlState>>,
    headers: HeaderMap,
    Json(request): Json<SendRequest>,
) -> Response {
    if let Err(denied) = require_bearer(&headers, &state.auth_token) {
        return denied;
    }

    match state.manager.send_text(&request.to, &request.message).await {
        Ok(receipt) => Json(json!({
            "success": true,
            "message_id": receipt.message_id,
            "to": receipt.to,
            "timestamp": receipt.timestamp,
        }))
        .into_response(),
        Err(e) => dispatch_error_response(e),
    }
}

async fn disconnect(State(state): State<Arc<ControlState>>, headers: HeaderMap) -> Response {
    if let Err(denied) = require_bearer(&headers, &state.auth_token) {
        return denied;
    }

    let body = match state.manager.request_disconnect().await {
        DisconnectOutcome::LoggedOut => json!({
            "success": true,
            "message": "session logged out",
        }),
        DisconnectOutcome::NoActiveSession => json!({
            "success": false,
            "message": "no active session",
        }),
    };
    Json(body).into_response()
}

/// Map dispatch failures onto HTTP statuses: no session is 503, bad input
/// is 400, a transport refusal is 500.
fn dispatch_error_response(error: DispatchError) -> Response {
    let status = match &error {
        DispatchError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
        DispatchError::InvalidRecipient | DispatchError::InvalidPayload => StatusCode::BAD_REQUEST,
        DispatchError::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use {
        axum::{
            body::Body,
            http::{Request, header},
        },
        serde_json::Value,
        tower::ServiceExt,
        wagate_session::{SessionConfig, SessionPhase},
        wagate_store::MemoryCredentialStore,
        wagate_transport::{TransportEvent, mock::MockTransport},
    };

    use super::*;

    const TOKEN: &str = "test-token";

    fn test_state() -> (Arc<ControlState>, MockTransport) {
        let transport = MockTransport::new();
        let manager = SessionManager::new(
            Arc::new(transport.clone()),
            Arc::new(MemoryCredentialStore::new()),
            SessionConfig::default(),
        );
        let state = Arc::new(ControlState {
            manager,
            auth_token: TOKEN.into(),
        });
        (state, transport)
    }

    /// Drive the manager through open + `Opened` so sends can flow.
    async fn connect(state: &Arc<ControlState>, transport: &MockTransport) {
        state.manager.start().await;
        wait_until(|| transport.open_count() == 1).await;
        assert!(
            transport
                .emit(TransportEvent::Opened {
                    account_id: "15550001111".into(),
                })
                .await
        );
        loop {
            if state.manager.snapshot().await.phase == SessionPhase::Connected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn root_is_public() {
        let (state, _transport) = test_state();
        let app = build_control_app(state);

        let (status, body) = call(&app, "GET", "/", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "online");
        assert_eq!(body["service"], "wagate");
    }

    #[tokio::test]
    async fn protected_routes_reject_missing_or_wrong_token() {
        let (state, _transport) = test_state();
        let app = build_control_app(state);

        let (status, body) = call(&app, "GET", "/status", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");

        let (status, _) = call(&app, "GET", "/status", Some("wrong"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            &app,
            "POST",
            "/send",
            None,
            Some(json!({ "to": "15551234567", "message": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, "POST", "/disconnect", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn status_reflects_session_phase() {
        let (state, transport) = test_state();
        let app = build_control_app(Arc::clone(&state));

        let (status, body) = call(&app, "GET", "/status", Some(TOKEN), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "disconnected");
        assert_eq!(body["account"], Value::Null);

        connect(&state, &transport).await;

        let (status, body) = call(&app, "GET", "/status", Some(TOKEN), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "connected");
        assert_eq!(body["account"], "15550001111");
        assert_eq!(body["pairing_code"], Value::Null);
    }

    #[tokio::test]
    async fn status_surfaces_pairing_code() {
        let (state, transport) = test_state();
        let app = build_control_app(Arc::clone(&state));

        state.manager.start().await;
        wait_until(|| transport.open_count() == 1).await;
        assert!(
            transport
                .emit(TransportEvent::Pairing {
                    code: "ABC123".into(),
                })
                .await
        );
        loop {
            if state.manager.snapshot().await.phase == SessionPhase::AwaitingPairing {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let (status, body) = call(&app, "GET", "/status", Some(TOKEN), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "awaiting_pairing");
        assert_eq!(body["pairing_code"], "ABC123");
    }

    #[tokio::test]
    async fn send_without_session_is_service_unavailable() {
        let (state, transport) = test_state();
        let app = build_control_app(state);

        let (status, body) = call(
            &app,
            "POST",
            "/send",
            Some(TOKEN),
            Some(json!({ "to": "15551234567", "message": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("not connected"));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn send_forwards_normalized_recipient() {
        let (state, transport) = test_state();
        let app = build_control_app(Arc::clone(&state));
        connect(&state, &transport).await;

        let (status, body) = call(
            &app,
            "POST",
            "/send",
            Some(TOKEN),
            Some(json!({ "to": "+1 (555) 123-4567", "message": "hello there" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["to"], "15551234567");
        assert!(body["message_id"].as_str().unwrap().starts_with("snd-"));

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "15551234567");
        assert_eq!(sent[0].1, "hello there");
    }

    #[tokio::test]
    async fn send_rejects_bad_input() {
        let (state, transport) = test_state();
        let app = build_control_app(Arc::clone(&state));
        connect(&state, &transport).await;

        let (status, _) = call(
            &app,
            "POST",
            "/send",
            Some(TOKEN),
            Some(json!({ "to": "no-digits-here", "message": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            "POST",
            "/send",
            Some(TOKEN),
            Some(json!({ "to": "15551234567", "message": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn send_failure_maps_to_internal_error() {
        let (state, transport) = test_state();
        let app = build_control_app(Arc::clone(&state));
        connect(&state, &transport).await;
        transport.fail_sends(true);

        let (status, body) = call(
            &app,
            "POST",
            "/send",
            Some(TOKEN),
            Some(json!({ "to": "15551234567", "message": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("send"));
    }

    #[tokio::test]
    async fn disconnect_tears_down_and_reports_idempotently() {
        let (state, transport) = test_state();
        let app = build_control_app(Arc::clone(&state));
        connect(&state, &transport).await;

        let (status, body) = call(&app, "POST", "/disconnect", Some(TOKEN), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(state.manager.snapshot().await.phase, SessionPhase::LoggedOut);

        let (status, body) = call(&app, "POST", "/disconnect", Some(TOKEN), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "no active session");
    }
}
