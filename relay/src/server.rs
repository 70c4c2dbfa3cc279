//! HTTP and WebSocket surface
//!
//! Endpoints:
//! - `POST /api/session` - create a room, returns pairing URLs
//! - `GET  /api/profiles` - the static profile catalog
//! - `GET  /health`       - liveness plus live session count
//! - `GET  /stats`        - counters and the recent event log
//! - `GET  /ws/{code}`    - room socket; first frame must be `join`

use crate::config::RelayConfig;
use crate::hub::RelayHub;
use crate::rate_limit::{RateLimiter, RATE_LIMIT_WINDOW};
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        ConnectInfo, Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use couchpad_protocol::{normalize_code, Catalog, Message};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A socket that has not sent `join` by then is closed
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub hub: RelayHub,
    pub config: Arc<RelayConfig>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(hub: RelayHub, config: RelayConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit, RATE_LIMIT_WINDOW));
        Self {
            hub,
            config: Arc::new(config),
            limiter,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .route("/api/session", post(create_session))
        .route("/api/profiles", get(profiles))
        .route("/ws/:code", get(websocket_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    pub profile: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub room_id: String,
    pub controller_url: String,
    pub websocket_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sessions = state.hub.session_count().await;
    Json(json!({ "status": "ok", "sessions": sessions }))
}

async fn stats(State(state): State<AppState>) -> Response {
    match state.hub.stats().await {
        Some(snapshot) => Json(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "rate_limited_ips": state.limiter.tracked(),
            "relay": snapshot,
        }))
        .into_response(),
        None => error_response(StatusCode::SERVICE_UNAVAILABLE, "relay hub stopped"),
    }
}

async fn profiles() -> Json<&'static Catalog> {
    Json(Catalog::builtin())
}

async fn create_session(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Option<Json<CreateSessionRequest>>,
) -> Response {
    if !state.limiter.check(addr.ip()) {
        warn!("Session creation rate limited for {}", addr.ip());
        return error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded. Try again later.",
        );
    }

    let request = body.map(|Json(req)| req).unwrap_or_default();
    if let Some(profile) = &request.profile {
        if !Catalog::builtin().contains(profile) {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Unknown profile: {}", profile),
            );
        }
    }

    let Some(code) = state.hub.create(request.profile.clone()).await else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "relay hub stopped");
    };
    info!("Session {} created for {}", code, addr.ip());

    Json(CreateSessionResponse {
        controller_url: state.config.controller_url(&code),
        websocket_url: state.config.websocket_url(&code),
        room_id: code,
        profile: request.profile,
    })
    .into_response()
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(code): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let Some(code) = normalize_code(&code) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid room code");
    };
    ws.on_upgrade(move |socket| handle_socket(socket, code, state))
}

async fn handle_socket(socket: WebSocket, code: String, state: AppState) {
    let conn = Uuid::new_v4();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Frames from the hub to this socket
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(WsMessage::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let mut joined = false;
    let join_deadline = tokio::time::sleep(JOIN_TIMEOUT);
    tokio::pin!(join_deadline);

    loop {
        tokio::select! {
            _ = &mut join_deadline, if !joined => {
                debug!("Connection {} to {} never joined, closing", conn, code);
                break;
            }
            frame = ws_receiver.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => match Message::decode(&text) {
                        Ok(Message::Join { role, subtype }) => {
                            state.hub.join(&code, conn, role, subtype, tx.clone());
                            joined = true;
                        }
                        Ok(msg) if joined => state.hub.inbound(conn, text, msg),
                        Ok(msg) => debug!("Dropping {} before join on {}", msg.kind(), code),
                        Err(e) => debug!("Dropping frame on {}: {}", code, e),
                    },
                    Some(Ok(WsMessage::Binary(_))) => {
                        debug!("Dropping binary frame on {}", code);
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Socket error on {}: {}", code, e);
                        break;
                    }
                }
            }
            _ = &mut writer => break,
        }
    }

    if joined {
        state.hub.leave(conn);
    }
    drop(tx);
    writer.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::hub::HubSettings;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::Request;
    use couchpad_protocol::Role;
    use tokio::net::TcpListener;
    use tokio_tungstenite::{connect_async, tungstenite::Message as TMessage};
    use tower::ServiceExt;

    type Client = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    fn test_state(grace: Duration) -> AppState {
        let hub = RelayHub::spawn(HubSettings {
            reap_grace: grace,
            unjoined_ttl: Duration::from_secs(600),
        });
        AppState::new(hub, RelayConfig::default())
    }

    fn test_app(state: AppState) -> Router {
        router(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn spawn_relay(state: AppState) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state);
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });
        addr
    }

    async fn connect(addr: SocketAddr, code: &str, role: Role, subtype: Option<&str>) -> Client {
        let (mut ws, _) = connect_async(format!("ws://{}/ws/{}", addr, code))
            .await
            .unwrap();
        let join = Message::Join {
            role,
            subtype: subtype.map(|s| s.to_string()),
        };
        ws.send(TMessage::Text(join.encode().into())).await.unwrap();
        ws
    }

    async fn next_message(ws: &mut Client) -> Message {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .expect("timed out waiting for frame")
                .expect("socket closed")
                .unwrap();
            if let TMessage::Text(text) = frame {
                return Message::decode(&text).unwrap();
            }
        }
    }

    /// Read frames until one that is not status/joined bookkeeping
    async fn next_relayed(ws: &mut Client) -> Message {
        loop {
            match next_message(ws).await {
                Message::Status { .. } | Message::Joined { .. } => continue,
                other => return other,
            }
        }
    }

    async fn expect_silence(ws: &mut Client) {
        let got = tokio::time::timeout(Duration::from_millis(200), async {
            loop {
                match next_message(ws).await {
                    Message::Status { .. } | Message::Joined { .. } => continue,
                    other => return other,
                }
            }
        })
        .await;
        assert!(got.is_err(), "unexpected frame {:?}", got);
    }

    async fn wait_for_joined(ws: &mut Client) -> Message {
        loop {
            let msg = next_message(ws).await;
            if matches!(msg, Message::Joined { .. }) {
                return msg;
            }
        }
    }

    #[tokio::test]
    async fn test_health_reports_sessions() {
        let state = test_state(Duration::from_secs(60));
        state.hub.create(None).await.unwrap();
        let response = test_app(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sessions"], 1);
    }

    #[tokio::test]
    async fn test_create_session_response() {
        let state = test_state(Duration::from_secs(60));
        let response = test_app(state)
            .oneshot(
                Request::post("/api/session")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"profile":"video"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let room = body["roomId"].as_str().unwrap().to_string();
        assert_eq!(room.len(), 6);
        assert_eq!(body["profile"], "video");
        assert_eq!(
            body["websocketUrl"],
            format!("ws://localhost:8080/ws/{}", room)
        );
        assert_eq!(
            body["controllerUrl"],
            format!("http://localhost:8080/?room={}", room)
        );
    }

    #[tokio::test]
    async fn test_create_session_without_body() {
        let state = test_state(Duration::from_secs(60));
        let response = test_app(state)
            .oneshot(Request::post("/api/session").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body.get("profile").is_none());
    }

    #[tokio::test]
    async fn test_create_session_unknown_profile() {
        let state = test_state(Duration::from_secs(60));
        let response = test_app(state)
            .oneshot(
                Request::post("/api/session")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"profile":"karaoke"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_session_rate_limited() {
        let mut config = RelayConfig::default();
        config.rate_limit = 2;
        let hub = RelayHub::spawn(HubSettings::default());
        let app = test_app(AppState::new(hub, config));

        for expected in [StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS] {
            let response = app
                .clone()
                .oneshot(Request::post("/api/session").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), expected);
        }
    }

    #[tokio::test]
    async fn test_session_creation_leaves_catalog_untouched() {
        let before = serde_json::to_value(Catalog::builtin().get("scroll").unwrap()).unwrap();
        let app = test_app(test_state(Duration::from_secs(60)));

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/session")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"profile":"scroll"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/api/profiles").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let catalog = body_json(response).await;
        assert_eq!(catalog["scroll"], before);
        assert_eq!(
            serde_json::to_string(&catalog["scroll"]).unwrap(),
            serde_json::to_string(&before).unwrap()
        );
    }

    #[tokio::test]
    async fn test_action_delivered_to_displays_only() {
        let addr = spawn_relay(test_state(Duration::from_secs(60))).await;

        let mut display = connect(addr, "pair42", Role::Display, None).await;
        wait_for_joined(&mut display).await;
        let mut controller = connect(addr, "PAIR42", Role::Controller, None).await;
        wait_for_joined(&mut controller).await;

        controller
            .send(TMessage::Text(Message::action("up").encode().into()))
            .await
            .unwrap();

        assert_eq!(next_relayed(&mut display).await, Message::action("up"));
        expect_silence(&mut display).await;
        expect_silence(&mut controller).await;
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_connection() {
        let addr = spawn_relay(test_state(Duration::from_secs(60))).await;

        let mut display = connect(addr, "BADMSG", Role::Display, None).await;
        wait_for_joined(&mut display).await;
        let mut controller = connect(addr, "BADMSG", Role::Controller, None).await;
        wait_for_joined(&mut controller).await;

        controller
            .send(TMessage::Text("{not json".to_string().into()))
            .await
            .unwrap();
        controller
            .send(TMessage::Text(r#"{"type":"ping"}"#.to_string().into()))
            .await
            .unwrap();
        assert_eq!(next_relayed(&mut controller).await, Message::Pong);
    }

    #[tokio::test]
    async fn test_frames_before_join_are_dropped() {
        let addr = spawn_relay(test_state(Duration::from_secs(60))).await;
        let mut display = connect(addr, "EARLY1", Role::Display, None).await;
        wait_for_joined(&mut display).await;

        let (mut early, _) = connect_async(format!("ws://{}/ws/EARLY1", addr))
            .await
            .unwrap();
        early
            .send(TMessage::Text(Message::action("left").encode().into()))
            .await
            .unwrap();
        expect_silence(&mut display).await;
    }

    #[tokio::test]
    async fn test_controller_reconnect_rejoins_same_room() {
        let state = test_state(Duration::from_secs(60));
        let hub = state.hub.clone();
        let addr = spawn_relay(state).await;

        let mut display = connect(addr, "HOMETV", Role::Display, None).await;
        wait_for_joined(&mut display).await;

        let mut controller = connect(addr, "HOMETV", Role::Controller, None).await;
        wait_for_joined(&mut controller).await;
        controller.close(None).await.unwrap();
        drop(controller);

        let mut controller = connect(addr, "HOMETV", Role::Controller, None).await;
        match wait_for_joined(&mut controller).await {
            Message::Joined {
                room_id, displays, ..
            } => {
                assert_eq!(room_id, "HOMETV");
                assert_eq!(displays, 1);
            }
            other => panic!("unexpected {:?}", other),
        }

        controller
            .send(TMessage::Text(Message::action("select").encode().into()))
            .await
            .unwrap();
        assert_eq!(next_relayed(&mut display).await, Message::action("select"));

        let stats = hub.stats().await.unwrap();
        let created = stats
            .recent_events
            .iter()
            .filter(|e| e.room == "HOMETV" && e.kind == EventKind::Created)
            .count();
        assert_eq!(created, 1);
        assert_eq!(hub.session_count().await, 1);
    }

    async fn wait_for_left(hub: &RelayHub, room: &str, total: usize) {
        for _ in 0..200 {
            let stats = hub.stats().await.unwrap();
            let left = stats
                .recent_events
                .iter()
                .filter(|e| e.room == room && matches!(e.kind, EventKind::Left { .. }))
                .count();
            if left >= total {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("peers never left {}", room);
    }

    fn joined_profile(msg: Message) -> Option<String> {
        match msg {
            Message::Joined { active_profile, .. } => active_profile,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_emptied_room_survives_grace_then_reaped() {
        let state = test_state(Duration::from_millis(400));
        let hub = state.hub.clone();
        let addr = spawn_relay(state).await;

        let mut display = connect(addr, "COUCH7", Role::Display, None).await;
        wait_for_joined(&mut display).await;
        let mut controller = connect(addr, "COUCH7", Role::Controller, None).await;
        wait_for_joined(&mut controller).await;

        let profile = Message::SetProfile {
            profile: "video".to_string(),
        };
        controller
            .send(TMessage::Text(profile.encode().into()))
            .await
            .unwrap();
        assert_eq!(next_relayed(&mut display).await, profile);

        controller.close(None).await.unwrap();
        display.close(None).await.unwrap();
        wait_for_left(&hub, "COUCH7", 2).await;
        assert_eq!(hub.session_count().await, 1);

        // back inside the grace window: same room, same state
        let mut display = connect(addr, "COUCH7", Role::Display, None).await;
        let joined = wait_for_joined(&mut display).await;
        assert_eq!(joined_profile(joined).as_deref(), Some("video"));

        display.close(None).await.unwrap();
        wait_for_left(&hub, "COUCH7", 3).await;
        for _ in 0..200 {
            if hub.session_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(hub.session_count().await, 0);

        // after the grace window the code starts a fresh room
        let mut display = connect(addr, "COUCH7", Role::Display, None).await;
        let joined = wait_for_joined(&mut display).await;
        assert_eq!(joined_profile(joined), None);
        let stats = hub.stats().await.unwrap();
        assert!(stats
            .recent_events
            .iter()
            .any(|e| e.room == "COUCH7" && e.kind == EventKind::Reaped));
    }
}
