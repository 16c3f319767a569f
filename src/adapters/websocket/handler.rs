//! WebSocket upgrade handler for the chat namespace.
//!
//! Connection lifecycle:
//! 1. Authenticate the `token` query parameter (rejected with 401, no state created)
//! 2. Upgrade to WebSocket
//! 3. Pump the connection's outbound queue to the socket, and inbound frames
//!    to the gateway, until either side stops
//! 4. Disconnect exactly once

use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::application::{ChatGateway, ConnectionHandle};
use crate::domain::foundation::{AuthError, DomainError};
use crate::domain::protocol::ServerEvent;

use super::messages::{decode_frame, encode_event};

/// State required for WebSocket handling.
#[derive(Clone)]
pub struct WebSocketState {
    pub gateway: Arc<ChatGateway>,
}

impl WebSocketState {
    pub fn new(gateway: Arc<ChatGateway>) -> Self {
        Self { gateway }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    #[serde(default)]
    pub token: Option<String>,
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /ws/chat?token=<jwt>`
///
/// Authentication runs before the upgrade so a rejected client never gets a
/// socket or any registry state.
pub async fn ws_handler(
    State(state): State<WebSocketState>,
    Query(params): Query<ConnectParams>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let token = params.token.unwrap_or_default();
    let handle = match state.gateway.connect(&token).await {
        Ok(handle) => handle,
        Err(err) => {
            tracing::warn!(error = %err, "websocket authentication failed");
            return auth_rejection(&err);
        }
    };

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => {
            state.gateway.disconnect(handle.id).await;
            return rejection.into_response();
        }
    };

    let connection_id = handle.id;
    let gateway = state.gateway.clone();
    ws.on_failed_upgrade(move |err| {
        tracing::warn!(connection_id = %connection_id, error = %err, "websocket upgrade failed");
        tokio::spawn(async move { gateway.disconnect(connection_id).await });
    })
    .on_upgrade(move |socket| handle_socket(socket, handle, state))
}

fn auth_rejection(err: &AuthError) -> Response {
    let status = match err {
        AuthError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::UNAUTHORIZED,
    };
    let body = json!({ "code": "UNAUTHORIZED", "message": err.to_string() });
    (status, Json(body)).into_response()
}

/// Runs for the lifetime of an upgraded connection.
async fn handle_socket(socket: WebSocket, handle: ConnectionHandle, state: WebSocketState) {
    let ConnectionHandle {
        id: connection_id,
        mut outbound,
        ..
    } = handle;
    let (mut sender, mut receiver) = socket.split();

    // The queue closes when the connection is evicted or disconnected.
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            if let Err(e) = send_event(&mut sender, &event).await {
                tracing::debug!(connection_id = %connection_id, error = %e, "send failed, closing connection");
                return;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let gateway = state.gateway.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => match decode_frame(&text) {
                    Ok(event) => gateway.handle(connection_id, event).await,
                    Err(err) => gateway.reject_frame(connection_id, err).await,
                },
                Ok(Message::Binary(_)) => {
                    tracing::warn!(connection_id = %connection_id, "unsupported binary frame");
                    gateway
                        .reject_frame(
                            connection_id,
                            DomainError::validation("frame", "Binary frames are not supported"),
                        )
                        .await;
                }
                // Protocol pings are answered by axum.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Close(_)) => {
                    tracing::debug!(connection_id = %connection_id, "client sent close frame");
                    break;
                }
                Err(e) => {
                    tracing::debug!(connection_id = %connection_id, error = %e, "receive failed");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.gateway.disconnect(connection_id).await;
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    match encode_event(event) {
        Ok(json) => sender.send(Message::Text(json)).await,
        Err(e) => {
            tracing::error!(event = ?event, error = %e, "failed to encode server event");
            Ok(())
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    pub status: String,
    pub connections: usize,
    pub rooms: usize,
}

/// Route: `GET /health`
pub async fn health(State(state): State<WebSocketState>) -> Json<HealthStatus> {
    let registry = state.gateway.registry();
    Json(HealthStatus {
        status: "ok".to_string(),
        connections: registry.connection_count().await,
        rooms: registry.room_count().await,
    })
}

/// Chat endpoints.
///
/// # Example
///
/// ```ignore
/// let app = websocket_router().with_state(WebSocketState::new(gateway));
/// ```
pub fn websocket_router() -> Router<WebSocketState> {
    Router::new()
        .route("/ws/chat", get(ws_handler))
        .route("/health", get(health))
}
