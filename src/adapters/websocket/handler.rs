//! WebSocket upgrade handler and socket loop.
//!
//! Connection lifecycle:
//! 1. Client connects with its token as a query parameter
//! 2. The lifecycle manager validates the token and registers the
//!    connection; failures close the socket with a policy code before any
//!    business logic runs
//! 3. Outbound frames flow through a per-connection queue so the fanout
//!    bridge never blocks on a slow socket
//! 4. Inbound frames (ping, read acks, sends) invoke the core services
//! 5. On any close path the connection is unregistered

use std::borrow::Cow;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    routing::get,
    Router,
};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::application::notifications::{NotificationEngine, MESSAGES_COLLECTION};
use crate::domain::foundation::Timestamp;
use crate::domain::messaging::Message as ChatMessage;
use crate::ports::{close_codes, AuthError, ClientTransport, DocumentStore, TransportError};

use super::lifecycle::ConnectionLifecycle;
use super::messages::{ClientFrame, ServerFrame};
use super::registry::Connection;

/// Close code for tokens rejected at handshake.
const AUTH_FAILED: u16 = 4400;

/// Commands queued for the socket's writer task.
enum SocketCommand {
    Send(String),
    Close(u16, String),
}

/// `ClientTransport` over the connection's outbound queue.
struct SocketTransport {
    tx: mpsc::Sender<SocketCommand>,
}

#[async_trait]
impl ClientTransport for SocketTransport {
    async fn send(&self, frame: &str) -> Result<(), TransportError> {
        self.tx
            .send(SocketCommand::Send(frame.to_string()))
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&self, code: u16, reason: &str) -> Result<(), TransportError> {
        self.tx
            .send(SocketCommand::Close(code, reason.to_string()))
            .await
            .map_err(|_| TransportError::Closed)
    }
}

/// State required for WebSocket handling.
#[derive(Clone)]
pub struct WebSocketState {
    pub lifecycle: Arc<ConnectionLifecycle>,
    pub engine: Arc<NotificationEngine>,
    pub store: Arc<dyn DocumentStore>,
    pub send_buffer: usize,
}

/// Handshake query parameters.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    token: String,
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /ws?token=...`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<WebSocketState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, params.token, state))
}

async fn handle_socket(socket: WebSocket, token: String, state: WebSocketState) {
    let (mut sender, receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<SocketCommand>(state.send_buffer);
    let transport: Arc<dyn ClientTransport> = Arc::new(SocketTransport { tx });

    // Authenticate before anything else; failures surface as a close
    // frame with a policy code, never as business-logic errors.
    let connection = match state.lifecycle.authenticate(&token, transport.clone()).await {
        Ok(connection) => connection,
        Err(e) => {
            let code = match e {
                AuthError::TokenExpired => close_codes::TOKEN_EXPIRED,
                AuthError::TokenRevoked => close_codes::TOKEN_REVOKED,
                _ => AUTH_FAILED,
            };
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code,
                    reason: Cow::from(e.to_string()),
                })))
                .await;
            return;
        }
    };

    let connected = ServerFrame::Connected {
        connection_id: connection.id().to_string(),
        user_id: connection.user_id().to_string(),
        timestamp: Timestamp::now().to_rfc3339(),
    };
    if let Ok(frame) = serde_json::to_string(&connected) {
        if transport.send(&frame).await.is_err() {
            // Client disconnected immediately
            state.lifecycle.handle_disconnect(&connection).await;
            return;
        }
    }

    // Writer task: drains the outbound queue onto the socket.
    let mut send_task = tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            match command {
                SocketCommand::Send(frame) => {
                    if sender.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                SocketCommand::Close(code, reason) => {
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: Cow::from(reason),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    // Reader task: feeds inbound frames to the core services.
    let mut recv_task = {
        let connection = connection.clone();
        let state = state.clone();
        let transport = transport.clone();
        tokio::spawn(async move {
            read_client_frames(receiver, connection, state, transport).await;
        })
    };

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.lifecycle.handle_disconnect(&connection).await;
}

async fn read_client_frames(
    mut receiver: futures::stream::SplitStream<WebSocket>,
    connection: Arc<Connection>,
    state: WebSocketState,
    transport: Arc<dyn ClientTransport>,
) {
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let frame = match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::debug!(
                            connection_id = %connection.id(),
                            error = %e,
                            "Ignoring malformed client frame"
                        );
                        continue;
                    }
                };
                handle_client_frame(frame, &connection, &state, &transport).await;
            }
            Ok(Message::Binary(_)) => {
                tracing::warn!(
                    connection_id = %connection.id(),
                    "Received unsupported binary frame"
                );
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Protocol-level frames handled by axum
            }
            Ok(Message::Close(_)) => {
                tracing::debug!(connection_id = %connection.id(), "Client sent close frame");
                break;
            }
            Err(e) => {
                tracing::debug!(connection_id = %connection.id(), error = %e, "Receive error");
                break;
            }
        }
    }
}

async fn handle_client_frame(
    frame: ClientFrame,
    connection: &Arc<Connection>,
    state: &WebSocketState,
    transport: &Arc<dyn ClientTransport>,
) {
    match frame {
        ClientFrame::Ping => {
            let pong = ServerFrame::Pong {
                timestamp: Timestamp::now().to_rfc3339(),
            };
            if let Ok(frame) = serde_json::to_string(&pong) {
                let _ = transport.send(&frame).await;
            }
        }
        ClientFrame::MarkRead {
            message_id,
            conversation_id,
        } => {
            if let Err(e) = state
                .engine
                .mark_as_read(message_id, conversation_id, connection.user_id())
                .await
            {
                tracing::warn!(
                    connection_id = %connection.id(),
                    message_id = %message_id,
                    error = %e,
                    "mark_as_read failed"
                );
                send_error(transport, &e.code.to_string(), &e.message).await;
            }
        }
        ClientFrame::SendMessage {
            conversation_id,
            message_type,
            content,
        } => {
            if content.trim().is_empty() {
                send_error(transport, "VALIDATION_FAILED", "content cannot be empty").await;
                return;
            }
            let message = ChatMessage::new(
                conversation_id,
                connection.user_id().clone(),
                connection.display_name().to_string(),
                message_type,
                content,
            );
            let result = persist_and_notify(state, &message).await;
            if let Err(e) = result {
                tracing::warn!(
                    connection_id = %connection.id(),
                    conversation_id = %conversation_id,
                    error = %e,
                    "send_message failed"
                );
                send_error(transport, "SEND_FAILED", &e).await;
            }
        }
    }
}

/// The message-creation use case: persist the message document, then hand
/// it to the notification engine. The message remains retrievable by
/// normal query paths even if the notify step fails.
async fn persist_and_notify(
    state: &WebSocketState,
    message: &ChatMessage,
) -> Result<(), String> {
    let data = serde_json::to_value(message).map_err(|e| e.to_string())?;
    state
        .store
        .create(MESSAGES_COLLECTION, &message.id.to_string(), data)
        .await
        .map_err(|e| e.to_string())?;
    state
        .engine
        .handle_new_message(message)
        .await
        .map_err(|e| e.to_string())
}

async fn send_error(transport: &Arc<dyn ClientTransport>, code: &str, message: &str) {
    let frame = ServerFrame::Error {
        code: code.to_string(),
        message: message.to_string(),
    };
    if let Ok(frame) = serde_json::to_string(&frame) {
        let _ = transport.send(&frame).await;
    }
}

/// Create axum router for the WebSocket endpoint.
pub fn websocket_router() -> Router<WebSocketState> {
    Router::new().route("/ws", get(ws_handler))
}
