//! WebSocket message handlers.
//!
//! Contains the logic for handling incoming WebSocket connections
//! and processing client messages.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{ServiceError, format_error_chain_ref};
use crate::service::{Actor, ScanningService};

use super::manager::WebSocketManager;
use super::messages::{ClientMessage, ServerMessage};

/// Handle a WebSocket connection
///
/// This function is called when a WebSocket connection is established.
/// It manages the connection lifecycle, processes incoming messages,
/// and forwards outgoing messages.
pub async fn handle_ws_connection(
    socket: WebSocket,
    ws_manager: Arc<WebSocketManager>,
    service: Arc<ScanningService>,
) {
    let session_id = Uuid::new_v4().to_string();
    info!(session_id = %session_id, "New WebSocket connection");

    // Split the socket into sender and receiver
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Create a channel for sending messages to this connection
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<ServerMessage>();
    ws_manager.add_connection(session_id.clone(), msg_tx);

    // Forward messages from the channel to the socket
    let send_session_id = session_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_tx.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to serialize WebSocket message");
                }
            }
        }
        debug!(session_id = %send_session_id, "WebSocket send task ended");
    });

    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(Message::Text(text)) => {
                handle_client_message(&session_id, &text, &ws_manager, &service);
            }
            Ok(Message::Binary(data)) => {
                // Try to parse binary as JSON text
                if let Ok(text) = String::from_utf8(data.to_vec()) {
                    handle_client_message(&session_id, &text, &ws_manager, &service);
                }
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(session_id = %session_id, "WebSocket connection closed by client");
                break;
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    ws_manager.remove_connection(&session_id);
    send_task.abort();
    info!(session_id = %session_id, "WebSocket connection closed");
}

/// Handle a client message
pub(crate) fn handle_client_message(
    session_id: &str,
    text: &str,
    ws_manager: &WebSocketManager,
    service: &ScanningService,
) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(
                session_id = %session_id,
                error = %e,
                "Failed to parse client message"
            );
            ws_manager.send_to(
                session_id,
                ServerMessage::error("parse_error", format!("Failed to parse message: {}", e)),
            );
            return;
        }
    };

    match msg {
        ClientMessage::Auth { user_id, role } => {
            let actor = Actor::new(user_id, role);
            ws_manager.authenticate(session_id, actor);
            ws_manager.send_to(
                session_id,
                ServerMessage::AuthResponse {
                    success: true,
                    session_id: session_id.to_string(),
                    message: None,
                },
            );
            info!(
                session_id = %session_id,
                user_id = %user_id,
                admin = actor.is_admin(),
                "WebSocket connection authenticated"
            );
        }
        ClientMessage::Ping => {
            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);

            ws_manager.send_to(session_id, ServerMessage::Pong { timestamp });
        }
        ClientMessage::SubscribeScans => {
            ws_manager.set_scan_subscription(session_id, true);
        }
        ClientMessage::UnsubscribeScans => {
            ws_manager.set_scan_subscription(session_id, false);
        }
        ClientMessage::CancelScan { scan_id } => {
            let Some(actor) = ws_manager.actor(session_id) else {
                ws_manager.send_to(
                    session_id,
                    ServerMessage::error("not_authenticated", "Authenticate before cancelling scans"),
                );
                return;
            };

            let result = service.get_scan(scan_id).and_then(|scan| {
                if actor.can_manage(scan.user_id) {
                    service.cancel_scan(&scan)
                } else {
                    Err(ServiceError::Forbidden)
                }
            });
            if let Err(e) = result {
                debug!(
                    session_id = %session_id,
                    scan_id = %scan_id,
                    error = %format_error_chain_ref(&e),
                    "Cancel scan rejected"
                );
                ws_manager.send_to(session_id, ServerMessage::error("cancel_rejected", e.to_string()));
            }
        }
    }
}
