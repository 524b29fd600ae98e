//! WebSocket message types.
//!
//! Defines the client-to-server and server-to-client message formats
//! for WebSocket communication.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scan::ScanProgressSnapshot;
use crate::service::ActorRole;

/// Messages sent from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Identify the user behind the connection
    Auth {
        user_id: Uuid,
        #[serde(default)]
        role: ActorRole,
    },
    /// Keepalive ping
    Ping,
    /// Subscribe to scan progress updates
    SubscribeScans,
    /// Unsubscribe from scan progress updates
    UnsubscribeScans,
    /// Cancel a running scan
    CancelScan { scan_id: Uuid },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Response to authentication attempt
    AuthResponse {
        success: bool,
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Keepalive pong response
    Pong { timestamp: u64 },
    /// Error message
    Error {
        code: String,
        message: String,
        recoverable: bool,
    },
    /// A scan made progress
    ScanProgress { progress: ScanProgressSnapshot },
    /// A scan completed or was cancelled; carries its last progress
    ScanFinished { progress: ScanProgressSnapshot },
    /// A scan ended with an error
    ScanFailed { progress: ScanProgressSnapshot },
}

impl ServerMessage {
    pub(crate) fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            message: message.into(),
            recoverable: true,
        }
    }
}
