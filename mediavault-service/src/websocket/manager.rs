//! WebSocket connection manager.
//!
//! Handles connection lifecycle, authentication, and state tracking
//! for all active WebSocket connections.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::service::Actor;

use super::messages::ServerMessage;

/// State for a single WebSocket connection
pub(crate) struct ConnectionState {
    pub(crate) actor: Option<Actor>,
    pub(crate) tx: mpsc::UnboundedSender<ServerMessage>,
    pub(crate) subscribed_to_scans: bool,
}

impl ConnectionState {
    /// Whether this connection should see updates for a scan started by `user_id`
    pub(crate) fn wants_scan_of(&self, user_id: uuid::Uuid) -> bool {
        self.subscribed_to_scans && self.actor.is_some_and(|actor| actor.can_manage(user_id))
    }
}

/// Manager for all WebSocket connections
///
/// Handles connection lifecycle and message broadcasting.
pub struct WebSocketManager {
    pub(crate) connections: DashMap<String, ConnectionState>,
}

impl Default for WebSocketManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketManager {
    /// Create a new WebSocket manager
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Add a new connection
    pub(crate) fn add_connection(
        &self,
        session_id: String,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) {
        debug!(session_id = %session_id, "Adding WebSocket connection");
        self.connections.insert(
            session_id,
            ConnectionState {
                actor: None,
                tx,
                subscribed_to_scans: false,
            },
        );
    }

    /// Remove a connection
    pub(crate) fn remove_connection(&self, session_id: &str) {
        debug!(session_id = %session_id, "Removing WebSocket connection");
        self.connections.remove(session_id);
    }

    /// Authenticate a connection
    pub(crate) fn authenticate(&self, session_id: &str, actor: Actor) -> bool {
        if let Some(mut conn) = self.connections.get_mut(session_id) {
            conn.actor = Some(actor);
            true
        } else {
            false
        }
    }

    /// The user behind an authenticated connection
    pub(crate) fn actor(&self, session_id: &str) -> Option<Actor> {
        self.connections.get(session_id).and_then(|conn| conn.actor)
    }

    /// Set scan subscription status for a connection
    pub(crate) fn set_scan_subscription(&self, session_id: &str, subscribed: bool) {
        if let Some(mut conn) = self.connections.get_mut(session_id) {
            conn.subscribed_to_scans = subscribed;
            debug!(
                session_id = %session_id,
                subscribed = subscribed,
                "Updated scan subscription"
            );
        }
    }

    /// Send a message to a specific connection
    pub fn send_to(&self, session_id: &str, msg: ServerMessage) {
        if let Some(conn) = self.connections.get(session_id)
            && conn.tx.send(msg).is_err()
        {
            warn!(session_id = %session_id, "Failed to send message to connection");
        }
    }

    /// Get the number of active connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Get the number of authenticated connections subscribed to scans
    pub fn scan_subscriber_count(&self) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.value().actor.is_some() && entry.value().subscribed_to_scans)
            .count()
    }
}
