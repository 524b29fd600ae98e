//! WebSocket support for real-time scan progress updates
//!
//! Clients authenticate with their user id, subscribe to scan updates and
//! receive progress, completion and failure messages for the scans they are
//! allowed to see. They may also cancel scans over the same connection.

mod broadcast;
mod handlers;
mod manager;
mod messages;

pub use handlers::handle_ws_connection;
pub use manager::WebSocketManager;
