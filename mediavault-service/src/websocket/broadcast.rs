//! Broadcast of scan progress to subscribed clients.
//!
//! A connection receives updates for a scan when it is subscribed and its
//! user started the scan or is an administrator.

use tracing::debug;

use crate::scan::{ScanNotifier, ScanProgressSnapshot};

use super::manager::WebSocketManager;
use super::messages::ServerMessage;

impl WebSocketManager {
    /// Send a scan message to every connection allowed to see the scan
    fn broadcast_scan_message(&self, progress: &ScanProgressSnapshot, msg: ServerMessage) {
        let mut sent_count = 0;

        for entry in self.connections.iter() {
            let conn = entry.value();
            if conn.wants_scan_of(progress.user_id) && conn.tx.send(msg.clone()).is_ok() {
                sent_count += 1;
            }
        }

        if sent_count > 0 {
            debug!(
                scan_id = %progress.scan_id,
                sent_count = sent_count,
                "Broadcast scan update to connections"
            );
        }
    }

    pub fn broadcast_scan_progress(&self, progress: &ScanProgressSnapshot) {
        self.broadcast_scan_message(
            progress,
            ServerMessage::ScanProgress {
                progress: progress.clone(),
            },
        );
    }

    pub fn broadcast_scan_finished(&self, progress: &ScanProgressSnapshot) {
        self.broadcast_scan_message(
            progress,
            ServerMessage::ScanFinished {
                progress: progress.clone(),
            },
        );
    }

    pub fn broadcast_scan_failed(&self, progress: &ScanProgressSnapshot) {
        self.broadcast_scan_message(
            progress,
            ServerMessage::ScanFailed {
                progress: progress.clone(),
            },
        );
    }
}

impl ScanNotifier for WebSocketManager {
    fn scan_progress(&self, progress: &ScanProgressSnapshot) {
        self.broadcast_scan_progress(progress);
    }

    fn scan_finished(&self, progress: &ScanProgressSnapshot) {
        self.broadcast_scan_finished(progress);
    }

    fn scan_failed(&self, progress: &ScanProgressSnapshot) {
        self.broadcast_scan_failed(progress);
    }
}
