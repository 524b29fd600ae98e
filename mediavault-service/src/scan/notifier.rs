//! Push notification seam for scan progress.

use super::progress::ScanProgressSnapshot;

/// Receives scan progress as it changes. Implementations must not block.
pub trait ScanNotifier: Send + Sync {
    /// Progress changed on a running scan
    fn scan_progress(&self, progress: &ScanProgressSnapshot);

    /// The scan completed or was cancelled; `progress` is its last snapshot
    fn scan_finished(&self, progress: &ScanProgressSnapshot);

    /// The scan failed; `progress` is its last snapshot
    fn scan_failed(&self, progress: &ScanProgressSnapshot);
}
