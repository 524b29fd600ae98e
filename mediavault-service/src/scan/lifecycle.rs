//! Scan lifecycle bookkeeping shared by the scanning service and running jobs.
//!
//! Keeps the scan aggregate, its cancellation entry and its progress entry in
//! step, and pushes every change to the notifier.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info, warn};

use crate::error::ScanStateError;

use super::cancellation::ScanCancellationTracker;
use super::identity::ScanIdentity;
use super::model::{LibraryScan, ScanStatus};
use super::notifier::ScanNotifier;
use super::progress::{JobCompletion, ScanProgressSnapshot, ScanProgressTracker};
use super::registry::ScanRegistry;

pub struct ScanLifecycle {
    progress: Arc<ScanProgressTracker>,
    cancellations: Arc<ScanCancellationTracker>,
    scans: Arc<ScanRegistry>,
    notifier: Arc<dyn ScanNotifier>,
}

impl ScanLifecycle {
    pub fn new(
        progress: Arc<ScanProgressTracker>,
        cancellations: Arc<ScanCancellationTracker>,
        scans: Arc<ScanRegistry>,
        notifier: Arc<dyn ScanNotifier>,
    ) -> Self {
        Self {
            progress,
            cancellations,
            scans,
            notifier,
        }
    }

    pub fn progress(&self) -> &ScanProgressTracker {
        &self.progress
    }

    pub fn cancellations(&self) -> &ScanCancellationTracker {
        &self.cancellations
    }

    pub fn scans(&self) -> &ScanRegistry {
        &self.scans
    }

    /// Start tracking progress for a scan whose top-level jobs are known
    pub fn begin(&self, identity: ScanIdentity, total_jobs: usize) -> ScanProgressSnapshot {
        let snapshot = self.progress.begin_scan(identity, total_jobs);
        self.notifier.scan_progress(&snapshot);
        snapshot
    }

    /// Finish a scan that produced no jobs at all
    pub fn complete_empty(&self, identity: ScanIdentity) {
        self.progress.set_status(&identity, ScanStatus::Completed);
        self.finish(identity);
    }

    pub fn jobs_added(&self, identity: ScanIdentity, count: usize) {
        if let Some(snapshot) = self.progress.add_jobs(&identity, count) {
            self.notifier.scan_progress(&snapshot);
        }
    }

    pub fn jobs_withdrawn(&self, identity: ScanIdentity, count: usize) {
        if let Some(snapshot) = self.progress.remove_jobs(&identity, count) {
            self.notifier.scan_progress(&snapshot);
        }
    }

    pub fn job_progress(
        &self,
        identity: ScanIdentity,
        completed: usize,
        total: usize,
        operation: Option<String>,
    ) {
        if let Some(snapshot) = self
            .progress
            .update_job_progress(&identity, completed, total, operation)
        {
            self.notifier.scan_progress(&snapshot);
        }
    }

    pub fn job_completed(&self, identity: ScanIdentity) {
        let completion = self.progress.complete_job(&identity);
        self.after_job(identity, completion);
    }

    pub fn job_failed(&self, identity: ScanIdentity, message: &str) {
        counter!("mediavault_scan_jobs_failed_total").increment(1);
        let completion = self.progress.fail_job(&identity, message);
        self.after_job(identity, completion);
    }

    /// Mark a scan cancelled and report its last progress.
    ///
    /// Safe to call for scans that already finished or were never started.
    pub fn scan_cancelled(&self, identity: ScanIdentity) {
        self.cancellations
            .cancel_scan(identity.scan_id, identity.user_id);
        self.transition(identity, LibraryScan::cancel);

        self.progress.set_status(&identity, ScanStatus::Cancelled);
        if let Some(snapshot) = self.progress.remove_scan_progress(&identity) {
            counter!("mediavault_scans_finished_total", "status" => "cancelled").increment(1);
            self.notifier.scan_finished(&snapshot);
        }
    }

    /// Fail a scan that could not be started, stopping any jobs already queued
    pub fn scan_aborted(&self, identity: ScanIdentity, message: &str) {
        self.cancellations
            .cancel_scan(identity.scan_id, identity.user_id);
        self.transition(identity, |scan| scan.fail(message));

        self.progress.set_error(&identity, message);
        if let Some(snapshot) = self.progress.remove_scan_progress(&identity) {
            counter!("mediavault_scans_finished_total", "status" => "failed").increment(1);
            self.notifier.scan_failed(&snapshot);
        }
    }

    fn after_job(&self, identity: ScanIdentity, completion: Option<JobCompletion>) {
        match completion {
            Some(completion) if completion.scan_finished => self.finish(identity),
            Some(completion) => self.notifier.scan_progress(&completion.snapshot),
            None => debug!(scan = %identity, "Job finished for a scan that is no longer tracked"),
        }
    }

    fn finish(&self, identity: ScanIdentity) {
        self.cancellations
            .unregister_scan(identity.scan_id, identity.user_id);

        let Some(snapshot) = self.progress.remove_scan_progress(&identity) else {
            return;
        };

        counter!("mediavault_scans_finished_total", "status" => snapshot.status.as_str())
            .increment(1);
        if snapshot.status == ScanStatus::Failed {
            let message = snapshot
                .error
                .clone()
                .unwrap_or_else(|| "scan job failed".to_string());
            self.transition(identity, |scan| scan.fail(message));
            warn!(
                scan = %identity,
                failed_jobs = snapshot.failed_jobs,
                total_jobs = snapshot.total_jobs,
                "Scan finished with failures"
            );
            self.notifier.scan_failed(&snapshot);
        } else {
            self.transition(identity, LibraryScan::complete);
            info!(scan = %identity, total_jobs = snapshot.total_jobs, "Scan completed");
            self.notifier.scan_finished(&snapshot);
        }
    }

    fn transition<F>(&self, identity: ScanIdentity, apply: F)
    where
        F: FnOnce(&mut LibraryScan) -> Result<(), ScanStateError>,
    {
        if let Err(e) = self.scans.transition(identity.scan_id, apply) {
            debug!(scan = %identity, error = %e, "Scan state left unchanged");
        }
    }
}
