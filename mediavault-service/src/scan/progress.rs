//! Per-scan progress tracking.
//!
//! Progress is kept per [`ScanIdentity`] at three levels: the scan (jobs
//! completed out of jobs known), the job most recently reporting (items
//! completed out of items found) and an overall status. Percentages are never
//! stored; they are derived whenever a snapshot is taken.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use super::identity::ScanIdentity;
use super::model::ScanStatus;

/// Item-level progress of the job that reported last
#[derive(Debug, Clone, Default)]
struct JobProgress {
    completed_items: usize,
    total_items: usize,
    current_operation: Option<String>,
}

#[derive(Debug, Clone)]
struct ScanProgress {
    total_jobs: usize,
    completed_jobs: usize,
    failed_jobs: usize,
    current_job: Option<JobProgress>,
    status: ScanStatus,
    error: Option<String>,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Point-in-time view of one job's item progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobProgressSnapshot {
    pub completed_items: usize,
    pub total_items: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_operation: Option<String>,
    pub percentage: u8,
}

/// Point-in-time view of a scan's progress
#[derive(Debug, Clone, Serialize)]
pub struct ScanProgressSnapshot {
    pub scan_id: Uuid,
    pub user_id: Uuid,
    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    pub overall_percentage: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_job: Option<JobProgressSnapshot>,
    pub status: ScanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of recording a finished job
#[derive(Debug, Clone)]
pub struct JobCompletion {
    pub snapshot: ScanProgressSnapshot,
    /// True for exactly one caller: the one whose job finished the scan
    pub scan_finished: bool,
}

/// Rounded percentage of `completed` out of `total`; 0 when there is nothing to do
pub(crate) fn percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = completed.min(total) as f64 / total as f64;
    (ratio * 100.0).round() as u8
}

impl JobProgress {
    fn snapshot(&self) -> JobProgressSnapshot {
        JobProgressSnapshot {
            completed_items: self.completed_items,
            total_items: self.total_items,
            current_operation: self.current_operation.clone(),
            percentage: percentage(self.completed_items, self.total_items),
        }
    }
}

impl ScanProgress {
    fn new(total_jobs: usize) -> Self {
        let now = Utc::now();
        Self {
            total_jobs,
            completed_jobs: 0,
            failed_jobs: 0,
            current_job: None,
            status: ScanStatus::Running,
            error: None,
            started_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn snapshot(&self, identity: &ScanIdentity) -> ScanProgressSnapshot {
        ScanProgressSnapshot {
            scan_id: identity.scan_id,
            user_id: identity.user_id,
            total_jobs: self.total_jobs,
            completed_jobs: self.completed_jobs,
            failed_jobs: self.failed_jobs,
            overall_percentage: percentage(self.completed_jobs, self.total_jobs),
            current_job: self.current_job.as_ref().map(JobProgress::snapshot),
            status: self.status,
            error: self.error.clone(),
            started_at: self.started_at,
            updated_at: self.updated_at,
        }
    }
}

/// Progress of every active scan.
#[derive(Debug, Default)]
pub struct ScanProgressTracker {
    scans: DashMap<ScanIdentity, ScanProgress>,
}

impl ScanProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a scan with its initial job count. Replaces any stale entry.
    pub fn begin_scan(&self, identity: ScanIdentity, total_jobs: usize) -> ScanProgressSnapshot {
        let progress = ScanProgress::new(total_jobs);
        let snapshot = progress.snapshot(&identity);
        self.scans.insert(identity, progress);
        snapshot
    }

    pub fn get_scan_progress(&self, identity: &ScanIdentity) -> Option<ScanProgressSnapshot> {
        self.scans
            .get(identity)
            .map(|progress| progress.snapshot(identity))
    }

    /// Read and delete in one step, returning the final snapshot
    pub fn remove_scan_progress(&self, identity: &ScanIdentity) -> Option<ScanProgressSnapshot> {
        self.scans
            .remove(identity)
            .map(|(_, progress)| progress.snapshot(identity))
    }

    /// Account for jobs discovered while the scan is running
    pub fn add_jobs(&self, identity: &ScanIdentity, count: usize) -> Option<ScanProgressSnapshot> {
        self.update(identity, |progress| progress.total_jobs += count)
    }

    /// Take back jobs that were counted but never queued
    pub fn remove_jobs(&self, identity: &ScanIdentity, count: usize) -> Option<ScanProgressSnapshot> {
        self.update(identity, |progress| {
            progress.total_jobs = progress
                .total_jobs
                .saturating_sub(count)
                .max(progress.completed_jobs);
        })
    }

    pub fn complete_job(&self, identity: &ScanIdentity) -> Option<JobCompletion> {
        self.finish_job(identity, None)
    }

    /// Count a job as done but failed, keeping its error as the latest scan error
    pub fn fail_job(&self, identity: &ScanIdentity, message: &str) -> Option<JobCompletion> {
        self.finish_job(identity, Some(message))
    }

    pub fn update_job_progress(
        &self,
        identity: &ScanIdentity,
        completed_items: usize,
        total_items: usize,
        current_operation: Option<String>,
    ) -> Option<ScanProgressSnapshot> {
        self.update(identity, |progress| {
            progress.current_job = Some(JobProgress {
                completed_items: completed_items.min(total_items),
                total_items,
                current_operation,
            });
        })
    }

    pub fn set_status(&self, identity: &ScanIdentity, status: ScanStatus) -> Option<ScanProgressSnapshot> {
        self.update(identity, |progress| progress.status = status)
    }

    /// Record a scan-wide failure
    pub fn set_error(&self, identity: &ScanIdentity, message: &str) -> Option<ScanProgressSnapshot> {
        self.update(identity, |progress| {
            progress.status = ScanStatus::Failed;
            progress.error = Some(message.to_string());
        })
    }

    pub fn is_tracked(&self, identity: &ScanIdentity) -> bool {
        self.scans.contains_key(identity)
    }

    pub fn active_count(&self) -> usize {
        self.scans.len()
    }

    fn update(
        &self,
        identity: &ScanIdentity,
        apply: impl FnOnce(&mut ScanProgress),
    ) -> Option<ScanProgressSnapshot> {
        self.scans.get_mut(identity).map(|mut progress| {
            apply(&mut progress);
            progress.touch();
            progress.snapshot(identity)
        })
    }

    fn finish_job(&self, identity: &ScanIdentity, error: Option<&str>) -> Option<JobCompletion> {
        let mut progress = self.scans.get_mut(identity)?;

        progress.completed_jobs = (progress.completed_jobs + 1).min(progress.total_jobs);
        progress.current_job = None;
        if let Some(message) = error {
            progress.failed_jobs += 1;
            progress.error = Some(message.to_string());
        }

        // The status flip happens under the entry lock, so only one job observes it
        let scan_finished =
            progress.status == ScanStatus::Running && progress.completed_jobs >= progress.total_jobs;
        if scan_finished {
            progress.status = if progress.failed_jobs > 0 {
                ScanStatus::Failed
            } else {
                ScanStatus::Completed
            };
        }
        progress.touch();

        Some(JobCompletion {
            snapshot: progress.snapshot(identity),
            scan_finished,
        })
    }
}
