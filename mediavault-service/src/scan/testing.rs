//! Shared fixtures for scan pipeline tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ScanJobError, ScannerError};

use super::{
    JobContext, Library, LibraryScan, LibraryScanner, ScanCancellationTracker, ScanIdentity,
    ScanLifecycle, ScanNotifier, ScanProgressSnapshot, ScanProgressTracker, ScanQueue,
    ScanQueueReceiver, ScanRegistry, ScanWork, scan_queue,
};

/// Notifier that keeps every snapshot it receives
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    progress: Mutex<Vec<ScanProgressSnapshot>>,
    finished: Mutex<Vec<ScanProgressSnapshot>>,
    failed: Mutex<Vec<ScanProgressSnapshot>>,
}

impl RecordingNotifier {
    pub(crate) fn progress(&self) -> Vec<ScanProgressSnapshot> {
        self.progress.lock().unwrap().clone()
    }

    pub(crate) fn finished(&self) -> Vec<ScanProgressSnapshot> {
        self.finished.lock().unwrap().clone()
    }

    pub(crate) fn failed(&self) -> Vec<ScanProgressSnapshot> {
        self.failed.lock().unwrap().clone()
    }
}

impl ScanNotifier for RecordingNotifier {
    fn scan_progress(&self, progress: &ScanProgressSnapshot) {
        self.progress.lock().unwrap().push(progress.clone());
    }

    fn scan_finished(&self, progress: &ScanProgressSnapshot) {
        self.finished.lock().unwrap().push(progress.clone());
    }

    fn scan_failed(&self, progress: &ScanProgressSnapshot) {
        self.failed.lock().unwrap().push(progress.clone());
    }
}

/// Trackers, registry and queue wired together the way the service wires them
pub(crate) struct TestPipeline {
    pub(crate) lifecycle: Arc<ScanLifecycle>,
    pub(crate) queue: ScanQueue,
    pub(crate) notifier: Arc<RecordingNotifier>,
    receiver: Mutex<Option<ScanQueueReceiver>>,
}

impl TestPipeline {
    pub(crate) fn new() -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        let lifecycle = Arc::new(ScanLifecycle::new(
            Arc::new(ScanProgressTracker::new()),
            Arc::new(ScanCancellationTracker::new()),
            Arc::new(ScanRegistry::new()),
            notifier.clone(),
        ));
        let (queue, receiver) = scan_queue();
        Self {
            lifecycle,
            queue,
            notifier,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    pub(crate) fn take_receiver(&self) -> ScanQueueReceiver {
        self.receiver
            .lock()
            .unwrap()
            .take()
            .expect("receiver already taken")
    }

    /// Register a started scan expecting `total_jobs` top-level jobs
    pub(crate) fn running_scan(&self, total_jobs: usize) -> ScanIdentity {
        let mut scan = LibraryScan::new(Uuid::new_v4(), Uuid::new_v4());
        scan.start().unwrap();
        let identity = scan.identity();
        self.lifecycle.scans().insert(scan);
        self.lifecycle
            .cancellations()
            .register_scan(identity.scan_id, identity.user_id);
        self.lifecycle.begin(identity, total_jobs);
        identity
    }

    pub(crate) fn context(&self, identity: ScanIdentity, token: CancellationToken) -> JobContext {
        JobContext::new(identity, token, self.queue.clone(), self.lifecycle.clone())
    }
}

/// Work that does nothing but count its runs
pub(crate) struct LabelWork {
    label: String,
    runs: Arc<AtomicUsize>,
}

impl LabelWork {
    pub(crate) fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn runs(&self) -> Arc<AtomicUsize> {
        self.runs.clone()
    }
}

#[async_trait]
impl ScanWork for LabelWork {
    fn label(&self) -> String {
        self.label.clone()
    }

    async fn run(&self, ctx: &JobContext) -> Result<(), ScanJobError> {
        ctx.check_cancelled()?;
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Work that always fails with an I/O error
pub(crate) struct FailingWork;

#[async_trait]
impl ScanWork for FailingWork {
    fn label(&self) -> String {
        "failing".to_string()
    }

    async fn run(&self, _ctx: &JobContext) -> Result<(), ScanJobError> {
        Err(ScanJobError::Io {
            path: PathBuf::from("/unreadable"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        })
    }
}

/// Scanner producing one [`LabelWork`] per label, in order
pub(crate) struct FixedScanner {
    labels: Vec<String>,
}

impl FixedScanner {
    pub(crate) fn new(labels: &[&str]) -> Self {
        Self {
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }
}

#[async_trait]
impl LibraryScanner for FixedScanner {
    async fn create_scan_jobs_for_library(
        &self,
        _library: &Library,
        _download_metadata_allowed: bool,
    ) -> Result<Vec<Box<dyn ScanWork>>, ScannerError> {
        Ok(self
            .labels
            .iter()
            .map(|label| Box::new(LabelWork::new(label)) as Box<dyn ScanWork>)
            .collect())
    }
}
