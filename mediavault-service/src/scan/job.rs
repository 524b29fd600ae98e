//! Scan jobs and the context they run in.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ScanJobError, format_error_chain_ref};

use super::identity::ScanIdentity;
use super::lifecycle::ScanLifecycle;
use super::queue::ScanQueue;

/// Type-specific work carried by a job. Only the scanner that created it
/// knows what it does.
#[async_trait]
pub trait ScanWork: Send + Sync {
    /// Short description for logs
    fn label(&self) -> String;

    /// Do the work. Implementations check `ctx` for cancellation at their
    /// own checkpoints and return [`ScanJobError::Cancelled`] when it fires.
    async fn run(&self, ctx: &JobContext) -> Result<(), ScanJobError>;
}

/// A unit of scan work stamped with the scan it belongs to
pub struct ScanJob {
    identity: ScanIdentity,
    work: Box<dyn ScanWork>,
}

impl fmt::Debug for ScanJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanJob")
            .field("identity", &self.identity)
            .field("work", &self.work.label())
            .finish()
    }
}

impl ScanJob {
    pub fn new(identity: ScanIdentity, work: Box<dyn ScanWork>) -> Self {
        Self { identity, work }
    }

    pub fn identity(&self) -> ScanIdentity {
        self.identity
    }

    pub fn scan_id(&self) -> Uuid {
        self.identity.scan_id
    }

    pub fn user_id(&self) -> Uuid {
        self.identity.user_id
    }

    pub fn label(&self) -> String {
        self.work.label()
    }

    /// Run the job to completion and record its outcome on the scan.
    ///
    /// A job whose token already fired, or whose scan already ended, exits
    /// without running. Cancellation is not an error; other failures are
    /// recorded against the scan and returned.
    pub async fn execute(self, ctx: JobContext) -> Result<(), ScanJobError> {
        if ctx.is_cancelled() || !ctx.scan_is_active() {
            debug!(scan = %self.identity, job = %self.label(), "Skipping job for inactive scan");
            return Ok(());
        }

        match self.work.run(&ctx).await {
            Ok(()) => {
                ctx.complete_job();
                Ok(())
            }
            Err(ScanJobError::Cancelled) => {
                debug!(scan = %self.identity, job = %self.label(), "Job stopped by cancellation");
                Ok(())
            }
            Err(e) => {
                let message = format_error_chain_ref(&e);
                warn!(scan = %self.identity, job = %self.label(), error = %message, "Scan job failed");
                ctx.fail_job(&message);
                Err(e)
            }
        }
    }
}

/// Everything a running job may touch: its cancellation token, the queue for
/// child jobs, and the scan's progress.
#[derive(Clone)]
pub struct JobContext {
    identity: ScanIdentity,
    token: CancellationToken,
    queue: ScanQueue,
    lifecycle: Arc<ScanLifecycle>,
}

impl JobContext {
    pub fn new(
        identity: ScanIdentity,
        token: CancellationToken,
        queue: ScanQueue,
        lifecycle: Arc<ScanLifecycle>,
    ) -> Self {
        Self {
            identity,
            token,
            queue,
            lifecycle,
        }
    }

    pub fn identity(&self) -> ScanIdentity {
        self.identity
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the scan is still being tracked and still owns a cancellation
    /// token. Cancelled, finished and shut down scans fail one or both checks.
    pub fn scan_is_active(&self) -> bool {
        self.lifecycle
            .cancellations()
            .is_registered(self.identity.scan_id, self.identity.user_id)
            && self.lifecycle.progress().is_tracked(&self.identity)
    }

    /// Cooperative cancellation checkpoint
    pub fn check_cancelled(&self) -> Result<(), ScanJobError> {
        if self.token.is_cancelled() {
            Err(ScanJobError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Queue child jobs for the same scan.
    ///
    /// The children are counted against the scan before they are queued so the
    /// scan cannot finish while they are still waiting. Children the queue
    /// refuses are taken back off the count.
    pub fn enqueue_children(&self, children: Vec<Box<dyn ScanWork>>) -> Result<usize, ScanJobError> {
        if children.is_empty() {
            return Ok(0);
        }
        self.check_cancelled()?;

        let count = children.len();
        self.lifecycle.jobs_added(self.identity, count);
        for (queued, work) in children.into_iter().enumerate() {
            if let Err(e) = self.queue.enqueue(ScanJob::new(self.identity, work)) {
                self.lifecycle.jobs_withdrawn(self.identity, count - queued);
                return Err(e.into());
            }
        }
        debug!(scan = %self.identity, count, "Queued child jobs");
        Ok(count)
    }

    /// Report item-level progress of this job
    pub fn report_items(&self, completed: usize, total: usize, operation: Option<String>) {
        self.lifecycle
            .job_progress(self.identity, completed, total, operation);
    }

    fn complete_job(&self) {
        self.lifecycle.job_completed(self.identity);
    }

    fn fail_job(&self, message: &str) {
        self.lifecycle.job_failed(self.identity, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::scan::ScanStatus;
    use crate::scan::testing::{FailingWork, LabelWork, TestPipeline};

    #[tokio::test]
    async fn test_execute_completes_job() {
        let pipeline = TestPipeline::new();
        let identity = pipeline.running_scan(2);

        let job = ScanJob::new(identity, Box::new(LabelWork::new("a")));
        job.execute(pipeline.context(identity, CancellationToken::new()))
            .await
            .unwrap();

        let progress = pipeline.lifecycle.progress().get_scan_progress(&identity).unwrap();
        assert_eq!(progress.completed_jobs, 1);
        assert_eq!(progress.overall_percentage, 50);
    }

    #[tokio::test]
    async fn test_execute_skips_cancelled_job() {
        let pipeline = TestPipeline::new();
        let identity = pipeline.running_scan(1);
        let token = CancellationToken::new();
        token.cancel();

        let work = LabelWork::new("skipped");
        let runs = work.runs();
        ScanJob::new(identity, Box::new(work))
            .execute(pipeline.context(identity, token))
            .await
            .unwrap();

        assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 0);
        let progress = pipeline.lifecycle.progress().get_scan_progress(&identity).unwrap();
        assert_eq!(progress.completed_jobs, 0);
    }

    #[tokio::test]
    async fn test_execute_skips_job_of_finished_scan() {
        let pipeline = TestPipeline::new();
        let identity = pipeline.running_scan(1);
        pipeline.lifecycle.scan_cancelled(identity);

        let work = LabelWork::new("late");
        let runs = work.runs();
        ScanJob::new(identity, Box::new(work))
            .execute(pipeline.context(identity, CancellationToken::new()))
            .await
            .unwrap();
        assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_execute_records_failure() {
        let pipeline = TestPipeline::new();
        let identity = pipeline.running_scan(1);

        let result = ScanJob::new(identity, Box::new(FailingWork))
            .execute(pipeline.context(identity, CancellationToken::new()))
            .await;
        assert!(matches!(result, Err(ScanJobError::Io { .. })));

        // Last job finished with an error: the scan is failed and its progress removed
        assert!(pipeline.lifecycle.progress().get_scan_progress(&identity).is_none());
        let scan = pipeline.lifecycle.scans().get(identity.scan_id).unwrap();
        assert_eq!(scan.status, ScanStatus::Failed);
        assert_eq!(pipeline.notifier.failed().len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_children_counts_before_queueing() {
        let pipeline = TestPipeline::new();
        let identity = pipeline.running_scan(1);
        let ctx = pipeline.context(identity, CancellationToken::new());

        let queued = ctx
            .enqueue_children(vec![
                Box::new(LabelWork::new("child-1")),
                Box::new(LabelWork::new("child-2")),
            ])
            .unwrap();
        assert_eq!(queued, 2);
        assert_eq!(pipeline.queue.len(), 2);

        let progress = pipeline.lifecycle.progress().get_scan_progress(&identity).unwrap();
        assert_eq!(progress.total_jobs, 3);
    }

    #[tokio::test]
    async fn test_refused_children_are_not_counted() {
        let pipeline = TestPipeline::new();
        let identity = pipeline.running_scan(1);
        let ctx = pipeline.context(identity, CancellationToken::new());
        pipeline.queue.close();

        let result = ctx.enqueue_children(vec![
            Box::new(LabelWork::new("child-1")),
            Box::new(LabelWork::new("child-2")),
        ]);
        assert!(matches!(result, Err(ScanJobError::QueueClosed(_))));
        let progress = pipeline.lifecycle.progress().get_scan_progress(&identity).unwrap();
        assert_eq!(progress.total_jobs, 1);
        let reported = pipeline.notifier.progress();
        assert_eq!(reported.last().map(|p| p.total_jobs), Some(1));

        // The parent job is still the only thing between the scan and completion
        pipeline.lifecycle.job_completed(identity);
        assert_eq!(pipeline.notifier.finished().len(), 1);
    }
}
