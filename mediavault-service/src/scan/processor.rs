//! Background processor draining the scan queue.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use metrics::counter;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::error::format_error_chain_ref;

use super::cancellation::LinkedCancellation;
use super::job::{JobContext, ScanJob};
use super::lifecycle::ScanLifecycle;
use super::queue::{ScanQueue, ScanQueueReceiver};

/// Dequeues scan jobs for the lifetime of the process and fires each one as
/// an independent task.
pub struct ScanJobProcessor {
    receiver: ScanQueueReceiver,
    queue: ScanQueue,
    lifecycle: Arc<ScanLifecycle>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

/// Handle to a running processor
#[derive(Debug)]
pub struct ProcessorHandle {
    shutdown: CancellationToken,
    tasks: TaskTracker,
    join: JoinHandle<()>,
}

impl ScanJobProcessor {
    pub fn new(
        receiver: ScanQueueReceiver,
        queue: ScanQueue,
        lifecycle: Arc<ScanLifecycle>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            queue,
            lifecycle,
            shutdown,
            tasks: TaskTracker::new(),
        }
    }

    /// Start the processor loop.
    /// This should be called once on server startup.
    pub fn start(self) -> ProcessorHandle {
        let shutdown = self.shutdown.clone();
        let tasks = self.tasks.clone();
        let join = tokio::spawn(self.run());
        ProcessorHandle {
            shutdown,
            tasks,
            join,
        }
    }

    async fn run(mut self) {
        info!("Scan job processor started");

        while let Some(job) = self.receiver.dequeue(&self.shutdown).await {
            self.dispatch(job);
        }

        if self.shutdown.is_cancelled() {
            info!(in_flight = self.tasks.len(), "Scan job processor stopping for shutdown");
        } else {
            warn!("Scan queue closed, scan job processor stopping");
        }
        self.tasks.close();
    }

    /// Fire a job without waiting for it
    fn dispatch(&self, job: ScanJob) {
        let identity = job.identity();
        let scan_token = self
            .lifecycle
            .cancellations()
            .token_for_scan(identity.scan_id, identity.user_id);
        let linked = LinkedCancellation::new(&[&self.shutdown, &scan_token]);
        let ctx = JobContext::new(
            identity,
            linked.token(),
            self.queue.clone(),
            self.lifecycle.clone(),
        );

        counter!("mediavault_scan_jobs_dispatched_total").increment(1);
        debug!(scan = %identity, job = %job.label(), "Dispatching scan job");

        let lifecycle = self.lifecycle.clone();
        self.tasks.spawn(async move {
            let label = job.label();
            match AssertUnwindSafe(job.execute(ctx)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(
                        scan = %identity,
                        job = %label,
                        error = %format_error_chain_ref(&e),
                        "Scan job ended with error"
                    );
                }
                Err(_) => {
                    error!(scan = %identity, job = %label, "Scan job panicked");
                    lifecycle.job_failed(identity, "scan job panicked");
                }
            }
            // Release the link between the scan token and the shutdown token
            drop(linked);
        });
    }
}

impl ProcessorHandle {
    /// Stop dequeuing and wait up to `grace` for in-flight jobs to observe cancellation
    pub async fn shutdown(self, grace: Duration) {
        self.shutdown.cancel();
        if let Err(e) = self.join.await {
            error!(error = %e, "Scan job processor task failed");
        }
        self.tasks.close();
        if tokio::time::timeout(grace, self.tasks.wait()).await.is_err() {
            warn!(
                in_flight = self.tasks.len(),
                "Timed out waiting for scan jobs to stop"
            );
        }
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
