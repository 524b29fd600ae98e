//! Unbounded FIFO queue carrying scan jobs to the processor.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use metrics::gauge;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::QueueClosed;

use super::job::ScanJob;

/// Create a connected queue writer and its single reader
pub fn scan_queue() -> (ScanQueue, ScanQueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    let closed = CancellationToken::new();

    (
        ScanQueue {
            tx,
            depth: depth.clone(),
            closed: closed.clone(),
        },
        ScanQueueReceiver { rx, depth, closed },
    )
}

/// Producer side of the queue. Cheap to clone; every clone feeds the same reader.
#[derive(Debug, Clone)]
pub struct ScanQueue {
    tx: mpsc::UnboundedSender<ScanJob>,
    depth: Arc<AtomicUsize>,
    closed: CancellationToken,
}

/// Consumer side of the queue
#[derive(Debug)]
pub struct ScanQueueReceiver {
    rx: mpsc::UnboundedReceiver<ScanJob>,
    depth: Arc<AtomicUsize>,
    closed: CancellationToken,
}

impl ScanQueue {
    /// Append a job. Never blocks; fails only once the queue is closed.
    ///
    /// A job accepted while `close` runs is still delivered: the reader closes
    /// the channel before it reports the queue drained.
    pub fn enqueue(&self, job: ScanJob) -> Result<(), QueueClosed> {
        if self.closed.is_cancelled() {
            return Err(QueueClosed);
        }
        // Count before sending so a fast reader never sees the counter underflow
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        if self.tx.send(job).is_err() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
            return Err(QueueClosed);
        }
        gauge!("mediavault_scan_queue_depth").set(depth as f64);
        Ok(())
    }

    /// Stop accepting jobs. Jobs already queued can still be dequeued.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }

    /// Approximate number of jobs waiting
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ScanQueueReceiver {
    /// Wait for the next job in enqueue order.
    ///
    /// Returns `None` when `cancel` fires, or when the queue is closed and drained.
    /// Once the close is seen the channel is closed too, so a send racing
    /// [`ScanQueue::close`] is either drained here or refused.
    pub async fn dequeue(&mut self, cancel: &CancellationToken) -> Option<ScanJob> {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            job = self.rx.recv() => job,
            _ = self.closed.cancelled() => {
                self.rx.close();
                self.rx.recv().await
            }
        };
        if job.is_some() {
            let depth = self.depth.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
            gauge!("mediavault_scan_queue_depth").set(depth as f64);
        }
        job
    }
}
