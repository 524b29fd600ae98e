//! Library scan pipeline.
//!
//! A scan request is expanded by a per-media-type scanner into jobs that are
//! pushed onto an unbounded queue. A single background processor drains the
//! queue and fires every job as its own task, bound to a cancellation token
//! linked from the scan's own token and the process shutdown token. Jobs
//! report item, job and scan level progress as they run.

mod cancellation;
mod folder;
mod identity;
mod job;
mod lifecycle;
mod model;
mod notifier;
mod processor;
mod progress;
mod queue;
mod registry;
mod scanner;

pub use cancellation::{LinkedCancellation, ScanCancellationTracker};
pub use identity::ScanIdentity;
pub use job::{JobContext, ScanJob, ScanWork};
pub use lifecycle::ScanLifecycle;
pub use model::{Library, LibraryScan, LibraryType, ScanStatus};
pub use notifier::ScanNotifier;
pub use processor::ScanJobProcessor;
pub use progress::{ScanProgressSnapshot, ScanProgressTracker};
pub use queue::{ScanQueue, ScanQueueReceiver, scan_queue};
pub use registry::ScanRegistry;
pub use scanner::{LibraryScanner, ScannerRegistry};

#[cfg(test)]
pub(crate) mod testing;
