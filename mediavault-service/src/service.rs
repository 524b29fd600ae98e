mod queries;
mod scanning;
mod state;

pub use state::{Actor, ActorRole};

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::scan::{
    Library, ScanCancellationTracker, ScanJobProcessor, ScanLifecycle, ScanNotifier,
    ScanProgressTracker, ScanQueue, ScanQueueReceiver, ScanRegistry, ScannerRegistry, scan_queue,
};

/// Main service coordinator
pub struct ScanningService {
    config: Arc<ServiceConfig>,
    libraries: HashMap<Uuid, Library>,
    scanners: ScannerRegistry,
    queue: ScanQueue,
    lifecycle: Arc<ScanLifecycle>,
}

impl ScanningService {
    /// Create a new service instance.
    /// Returns the receiving end of the scan queue, to be handed to the job processor.
    pub fn new(
        config: Arc<ServiceConfig>,
        scanners: ScannerRegistry,
        notifier: Arc<dyn ScanNotifier>,
    ) -> (Self, ScanQueueReceiver) {
        info!("Initializing MediaVault scanning service");

        let mut libraries = HashMap::with_capacity(config.libraries.len());
        for library in &config.libraries {
            if !scanners.supports(library.library_type) {
                warn!(
                    library_id = %library.id,
                    library_type = %library.library_type,
                    "No scanner available for library type"
                );
            }
            if libraries.insert(library.id, library.clone()).is_some() {
                warn!(library_id = %library.id, "Duplicate library id in configuration, keeping the last one");
            }
        }
        info!(
            libraries = libraries.len(),
            scanners = ?scanners.supported_types(),
            "Libraries loaded"
        );

        let lifecycle = Arc::new(ScanLifecycle::new(
            Arc::new(ScanProgressTracker::new()),
            Arc::new(ScanCancellationTracker::new()),
            Arc::new(ScanRegistry::new()),
            notifier,
        ));
        let (queue, receiver) = scan_queue();

        let service = Self {
            config,
            libraries,
            scanners,
            queue,
            lifecycle,
        };
        (service, receiver)
    }

    /// Build the processor that drains this service's queue
    pub fn processor(&self, receiver: ScanQueueReceiver, shutdown: CancellationToken) -> ScanJobProcessor {
        ScanJobProcessor::new(receiver, self.queue.clone(), self.lifecycle.clone(), shutdown)
    }

    pub fn queue(&self) -> &ScanQueue {
        &self.queue
    }

    pub fn lifecycle(&self) -> &ScanLifecycle {
        &self.lifecycle
    }

    /// Cancel every running scan and stop accepting jobs
    pub fn shutdown(&self) {
        let active = self.lifecycle.cancellations().active_count();
        if active > 0 {
            info!(active, "Cancelling active scans for shutdown");
        }
        self.lifecycle.cancellations().shutdown();
        self.queue.close();
    }
}
