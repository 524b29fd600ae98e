//! Starting and cancelling library scans.

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ScannerError, ServiceError, ServiceResult, format_error_chain_ref};
use crate::scan::{LibraryScan, LinkedCancellation, ScanIdentity, ScanJob, ScanWork};
use crate::service::{Actor, ScanningService};

impl ScanningService {
    /// Create a pending scan of a library on behalf of `actor`
    pub fn request_scan(&self, library_id: Uuid, actor: &Actor) -> ServiceResult<LibraryScan> {
        let library = self.get_library(library_id)?;
        if !actor.can_manage(library.owner_id) {
            return Err(ServiceError::Forbidden);
        }

        let scan = LibraryScan::new(library.id, actor.user_id);
        self.lifecycle.scans().insert(scan.clone());
        debug!(scan_id = %scan.id, library_id = %library.id, user_id = %actor.user_id, "Scan requested");
        Ok(scan)
    }

    /// Start a pending scan.
    ///
    /// Expands the library into top-level jobs and queues them in order, then
    /// returns the number of jobs queued. It does not wait for any job to run;
    /// failures after this point are reported through progress notifications.
    /// `caller_token` only bounds the expansion and queueing.
    pub async fn start_scan(
        &self,
        scan_id: Uuid,
        download_metadata_allowed: bool,
        caller_token: &CancellationToken,
    ) -> ServiceResult<usize> {
        let scan = self.get_scan(scan_id)?;
        let library = self.get_library(scan.library_id)?;
        let identity = scan.identity();

        self.lifecycle.scans().transition(scan_id, LibraryScan::start)?;
        let cancellations = self.lifecycle.cancellations();
        cancellations.register_scan(identity.scan_id, identity.user_id);
        let scan_token = cancellations.token_for_scan(identity.scan_id, identity.user_id);
        let linked = LinkedCancellation::new(&[caller_token, &scan_token]);
        let token = linked.token();

        info!(
            scan = %identity,
            library_id = %library.id,
            library_type = %library.library_type,
            download_metadata = download_metadata_allowed,
            "Starting library scan"
        );

        let expansion = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(self.start_cancelled(identity)),
            result = self.scanners.create_scan_jobs(&library, download_metadata_allowed) => result,
        };
        let jobs = self.expanded_jobs(identity, expansion)?;

        let total = jobs.len();
        self.lifecycle.begin(identity, total);
        counter!("mediavault_scans_started_total").increment(1);

        if total == 0 {
            self.lifecycle.complete_empty(identity);
            return Ok(0);
        }

        for work in jobs {
            if token.is_cancelled() {
                return Err(self.start_cancelled(identity));
            }
            if let Err(e) = self.queue.enqueue(ScanJob::new(identity, work)) {
                warn!(scan = %identity, "Scan queue closed while queueing jobs");
                self.lifecycle.scan_aborted(identity, &e.to_string());
                return Err(e.into());
            }
        }

        info!(scan = %identity, jobs = total, "Scan jobs queued");
        Ok(total)
    }

    /// Cancel a scan. Succeeds whether or not the scan was still running.
    pub fn cancel_scan(&self, scan: &LibraryScan) -> ServiceResult<()> {
        let identity = scan.identity();
        let was_active = self
            .lifecycle
            .cancellations()
            .is_registered(identity.scan_id, identity.user_id);
        self.lifecycle.scan_cancelled(identity);

        if was_active {
            counter!("mediavault_scans_cancelled_total").increment(1);
            info!(scan = %identity, "Scan cancelled");
        } else {
            debug!(scan = %identity, "Cancel requested for inactive scan");
        }
        Ok(())
    }

    /// Cancel every active scan of a user, returning how many were cancelled
    pub fn cancel_user_scans(&self, user_id: Uuid) -> usize {
        let cancelled = self.lifecycle.cancellations().cancel_user_scans(user_id);
        for identity in &cancelled {
            self.lifecycle.scan_cancelled(*identity);
        }

        if !cancelled.is_empty() {
            counter!("mediavault_scans_cancelled_total").increment(cancelled.len() as u64);
            info!(user_id = %user_id, count = cancelled.len(), "Cancelled user scans");
        }
        cancelled.len()
    }

    /// Resolve the scanner outcome into the jobs to queue, failing the scan when
    /// it cannot go ahead.
    fn expanded_jobs(
        &self,
        identity: ScanIdentity,
        expansion: Result<Vec<Box<dyn ScanWork>>, ScannerError>,
    ) -> ServiceResult<Vec<Box<dyn ScanWork>>> {
        let error = match expansion {
            Ok(jobs) => return Ok(jobs),
            Err(ScannerError::Unsupported { library_type })
                if !self.config.scanning.reject_unsupported_library_types =>
            {
                warn!(
                    scan = %identity,
                    library_type = %library_type,
                    "No scanner for library type, scan produces no jobs"
                );
                return Ok(Vec::new());
            }
            Err(ScannerError::Unsupported { library_type }) => {
                ServiceError::UnsupportedLibraryType { library_type }
            }
            Err(e) => ServiceError::Scanner(e),
        };

        let message = format_error_chain_ref(&error);
        warn!(scan = %identity, error = %message, "Scan could not be started");
        self.lifecycle.scan_aborted(identity, &message);
        Err(error)
    }

    fn start_cancelled(&self, identity: ScanIdentity) -> ServiceError {
        info!(scan = %identity, "Scan cancelled while starting");
        self.lifecycle.scan_cancelled(identity);
        ServiceError::ScanStartCancelled {
            scan_id: identity.scan_id,
        }
    }
}
