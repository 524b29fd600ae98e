//! Read-only lookups over libraries, scans and scan progress.

use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::scan::{Library, LibraryScan, ScanIdentity, ScanProgressSnapshot};
use crate::service::ScanningService;

impl ScanningService {
    /// List libraries, sorted by name
    pub fn list_libraries(&self) -> Vec<Library> {
        let mut libraries: Vec<Library> = self.libraries.values().cloned().collect();
        libraries.sort_by(|a, b| a.name.cmp(&b.name));
        libraries
    }

    pub fn get_library(&self, library_id: Uuid) -> ServiceResult<Library> {
        self.libraries
            .get(&library_id)
            .cloned()
            .ok_or(ServiceError::LibraryNotFound { library_id })
    }

    pub fn get_scan(&self, scan_id: Uuid) -> ServiceResult<LibraryScan> {
        self.lifecycle
            .scans()
            .get(scan_id)
            .ok_or(ServiceError::ScanNotFound { scan_id })
    }

    /// List scans, newest first, optionally only those of one user
    pub fn list_scans(&self, user_id: Option<Uuid>) -> Vec<LibraryScan> {
        self.lifecycle.scans().list(user_id)
    }

    pub fn get_scan_progress(&self, identity: &ScanIdentity) -> ServiceResult<ScanProgressSnapshot> {
        self.lifecycle
            .progress()
            .get_scan_progress(identity)
            .ok_or(ServiceError::ScanProgressNotFound {
                scan_id: identity.scan_id,
            })
    }

    /// Read and drop the progress of a scan in one step
    pub fn remove_scan_progress(&self, identity: &ScanIdentity) -> ServiceResult<ScanProgressSnapshot> {
        self.lifecycle
            .progress()
            .remove_scan_progress(identity)
            .ok_or(ServiceError::ScanProgressNotFound {
                scan_id: identity.scan_id,
            })
    }
}
