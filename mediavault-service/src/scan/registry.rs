//! In-memory store of scan aggregates.

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{ScanStateError, ServiceError, ServiceResult};

use super::model::LibraryScan;

#[derive(Debug, Default)]
pub struct ScanRegistry {
    scans: DashMap<Uuid, LibraryScan>,
}

impl ScanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, scan: LibraryScan) {
        self.scans.insert(scan.id, scan);
    }

    pub fn get(&self, scan_id: Uuid) -> Option<LibraryScan> {
        self.scans.get(&scan_id).map(|scan| scan.clone())
    }

    /// Scans of one user, or of everyone when `user_id` is `None`, newest first
    pub fn list(&self, user_id: Option<Uuid>) -> Vec<LibraryScan> {
        let mut scans: Vec<LibraryScan> = self
            .scans
            .iter()
            .filter(|entry| user_id.is_none_or(|id| entry.user_id == id))
            .map(|entry| entry.value().clone())
            .collect();
        scans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        scans
    }

    /// Apply a state transition while holding the entry lock.
    ///
    /// Transitions on one scan are serialized; a rejected transition leaves the scan untouched.
    pub fn transition<F>(&self, scan_id: Uuid, apply: F) -> ServiceResult<LibraryScan>
    where
        F: FnOnce(&mut LibraryScan) -> Result<(), ScanStateError>,
    {
        let mut scan = self
            .scans
            .get_mut(&scan_id)
            .ok_or(ServiceError::ScanNotFound { scan_id })?;
        apply(&mut scan).map_err(|source| ServiceError::InvalidScanTransition { scan_id, source })?;
        Ok(scan.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::ScanStatus;

    #[test]
    fn test_transition_is_checked() {
        let registry = ScanRegistry::new();
        let scan = LibraryScan::new(Uuid::new_v4(), Uuid::new_v4());
        let scan_id = scan.id;
        registry.insert(scan);

        let started = registry.transition(scan_id, LibraryScan::start).unwrap();
        assert_eq!(started.status, ScanStatus::Running);

        let err = registry.transition(scan_id, LibraryScan::start).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidScanTransition { .. }));
        assert_eq!(registry.get(scan_id).unwrap().status, ScanStatus::Running);

        let missing = registry.transition(Uuid::new_v4(), LibraryScan::start);
        assert!(matches!(missing, Err(ServiceError::ScanNotFound { .. })));
    }

    #[test]
    fn test_list_filters_by_user() {
        let registry = ScanRegistry::new();
        let user = Uuid::new_v4();
        registry.insert(LibraryScan::new(Uuid::new_v4(), user));
        registry.insert(LibraryScan::new(Uuid::new_v4(), user));
        registry.insert(LibraryScan::new(Uuid::new_v4(), Uuid::new_v4()));

        assert_eq!(registry.list(Some(user)).len(), 2);
        assert_eq!(registry.list(None).len(), 3);
    }
}
