//! Per-media-type scanners that expand a library into scan jobs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::ScanningConfig;
use crate::error::ScannerError;

use super::folder::FolderScanner;
use super::job::ScanWork;
use super::model::{Library, LibraryType};

/// Expands a library into the ordered list of top-level jobs of a scan
#[async_trait]
pub trait LibraryScanner: Send + Sync {
    async fn create_scan_jobs_for_library(
        &self,
        library: &Library,
        download_metadata_allowed: bool,
    ) -> Result<Vec<Box<dyn ScanWork>>, ScannerError>;
}

/// Scanners keyed by the library type they handle
#[derive(Default, Clone)]
pub struct ScannerRegistry {
    scanners: HashMap<LibraryType, Arc<dyn LibraryScanner>>,
}

impl ScannerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folder scanners for every library type that has extensions configured
    pub fn from_config(config: &ScanningConfig) -> Self {
        let mut registry = Self::new();
        for library_type in [LibraryType::Book, LibraryType::Video, LibraryType::Music] {
            if let Some(extensions) = config.extensions.for_library_type(library_type) {
                registry.register(library_type, Arc::new(FolderScanner::new(extensions)));
            }
        }
        info!(
            library_types = ?registry.supported_types(),
            "Library scanners registered"
        );
        registry
    }

    pub fn register(&mut self, library_type: LibraryType, scanner: Arc<dyn LibraryScanner>) {
        self.scanners.insert(library_type, scanner);
    }

    pub fn supports(&self, library_type: LibraryType) -> bool {
        self.scanners.contains_key(&library_type)
    }

    pub fn supported_types(&self) -> Vec<LibraryType> {
        let mut types: Vec<LibraryType> = self.scanners.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }

    /// Expand a library with the scanner registered for its type
    pub async fn create_scan_jobs(
        &self,
        library: &Library,
        download_metadata_allowed: bool,
    ) -> Result<Vec<Box<dyn ScanWork>>, ScannerError> {
        let scanner = self
            .scanners
            .get(&library.library_type)
            .ok_or(ScannerError::Unsupported {
                library_type: library.library_type,
            })?;
        scanner
            .create_scan_jobs_for_library(library, download_metadata_allowed)
            .await
    }
}
