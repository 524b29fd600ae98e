//! Folder-walking scanner for file based media types.
//!
//! Each configured library path becomes one top-level job. A job lists its own
//! directory, queues one child job per subdirectory, and indexes the media
//! files it finds directly inside it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ScanJobError, ScannerError};

use super::job::{JobContext, ScanWork};
use super::model::Library;
use super::scanner::LibraryScanner;

/// Scanner matching media files by extension
#[derive(Debug, Clone)]
pub struct FolderScanner {
    extensions: Arc<[String]>,
}

impl FolderScanner {
    pub fn new(extensions: &[String]) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }
}

#[async_trait]
impl LibraryScanner for FolderScanner {
    async fn create_scan_jobs_for_library(
        &self,
        library: &Library,
        download_metadata_allowed: bool,
    ) -> Result<Vec<Box<dyn ScanWork>>, ScannerError> {
        let mut jobs: Vec<Box<dyn ScanWork>> = Vec::with_capacity(library.paths.len());
        for path in &library.paths {
            let metadata = tokio::fs::metadata(path)
                .await
                .map_err(|source| ScannerError::Io {
                    path: path.clone(),
                    source,
                })?;
            if !metadata.is_dir() {
                return Err(ScannerError::Io {
                    path: path.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotADirectory,
                        "library path is not a directory",
                    ),
                });
            }
            jobs.push(Box::new(FolderScanJob {
                path: path.clone(),
                extensions: self.extensions.clone(),
                download_metadata_allowed,
            }));
        }
        Ok(jobs)
    }
}

/// Scans one directory level
#[derive(Debug)]
struct FolderScanJob {
    path: PathBuf,
    extensions: Arc<[String]>,
    download_metadata_allowed: bool,
}

impl FolderScanJob {
    fn child(&self, path: PathBuf) -> Self {
        Self {
            path,
            extensions: self.extensions.clone(),
            download_metadata_allowed: self.download_metadata_allowed,
        }
    }

    fn is_media_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
    }

    /// Split the directory into subdirectories and media files, both sorted
    async fn list_entries(&self, ctx: &JobContext) -> Result<(Vec<PathBuf>, Vec<PathBuf>), ScanJobError> {
        let io_error = |source| ScanJobError::Io {
            path: self.path.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.path).await.map_err(io_error)?;
        let mut directories = Vec::new();
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            ctx.check_cancelled()?;

            let path = entry.path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if hidden {
                continue;
            }

            let file_type = entry.file_type().await.map_err(io_error)?;
            if file_type.is_dir() {
                directories.push(path);
            } else if file_type.is_file() && self.is_media_file(&path) {
                files.push(path);
            }
        }

        directories.sort();
        files.sort();
        Ok((directories, files))
    }
}

#[async_trait]
impl ScanWork for FolderScanJob {
    fn label(&self) -> String {
        format!("folder {}", self.path.display())
    }

    async fn run(&self, ctx: &JobContext) -> Result<(), ScanJobError> {
        ctx.check_cancelled()?;
        debug!(
            scan = %ctx.identity(),
            path = %self.path.display(),
            download_metadata = self.download_metadata_allowed,
            "Scanning folder"
        );

        let (directories, files) = self.list_entries(ctx).await?;

        let children: Vec<Box<dyn ScanWork>> = directories
            .into_iter()
            .map(|dir| Box::new(self.child(dir)) as Box<dyn ScanWork>)
            .collect();
        ctx.enqueue_children(children)?;

        let total = files.len();
        ctx.report_items(0, total, Some(format!("Scanning {}", self.path.display())));

        for (index, file) in files.iter().enumerate() {
            ctx.check_cancelled()?;

            let metadata = tokio::fs::metadata(file)
                .await
                .map_err(|source| ScanJobError::Io {
                    path: file.clone(),
                    source,
                })?;
            debug!(
                scan = %ctx.identity(),
                file = %file.display(),
                size = metadata.len(),
                "Discovered media file"
            );

            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            ctx.report_items(index + 1, total, Some(format!("Indexed {}", name)));
        }

        Ok(())
    }
}
