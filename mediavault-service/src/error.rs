use std::path::PathBuf;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::scan::{LibraryType, ScanStatus};

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Library not found: {library_id}")]
    LibraryNotFound { library_id: Uuid },

    #[error("Scan not found: {scan_id}")]
    ScanNotFound { scan_id: Uuid },

    #[error("No progress tracked for scan {scan_id}")]
    ScanProgressNotFound { scan_id: Uuid },

    #[error("Scan {scan_id} cannot change state")]
    InvalidScanTransition {
        scan_id: Uuid,
        #[source]
        source: ScanStateError,
    },

    #[error("Scan {scan_id} was cancelled before all jobs were queued")]
    ScanStartCancelled { scan_id: Uuid },

    #[error("No scanner available for {library_type} libraries")]
    UnsupportedLibraryType { library_type: LibraryType },

    #[error("{0}")]
    QueueClosed(#[from] QueueClosed),

    #[error("Scanner failed")]
    Scanner(#[from] ScannerError),

    #[error("Not allowed to manage this resource")]
    Forbidden,

    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Rejected state transition on a library scan
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanStateError {
    #[error("cannot {action} a scan that is {from}")]
    InvalidTransition {
        action: &'static str,
        from: ScanStatus,
    },
}

/// The scan queue no longer accepts jobs
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Scan queue is closed")]
pub struct QueueClosed;

/// Errors raised while expanding a library into scan jobs
#[derive(Error, Debug)]
pub enum ScannerError {
    #[error("No scanner registered for {library_type} libraries")]
    Unsupported { library_type: LibraryType },

    #[error("Library path is not readable: {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised inside a running scan job
#[derive(Error, Debug)]
pub enum ScanJobError {
    #[error("Scan job was cancelled")]
    Cancelled,

    #[error("Failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    QueueClosed(#[from] QueueClosed),
}

/// API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::LibraryNotFound { .. }
            | ServiceError::ScanNotFound { .. }
            | ServiceError::ScanProgressNotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::InvalidScanTransition { .. } => StatusCode::CONFLICT,
            ServiceError::UnsupportedLibraryType { .. }
            | ServiceError::Scanner(ScannerError::Unsupported { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServiceError::Forbidden => StatusCode::FORBIDDEN,
            ServiceError::QueueClosed(_) | ServiceError::ScanStartCancelled { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::LibraryNotFound { .. } => "library_not_found",
            ServiceError::ScanNotFound { .. } => "scan_not_found",
            ServiceError::ScanProgressNotFound { .. } => "scan_progress_not_found",
            ServiceError::InvalidScanTransition { .. } => "invalid_scan_transition",
            ServiceError::ScanStartCancelled { .. } => "scan_start_cancelled",
            ServiceError::UnsupportedLibraryType { .. } => "unsupported_library_type",
            ServiceError::QueueClosed(_) => "queue_closed",
            ServiceError::Scanner(ScannerError::Unsupported { .. }) => "unsupported_library_type",
            ServiceError::Scanner(ScannerError::Io { .. }) => "scanner_io_error",
            ServiceError::Forbidden => "forbidden",
            ServiceError::Config { .. } => "config_error",
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ServiceError::InvalidScanTransition { source, .. } => {
                Some(serde_json::json!({ "reason": source.to_string() }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let response = ErrorResponse {
            message: self.to_string(),
            code: Some(self.error_code().to_string()),
            details: self.details(),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Format an error along with its `source()` chain, outermost first
pub fn format_error_chain_ref(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut current = error.source();
    while let Some(source) = current {
        message.push_str(": ");
        message.push_str(&source.to_string());
        current = source.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let id = Uuid::new_v4();
        assert_eq!(
            ServiceError::ScanProgressNotFound { scan_id: id }.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::InvalidScanTransition {
                scan_id: id,
                source: ScanStateError::InvalidTransition {
                    action: "start",
                    from: ScanStatus::Running,
                },
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(ServiceError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ServiceError::from(QueueClosed).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );

        let config = ServiceError::Config {
            message: "missing port".to_string(),
        };
        assert_eq!(config.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(config.error_code(), "config_error");
    }

    #[test]
    fn test_format_error_chain() {
        let error = ScanJobError::Io {
            path: PathBuf::from("/media/books"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert_eq!(
            format_error_chain_ref(&error),
            "Failed to read /media/books: missing"
        );
    }
}
