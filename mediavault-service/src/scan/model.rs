//! Library and scan aggregates.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ScanStateError;

use super::identity::ScanIdentity;

/// Kind of media a library holds; selects the scanner used for it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryType {
    Book,
    Video,
    Music,
    Photo,
    Podcast,
}

impl LibraryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryType::Book => "book",
            LibraryType::Video => "video",
            LibraryType::Music => "music",
            LibraryType::Photo => "photo",
            LibraryType::Podcast => "podcast",
        }
    }
}

impl fmt::Display for LibraryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a scan run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// Requested, not started yet
    #[default]
    Pending,
    /// Jobs are queued or running
    Running,
    /// Every job finished without error
    Completed,
    /// At least one job failed, or the scan could not be started
    Failed,
    /// Cancelled by a user
    Cancelled,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
            ScanStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A media library and the locations it covers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub id: Uuid,
    pub name: String,
    pub library_type: LibraryType,
    pub owner_id: Uuid,
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

/// One scan run of a library
#[derive(Debug, Clone, Serialize)]
pub struct LibraryScan {
    pub id: Uuid,
    pub library_id: Uuid,
    pub user_id: Uuid,
    pub status: ScanStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LibraryScan {
    pub fn new(library_id: Uuid, user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            library_id,
            user_id,
            status: ScanStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn identity(&self) -> ScanIdentity {
        ScanIdentity::new(self.id, self.user_id)
    }

    /// Pending -> Running
    pub fn start(&mut self) -> Result<(), ScanStateError> {
        self.require("start", &[ScanStatus::Pending])?;
        self.status = ScanStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Running -> Completed
    pub fn complete(&mut self) -> Result<(), ScanStateError> {
        self.require("complete", &[ScanStatus::Running])?;
        self.finish(ScanStatus::Completed);
        Ok(())
    }

    /// Running -> Failed
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), ScanStateError> {
        self.require("fail", &[ScanStatus::Running])?;
        self.error = Some(message.into());
        self.finish(ScanStatus::Failed);
        Ok(())
    }

    /// Pending | Running -> Cancelled
    pub fn cancel(&mut self) -> Result<(), ScanStateError> {
        self.require("cancel", &[ScanStatus::Pending, ScanStatus::Running])?;
        self.finish(ScanStatus::Cancelled);
        Ok(())
    }

    fn require(&self, action: &'static str, allowed: &[ScanStatus]) -> Result<(), ScanStateError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(ScanStateError::InvalidTransition {
                action,
                from: self.status,
            })
        }
    }

    fn finish(&mut self, status: ScanStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}
