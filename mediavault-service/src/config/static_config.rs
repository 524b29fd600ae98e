//! Static configuration that cannot be changed at runtime.

use serde::Deserialize;
use std::time::Duration;

use crate::scan::{Library, LibraryType};

/// Top-level service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default)]
    pub scanning: ScanningConfig,

    /// Libraries available for scanning
    #[serde(default)]
    pub libraries: Vec<Library>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Scan pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScanningConfig {
    /// When set, starting a scan for a library type with no scanner fails
    /// instead of completing with zero jobs.
    #[serde(default)]
    pub reject_unsupported_library_types: bool,

    /// How long shutdown waits for in-flight jobs before giving up
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    #[serde(default)]
    pub extensions: ExtensionsConfig,
}

/// File extensions (without the dot) recognised per library type
#[derive(Debug, Clone, Deserialize)]
pub struct ExtensionsConfig {
    #[serde(default = "default_book_extensions")]
    pub book: Vec<String>,

    #[serde(default = "default_video_extensions")]
    pub video: Vec<String>,

    #[serde(default = "default_music_extensions")]
    pub music: Vec<String>,
}

impl ServiceConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl ScanningConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl ExtensionsConfig {
    /// Extensions for a library type, or `None` when the type has no folder scanner
    pub fn for_library_type(&self, library_type: LibraryType) -> Option<&[String]> {
        match library_type {
            LibraryType::Book => Some(&self.book),
            LibraryType::Video => Some(&self.video),
            LibraryType::Music => Some(&self.music),
            LibraryType::Photo | LibraryType::Podcast => None,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            scanning: ScanningConfig::default(),
            libraries: Vec::new(),
        }
    }
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self {
            reject_unsupported_library_types: false,
            shutdown_grace_secs: default_shutdown_grace_secs(),
            extensions: ExtensionsConfig::default(),
        }
    }
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            book: default_book_extensions(),
            video: default_video_extensions(),
            music: default_music_extensions(),
        }
    }
}

// ==================== Default Value Functions ====================

pub(crate) fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    8080
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn extension_list(extensions: &[&str]) -> Vec<String> {
    extensions.iter().map(|e| e.to_string()).collect()
}

fn default_book_extensions() -> Vec<String> {
    extension_list(&["epub", "pdf", "mobi", "azw3", "cbz", "cbr"])
}

fn default_video_extensions() -> Vec<String> {
    extension_list(&["mkv", "mp4", "avi", "mov", "m4v", "webm"])
}

fn default_music_extensions() -> Vec<String> {
    extension_list(&["flac", "mp3", "m4a", "ogg", "opus", "wav"])
}
