//! Service configuration.
//!
//! Settings are read once at startup from an optional `config.toml` and from
//! `MEDIAVAULT__*` environment variables. Libraries are declared here as well,
//! since the scan pipeline has no persistence layer of its own.

mod loader;
mod static_config;

pub use loader::load_config;
pub use static_config::{ScanningConfig, ServiceConfig};
