//! AMRDC Data Warehouse Core Library
//!
//! Shared utilities for the api and daemon services:
//! - Configuration loading (XDG-compliant)
//! - File system utilities
//! - The observation domain shared by the ingest and query paths

mod config;
pub mod fs;
mod observation;

pub use config::{find_config_file, load_config, ConfigSource};
pub use fs::create_dir_all;
pub use observation::{InvalidVariable, Variable, MISSING_SENTINEL, OBSERVATION_TABLE};

/// Application name used for XDG paths
pub const APP_NAME: &str = "amrdc-warehouse";

/// Default api port
pub const DEFAULT_API_PORT: u16 = 9200;

/// Default daemon ingest interval (24 hours; the upstream repository
/// republishes quality-controlled files daily at most)
pub const DEFAULT_INGEST_INTERVAL: u64 = 86_400;
