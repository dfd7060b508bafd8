//! Airwatch Core Library
//!
//! Shared utilities for the ingestion daemon and export consumers:
//! - Configuration loading (XDG-compliant)
//! - File system utilities
//! - The canonical air-quality record schema

mod config;
pub mod fs;
mod schema;

pub use config::{find_config_file, get_xdg_data_dir, load_config, ConfigSource};
pub use schema::{Measurement, CONTENT_COLUMNS, TABLE_NAME};

/// Application name used for XDG paths
pub const APP_NAME: &str = "airwatch";

/// Length of the repeating scheduling window in seconds. Locations are spread
/// evenly across one hour, one fetch per location per window.
pub const POLL_WINDOW_SECS: u64 = 3600;

/// Default maximum number of fetch attempts per tick
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default multiplier for the exponential retry delay, in seconds
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.0;

/// Default per-request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT: u64 = 20;
