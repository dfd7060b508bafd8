//! Location registry: the static list of monitoring targets.
//!
//! Loaded once at process start from a TOML file of `[[locations]]` tables.
//! Locations are immutable for the life of the run; renaming a station takes
//! effect through the store's identity-update path, keyed by `original_name`.

use std::fs;

use airwatch_core::fs::path_exists;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("locations file not found: {0}")]
    Missing(String),
    #[error("failed to read locations file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse locations file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("location {name:?} has out-of-range coordinates ({latitude}, {longitude})")]
    OutOfRange {
        name: String,
        latitude: f64,
        longitude: f64,
    },
}

/// One monitoring target.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    /// Display name, free to change between runs
    pub name: String,
    /// Stable station identity used for rename tracking; equals `name` unless
    /// the registry file says otherwise
    pub original_name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    /// Whether this location carries a rename that historical rows may still
    /// need to pick up.
    pub fn is_renamed(&self) -> bool {
        self.original_name != self.name
    }
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    name: String,
    original_name: Option<String>,
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    locations: Vec<RawLocation>,
}

/// Parse and validate registry file content.
pub fn parse_locations(content: &str) -> Result<Vec<Location>, RegistryError> {
    let parsed: RegistryFile = toml::from_str(content)?;

    let mut locations = Vec::with_capacity(parsed.locations.len());
    for raw in parsed.locations {
        if !(-90.0..=90.0).contains(&raw.latitude) || !(-180.0..=180.0).contains(&raw.longitude) {
            return Err(RegistryError::OutOfRange {
                name: raw.name,
                latitude: raw.latitude,
                longitude: raw.longitude,
            });
        }
        let original_name = raw.original_name.unwrap_or_else(|| raw.name.clone());
        locations.push(Location {
            name: raw.name,
            original_name,
            latitude: raw.latitude,
            longitude: raw.longitude,
        });
    }
    Ok(locations)
}

/// Load the monitoring targets from `path`.
pub fn load_locations(path: &str) -> Result<Vec<Location>, RegistryError> {
    if !path_exists(path) {
        return Err(RegistryError::Missing(path.to_string()));
    }
    let content = fs::read_to_string(path)?;
    parse_locations(&content)
}
