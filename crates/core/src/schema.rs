//! Canonical record schema for the `air_quality` table.
//!
//! The ingestion daemon and every export consumer build against this one
//! definition, so the shape that gets written and the shape that gets read
//! cannot drift apart.

use time::OffsetDateTime;

/// Name of the measurement table
pub const TABLE_NAME: &str = "air_quality";

/// Columns that make up a record's content identity. Two rows agreeing on
/// every one of these are duplicates, regardless of row id or station name,
/// and the dedup sweep collapses them to the lowest row id.
pub const CONTENT_COLUMNS: &[&str] = &[
    "timestamp",
    "latitude",
    "longitude",
    "city",
    "state",
    "country",
    "aqi",
    "main_pollutant",
    "pm25",
    "pm10",
    "o3",
    "no2",
    "so2",
    "co",
    "temperature",
    "humidity",
    "wind_speed",
    "wind_direction",
    "pressure",
];

/// One normalized air-quality measurement, as stored in the `air_quality`
/// table minus the auto-assigned row id.
///
/// Pollutant channels the provider omits are `None`; a missing value is never
/// encoded as a stand-in number. Timestamps are UTC and persisted as RFC 3339
/// text.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub timestamp: OffsetDateTime,
    pub latitude: f64,
    pub longitude: f64,
    pub city: String,
    pub state: String,
    pub country: String,
    /// Stable station identity, preserved across renames. The identity-update
    /// path matches on this column and never rewrites it.
    pub station_name: String,
    pub aqi: f64,
    pub main_pollutant: String,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub o3: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub co: Option<f64>,
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub pressure: f64,
}
