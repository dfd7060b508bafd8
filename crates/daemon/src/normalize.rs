//! Normalizes AirVisual nearest-city payloads into canonical measurements.
//!
//! Every interior field of the raw payload is optional so that a structurally
//! broken response surfaces as a `Rejected` value instead of a decode error.
//! Normalization is a pure function: no I/O, and the same payload always
//! yields the same record.

use airwatch_core::Measurement;
use serde::Deserialize;
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("payload rejected: {0}")]
    Rejected(String),
}

fn rejected(reason: impl Into<String>) -> NormalizeError {
    NormalizeError::Rejected(reason.into())
}

/// Top-level AirVisual response envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NearestCityResponse {
    #[serde(default)]
    pub status: String,
    pub data: Option<CityData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CityData {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub location: Option<GeoPoint>,
    pub current: Option<CurrentConditions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeoPoint {
    /// GeoJSON order: [longitude, latitude]
    #[serde(default)]
    pub coordinates: Vec<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrentConditions {
    pub pollution: Option<Pollution>,
    pub weather: Option<WeatherConditions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pollution {
    pub ts: Option<String>,
    pub aqius: Option<f64>,
    pub mainus: Option<String>,
    pub aqicn: Option<f64>,
    pub o3: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub co: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeatherConditions {
    pub tp: Option<f64>,
    pub hu: Option<f64>,
    pub ws: Option<f64>,
    pub wd: Option<f64>,
    pub pr: Option<f64>,
}

/// Map a raw payload to a [`Measurement`].
///
/// Rejects when the status is not "success" or a required field (timestamp,
/// coordinates, aqi, main pollutant, core weather readings) is missing.
/// Optional pollutant channels map to `None` when absent; naming fields fall
/// back to "Unknown".
pub fn normalize(raw: &NearestCityResponse) -> Result<Measurement, NormalizeError> {
    if raw.status != "success" {
        return Err(rejected(format!("provider status {:?}", raw.status)));
    }

    let data = raw.data.as_ref().ok_or_else(|| rejected("missing data object"))?;
    let current = data
        .current
        .as_ref()
        .ok_or_else(|| rejected("missing current conditions"))?;
    let pollution = current
        .pollution
        .as_ref()
        .ok_or_else(|| rejected("missing pollution block"))?;
    let weather = current
        .weather
        .as_ref()
        .ok_or_else(|| rejected("missing weather block"))?;

    let coordinates = data
        .location
        .as_ref()
        .map(|point| point.coordinates.as_slice())
        .filter(|coords| coords.len() == 2)
        .ok_or_else(|| rejected("missing location coordinates"))?;

    let ts = pollution
        .ts
        .as_deref()
        .ok_or_else(|| rejected("missing timestamp"))?;
    let timestamp = OffsetDateTime::parse(ts, &Rfc3339)
        .map_err(|e| rejected(format!("unparsable timestamp {:?}: {}", ts, e)))?;

    let aqi = pollution.aqius.ok_or_else(|| rejected("missing aqi"))?;
    let main_pollutant = pollution
        .mainus
        .clone()
        .ok_or_else(|| rejected("missing main pollutant"))?;

    let temperature = weather.tp.ok_or_else(|| rejected("missing temperature"))?;
    let humidity = weather.hu.ok_or_else(|| rejected("missing humidity"))?;
    let wind_speed = weather.ws.ok_or_else(|| rejected("missing wind speed"))?;
    let wind_direction = weather.wd.ok_or_else(|| rejected("missing wind direction"))?;
    let pressure = weather.pr.ok_or_else(|| rejected("missing pressure"))?;

    let city = data
        .city
        .clone()
        .unwrap_or_else(|| String::from("Unknown"));

    Ok(Measurement {
        timestamp,
        latitude: coordinates[1],
        longitude: coordinates[0],
        station_name: city.clone(),
        city,
        state: data
            .state
            .clone()
            .unwrap_or_else(|| String::from("Unknown")),
        country: data
            .country
            .clone()
            .unwrap_or_else(|| String::from("Unknown")),
        aqi,
        main_pollutant,
        // AirVisual's free tier reports AQI values on the pm channels rather
        // than raw concentrations
        pm25: pollution.aqicn,
        pm10: pollution.aqius,
        o3: pollution.o3,
        no2: pollution.no2,
        so2: pollution.so2,
        co: pollution.co,
        temperature,
        humidity,
        wind_speed,
        wind_direction,
        pressure,
    })
}
