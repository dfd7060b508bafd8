//! Tabular export for downstream pipeline stages.
//!
//! The cleaning and feature stages consume the store through this one flat
//! parquet file: one row per record, column order matching the table.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use airwatch_core::{fs::create_dir_all, Measurement, TABLE_NAME};
use anyhow::{anyhow, Error};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::record::RecordWriter;
use parquet::{
    basic::{LogicalType, Repetition, Type as PhysicalType},
    schema::types::Type,
};
use parquet_derive::ParquetRecordWriter;
use slog::{info, Logger};
use time::format_description::well_known::Rfc3339;

#[derive(Debug, ParquetRecordWriter)]
pub struct AirQualityRow {
    pub timestamp: String,
    pub latitude: f64,
    pub longitude: f64,
    pub city: String,
    pub state: String,
    pub country: String,
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

impl TryFrom<&Measurement> for AirQualityRow {
    type Error = anyhow::Error;
    fn try_from(val: &Measurement) -> Result<Self, Self::Error> {
        Ok(AirQualityRow {
            timestamp: val
                .timestamp
                .format(&Rfc3339)
                .map_err(|e| anyhow!("error formatting timestamp: {}", e))?,
            latitude: val.latitude,
            longitude: val.longitude,
            city: val.city.clone(),
            state: val.state.clone(),
            country: val.country.clone(),
            station_name: val.station_name.clone(),
            aqi: val.aqi,
            main_pollutant: val.main_pollutant.clone(),
            pm25: val.pm25,
            pm10: val.pm10,
            o3: val.o3,
            no2: val.no2,
            so2: val.so2,
            co: val.co,
            temperature: val.temperature,
            humidity: val.humidity,
            wind_speed: val.wind_speed,
            wind_direction: val.wind_direction,
            pressure: val.pressure,
        })
    }
}

fn required_string(name: &str) -> Type {
    Type::primitive_type_builder(name, PhysicalType::BYTE_ARRAY)
        .with_repetition(Repetition::REQUIRED)
        .with_logical_type(Some(LogicalType::String))
        .build()
        .unwrap()
}

fn required_double(name: &str) -> Type {
    Type::primitive_type_builder(name, PhysicalType::DOUBLE)
        .with_repetition(Repetition::REQUIRED)
        .build()
        .unwrap()
}

fn optional_double(name: &str) -> Type {
    Type::primitive_type_builder(name, PhysicalType::DOUBLE)
        .with_repetition(Repetition::OPTIONAL)
        .build()
        .unwrap()
}

pub fn create_air_quality_schema() -> Type {
    let fields = vec![
        required_string("timestamp"),
        required_double("latitude"),
        required_double("longitude"),
        required_string("city"),
        required_string("state"),
        required_string("country"),
        required_string("station_name"),
        required_double("aqi"),
        required_string("main_pollutant"),
        optional_double("pm25"),
        optional_double("pm10"),
        optional_double("o3"),
        optional_double("no2"),
        optional_double("so2"),
        optional_double("co"),
        required_double("temperature"),
        required_double("humidity"),
        required_double("wind_speed"),
        required_double("wind_direction"),
        required_double("pressure"),
    ];

    Type::group_type_builder(TABLE_NAME)
        .with_fields(fields.into_iter().map(Arc::new).collect())
        .build()
        .unwrap()
}

/// Writes the records as a single parquet file with one row group.
/// Returns the path written.
pub fn save_records(
    records: &[Measurement],
    output_path: &str,
    logger: &Logger,
) -> Result<String, Error> {
    if let Some(parent) = Path::new(output_path).parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(&parent.to_string_lossy())
                .map_err(|e| anyhow!("failed to create export directory: {}", e))?;
        }
    }

    let rows: Vec<AirQualityRow> = records
        .iter()
        .map(AirQualityRow::try_from)
        .collect::<Result<_, _>>()?;

    let file = File::create(output_path)
        .map_err(|e| anyhow!("failed to create parquet file: {}", e))?;
    let props = WriterProperties::builder().build();
    let mut writer =
        SerializedFileWriter::new(file, Arc::new(create_air_quality_schema()), Arc::new(props))
            .map_err(|e| anyhow!("failed to create parquet writer: {}", e))?;

    info!(
        logger,
        "writing {} records to {}",
        rows.len(),
        output_path
    );
    let mut row_group = writer
        .next_row_group()
        .map_err(|e| anyhow!("failed to create row group: {}", e))?;
    rows.as_slice()
        .write_to_row_group(&mut row_group)
        .map_err(|e| anyhow!("failed to write records: {}", e))?;
    row_group
        .close()
        .map_err(|e| anyhow!("failed to close row group: {}", e))?;
    writer
        .close()
        .map_err(|e| anyhow!("failed to close parquet writer: {}", e))?;

    info!(logger, "done writing records to {}", output_path);
    Ok(output_path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn row_conversion_formats_timestamp_and_keeps_missing_pollutants() {
        let record = Measurement {
            timestamp: datetime!(2026-08-01 12:00:00 UTC),
            latitude: 34.0522,
            longitude: -118.2437,
            city: String::from("Los Angeles"),
            state: String::from("California"),
            country: String::from("USA"),
            station_name: String::from("Los Angeles"),
            aqi: 52.0,
            main_pollutant: String::from("p2"),
            pm25: Some(18.0),
            pm10: Some(52.0),
            o3: None,
            no2: None,
            so2: None,
            co: None,
            temperature: 24.0,
            humidity: 40.0,
            wind_speed: 3.1,
            wind_direction: 250.0,
            pressure: 1012.0,
        };

        let row = AirQualityRow::try_from(&record).unwrap();
        assert_eq!(row.timestamp, "2026-08-01T12:00:00Z");
        assert_eq!(row.o3, None);
        assert_eq!(row.aqi, 52.0);
    }

    #[test]
    fn schema_matches_the_table_column_count() {
        let schema = create_air_quality_schema();
        assert_eq!(schema.get_fields().len(), 20);
    }
}
