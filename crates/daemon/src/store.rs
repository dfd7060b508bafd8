//! SQLite-backed append-only store for normalized measurements.
//!
//! All mutations funnel through a single writer task so concurrent tick
//! workers never interleave commits; reads run on the pool directly under
//! WAL isolation.

use std::{future::Future, path::Path, str::FromStr, time::Duration};

use airwatch_core::{Measurement, CONTENT_COLUMNS, TABLE_NAME};
use slog::{debug, info, Logger};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
    Row,
};
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::{
    fs::create_dir_all,
    sync::{mpsc, oneshot},
};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A row with this content already exists. Swallowed by `insert`.
    #[error("row already present")]
    Integrity,
    #[error("storage connectivity failure: {0}")]
    Connectivity(String),
    #[error("failed to format time string: {0}")]
    TimeFormat(#[from] time::error::Format),
    #[error("failed to parse time string: {0}")]
    TimeParse(#[from] time::error::Parse),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation) {
                return StoreError::Integrity;
            }
        }
        StoreError::Connectivity(err.to_string())
    }
}

type WriteOperation = std::pin::Pin<Box<dyn Future<Output = ()> + Send>>;

/// Serializes every mutation onto one task; commits happen strictly in the
/// order they were submitted even when many tick workers store concurrently.
struct DatabaseWriter {
    write_tx: mpsc::UnboundedSender<WriteOperation>,
    _handle: tokio::task::JoinHandle<()>,
}

impl DatabaseWriter {
    fn new() -> Self {
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<WriteOperation>();

        let handle = tokio::spawn(async move {
            while let Some(future) = write_rx.recv().await {
                future.await;
            }
        });

        Self {
            write_tx,
            _handle: handle,
        }
    }

    async fn execute<T, F, Fut>(&self, pool: SqlitePool, operation: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(SqlitePool) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel::<Result<T, StoreError>>();

        let write_op = Box::pin(async move {
            let result = operation(pool).await;
            let _ = result_tx.send(result);
        });

        self.write_tx
            .send(write_op)
            .map_err(|_| StoreError::Connectivity(String::from("database writer channel closed")))?;

        result_rx
            .await
            .map_err(|_| StoreError::Connectivity(String::from("failed to receive write result")))?
    }
}

pub struct Database {
    pool: SqlitePool,
    writer: DatabaseWriter,
    logger: Logger,
}

impl Database {
    pub async fn new(data_dir: &str, logger: Logger) -> Result<Self, StoreError> {
        let db_path = format!("{}/air_quality.sqlite", data_dir);

        if let Some(parent) = Path::new(&db_path).parent() {
            create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Connectivity(format!("error creating {:?}: {}", parent, e)))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))?
            .create_if_missing(true)
            .pragma("journal_mode", "WAL")
            .pragma("synchronous", "NORMAL")
            .pragma("busy_timeout", "5000")
            .pragma("temp_store", "MEMORY");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            writer: DatabaseWriter::new(),
            logger,
        };

        db.run_migrations().await?;
        info!(db.logger, "sqlite store initialized at: {}", db_path);

        Ok(db)
    }

    /// In-memory database, used by tests. A single connection keeps the
    /// `:memory:` database alive and visible to every query.
    pub async fn in_memory(logger: Logger) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            writer: DatabaseWriter::new(),
            logger,
        };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Connectivity(format!("error running migrations: {}", e)))
    }

    /// Append one measurement. A uniqueness violation at the storage level
    /// means the row is already present and is not an error.
    pub async fn insert(&self, record: &Measurement) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        let record = record.clone();

        let result = self
            .writer
            .execute(pool, move |pool| async move {
                let timestamp = record.timestamp.format(&Rfc3339)?;
                sqlx::query(
                    "INSERT INTO air_quality (
                        timestamp, latitude, longitude, city, state, country,
                        station_name, aqi, main_pollutant, pm25, pm10, o3, no2,
                        so2, co, temperature, humidity, wind_speed,
                        wind_direction, pressure
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&timestamp)
                .bind(record.latitude)
                .bind(record.longitude)
                .bind(&record.city)
                .bind(&record.state)
                .bind(&record.country)
                .bind(&record.station_name)
                .bind(record.aqi)
                .bind(&record.main_pollutant)
                .bind(record.pm25)
                .bind(record.pm10)
                .bind(record.o3)
                .bind(record.no2)
                .bind(record.so2)
                .bind(record.co)
                .bind(record.temperature)
                .bind(record.humidity)
                .bind(record.wind_speed)
                .bind(record.wind_direction)
                .bind(record.pressure)
                .execute(&pool)
                .await?;
                Ok(())
            })
            .await;

        match result {
            Err(StoreError::Integrity) => {
                debug!(self.logger, "row already present; skipping insert");
                Ok(())
            }
            other => other,
        }
    }

    /// Collapse rows sharing identical content across every column except the
    /// row id and station name, keeping the lowest id of each group. Returns
    /// the number of rows removed; idempotent.
    pub async fn dedup_sweep(&self) -> Result<u64, StoreError> {
        let pool = self.pool.clone();
        let sql = format!(
            "DELETE FROM {} WHERE id NOT IN (SELECT MIN(id) FROM {} GROUP BY {})",
            TABLE_NAME,
            TABLE_NAME,
            CONTENT_COLUMNS.join(", ")
        );

        let removed = self
            .writer
            .execute(pool, move |pool| async move {
                let result = sqlx::query(&sql).execute(&pool).await?;
                Ok(result.rows_affected())
            })
            .await?;

        if removed > 0 {
            info!(self.logger, "dedup sweep removed {} duplicate rows", removed);
        }
        Ok(removed)
    }

    /// Whether any historical row carries this station identity.
    pub async fn location_exists(&self, station_name: &str) -> Result<bool, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM air_quality WHERE station_name = ?")
                .bind(station_name)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    /// Rewrite latitude, longitude and city for every historical row whose
    /// station identity matches. Measured values are never touched; zero
    /// matching rows is a logged no-op. Returns the number of rows updated.
    pub async fn update_location(
        &self,
        station_name: &str,
        new_name: &str,
        new_latitude: f64,
        new_longitude: f64,
    ) -> Result<u64, StoreError> {
        let pool = self.pool.clone();
        let station = station_name.to_string();
        let name = new_name.to_string();

        let updated = self
            .writer
            .execute(pool, move |pool| async move {
                let result = sqlx::query(
                    "UPDATE air_quality SET latitude = ?, longitude = ?, city = ?
                     WHERE station_name = ?",
                )
                .bind(new_latitude)
                .bind(new_longitude)
                .bind(&name)
                .bind(&station)
                .execute(&pool)
                .await?;
                Ok(result.rows_affected())
            })
            .await?;

        if updated == 0 {
            info!(
                self.logger,
                "no historical rows for station {:?}; nothing to update", station_name
            );
        } else {
            info!(
                self.logger,
                "rewrote {} rows for station {:?} to {:?} ({}, {})",
                updated,
                station_name,
                new_name,
                new_latitude,
                new_longitude
            );
        }
        Ok(updated)
    }

    /// Full-table scan in insertion order, for the downstream export.
    pub async fn read_all(&self) -> Result<Vec<Measurement>, StoreError> {
        let rows = sqlx::query(
            "SELECT timestamp, latitude, longitude, city, state, country,
                    station_name, aqi, main_pollutant, pm25, pm10, o3, no2,
                    so2, co, temperature, humidity, wind_speed,
                    wind_direction, pressure
             FROM air_quality ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_measurement).collect()
    }

    /// Checkpoint WAL to the main database file before shutdown so the
    /// on-disk file is complete without the sidecar logs.
    pub async fn checkpoint(&self) {
        match sqlx::query("PRAGMA wal_checkpoint(TRUNCATE);")
            .execute(&self.pool)
            .await
        {
            Ok(_) => info!(self.logger, "WAL checkpoint completed successfully"),
            Err(e) => slog::error!(self.logger, "WAL checkpoint failed: {}", e),
        }
    }
}

fn row_to_measurement(row: SqliteRow) -> Result<Measurement, StoreError> {
    let timestamp: String = row.try_get("timestamp")?;
    Ok(Measurement {
        timestamp: OffsetDateTime::parse(&timestamp, &Rfc3339)?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        country: row.try_get("country")?,
        station_name: row.try_get("station_name")?,
        aqi: row.try_get("aqi")?,
        main_pollutant: row.try_get("main_pollutant")?,
        pm25: row.try_get("pm25")?,
        pm10: row.try_get("pm10")?,
        o3: row.try_get("o3")?,
        no2: row.try_get("no2")?,
        so2: row.try_get("so2")?,
        co: row.try_get("co")?,
        temperature: row.try_get("temperature")?,
        humidity: row.try_get("humidity")?,
        wind_speed: row.try_get("wind_speed")?,
        wind_direction: row.try_get("wind_direction")?,
        pressure: row.try_get("pressure")?,
    })
}
