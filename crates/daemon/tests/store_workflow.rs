use airwatch_core::Measurement;
use daemon::Database;
use slog::{o, Discard, Logger};
use time::{macros::datetime, OffsetDateTime};

fn test_logger() -> Logger {
    Logger::root(Discard, o!())
}

fn sample_record(station: &str, timestamp: OffsetDateTime) -> Measurement {
    Measurement {
        timestamp,
        latitude: 34.0522,
        longitude: -118.2437,
        city: String::from(station),
        state: String::from("California"),
        country: String::from("USA"),
        station_name: String::from(station),
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
    }
}

#[tokio::test]
async fn duplicate_rows_are_collapsed_by_the_sweep() {
    let db = Database::in_memory(test_logger()).await.unwrap();
    let record = sample_record("Los Angeles", datetime!(2026-08-01 12:00:00 UTC));

    db.insert(&record).await.unwrap();
    db.insert(&record).await.unwrap();
    assert_eq!(db.read_all().await.unwrap().len(), 2);

    let removed = db.dedup_sweep().await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(db.read_all().await.unwrap().len(), 1);

    // idempotent: a second sweep changes nothing
    let removed = db.dedup_sweep().await.unwrap();
    assert_eq!(removed, 0);
    assert_eq!(db.read_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn sweep_keeps_one_row_per_distinct_content_tuple() {
    let db = Database::in_memory(test_logger()).await.unwrap();
    let first = sample_record("Los Angeles", datetime!(2026-08-01 12:00:00 UTC));
    let second = sample_record("Los Angeles", datetime!(2026-08-01 13:00:00 UTC));
    let third = sample_record("Tokyo", datetime!(2026-08-01 12:00:00 UTC));

    db.insert(&first).await.unwrap();
    db.insert(&first).await.unwrap();
    db.insert(&second).await.unwrap();
    db.insert(&third).await.unwrap();

    db.dedup_sweep().await.unwrap();

    let rows = db.read_all().await.unwrap();
    assert_eq!(rows.len(), 3);
    // the lowest row id of each group survives, so insertion order holds
    assert_eq!(rows[0], first);
    assert_eq!(rows[1], second);
    assert_eq!(rows[2], third);
}

#[tokio::test]
async fn rows_differing_only_in_station_name_are_duplicates() {
    let db = Database::in_memory(test_logger()).await.unwrap();
    let record = sample_record("Los Angeles", datetime!(2026-08-01 12:00:00 UTC));
    let mut relabeled = record.clone();
    relabeled.station_name = String::from("LA Downtown");

    db.insert(&record).await.unwrap();
    db.insert(&relabeled).await.unwrap();
    db.dedup_sweep().await.unwrap();

    let rows = db.read_all().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].station_name, "Los Angeles");
}

#[tokio::test]
async fn update_location_with_no_matches_is_a_noop() {
    let db = Database::in_memory(test_logger()).await.unwrap();
    let record = sample_record("Los Angeles", datetime!(2026-08-01 12:00:00 UTC));
    db.insert(&record).await.unwrap();

    let updated = db
        .update_location("Atlantis", "New Atlantis", 0.0, 0.0)
        .await
        .unwrap();

    assert_eq!(updated, 0);
    let rows = db.read_all().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0], record);
}

#[tokio::test]
async fn update_location_rewrites_only_identity_columns() {
    let db = Database::in_memory(test_logger()).await.unwrap();
    let first = sample_record("Los Angeles", datetime!(2026-08-01 12:00:00 UTC));
    let second = sample_record("Los Angeles", datetime!(2026-08-01 13:00:00 UTC));
    let other = sample_record("Tokyo", datetime!(2026-08-01 12:00:00 UTC));

    db.insert(&first).await.unwrap();
    db.insert(&second).await.unwrap();
    db.insert(&other).await.unwrap();

    let updated = db
        .update_location("Los Angeles", "LA Metro", 34.1, -118.3)
        .await
        .unwrap();
    assert_eq!(updated, 2);

    let rows = db.read_all().await.unwrap();
    for row in rows.iter().filter(|r| r.station_name == "Los Angeles") {
        assert_eq!(row.city, "LA Metro");
        assert_eq!(row.latitude, 34.1);
        assert_eq!(row.longitude, -118.3);
        // measured values stay put
        assert_eq!(row.aqi, 52.0);
        assert_eq!(row.temperature, 24.0);
        assert_eq!(row.pm25, Some(18.0));
    }

    let tokyo: Vec<_> = rows.iter().filter(|r| r.station_name == "Tokyo").collect();
    assert_eq!(tokyo.len(), 1);
    assert_eq!(tokyo[0], &other);
}

#[tokio::test]
async fn location_exists_reflects_stored_identities() {
    let db = Database::in_memory(test_logger()).await.unwrap();
    assert!(!db.location_exists("Los Angeles").await.unwrap());

    let record = sample_record("Los Angeles", datetime!(2026-08-01 12:00:00 UTC));
    db.insert(&record).await.unwrap();

    assert!(db.location_exists("Los Angeles").await.unwrap());
    assert!(!db.location_exists("Tokyo").await.unwrap());
}
