use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use daemon::{
    run_tick, AirQualityApi, Database, FetchError, Location, NearestCityResponse, RetryPolicy,
};
use serde_json::json;
use slog::{o, Discard, Logger};

fn test_logger() -> Logger {
    Logger::root(Discard, o!())
}

fn sample_response() -> NearestCityResponse {
    serde_json::from_value(json!({
        "status": "success",
        "data": {
            "city": "Los Angeles",
            "state": "California",
            "country": "USA",
            "location": {
                "type": "Point",
                "coordinates": [-118.2437, 34.0522]
            },
            "current": {
                "pollution": {
                    "ts": "2026-08-01T12:00:00.000Z",
                    "aqius": 52.0,
                    "mainus": "p2",
                    "aqicn": 18.0
                },
                "weather": {
                    "tp": 24.0,
                    "pr": 1012.0,
                    "hu": 40.0,
                    "ws": 3.1,
                    "wd": 250.0
                }
            }
        }
    }))
    .unwrap()
}

fn rejected_response() -> NearestCityResponse {
    serde_json::from_value(json!({ "status": "call_limit_reached" })).unwrap()
}

/// Provider stub that rate-limits the first `fail_first` calls, then succeeds.
struct FlakyApi {
    calls: AtomicU32,
    fail_first: u32,
    response: fn() -> NearestCityResponse,
}

impl FlakyApi {
    fn new(fail_first: u32, response: fn() -> NearestCityResponse) -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail_first,
            response,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AirQualityApi for FlakyApi {
    async fn nearest_city(
        &self,
        _latitude: f64,
        _longitude: f64,
    ) -> Result<NearestCityResponse, FetchError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.fail_first {
            Err(FetchError::RateLimited)
        } else {
            Ok((self.response)())
        }
    }
}

fn los_angeles() -> Location {
    Location {
        name: String::from("Los Angeles"),
        original_name: String::from("Los Angeles"),
        latitude: 34.0522,
        longitude: -118.2437,
    }
}

// No deterministic backoff component so the test only waits out the jitter
fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        backoff_factor: 0.0,
    }
}

#[tokio::test]
async fn rate_limited_twice_then_success_stores_one_record() {
    let db = Database::in_memory(test_logger()).await.unwrap();
    let api = FlakyApi::new(2, sample_response);
    let location = los_angeles();

    run_tick(&api, &db, fast_policy(5), &location, &test_logger()).await;

    assert_eq!(api.calls(), 3);
    let rows = db.read_all().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].station_name, "Los Angeles");
    assert_eq!(rows[0].aqi, 52.0);

    // an identical follow-up tick is eliminated by the dedup sweep
    run_tick(&api, &db, fast_policy(5), &location, &test_logger()).await;
    assert_eq!(db.read_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn exhausted_retries_skip_the_tick_without_storing() {
    let db = Database::in_memory(test_logger()).await.unwrap();
    let api = FlakyApi::new(u32::MAX, sample_response);
    let location = los_angeles();

    run_tick(&api, &db, fast_policy(2), &location, &test_logger()).await;

    assert_eq!(api.calls(), 2);
    assert!(db.read_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn rejected_payload_skips_the_tick_without_storing() {
    let db = Database::in_memory(test_logger()).await.unwrap();
    let api = FlakyApi::new(0, rejected_response);
    let location = los_angeles();

    run_tick(&api, &db, fast_policy(5), &location, &test_logger()).await;

    assert_eq!(api.calls(), 1);
    assert!(db.read_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn renamed_location_rewrites_history_and_converges() {
    let db = Database::in_memory(test_logger()).await.unwrap();
    let api = FlakyApi::new(0, sample_response);
    let renamed = Location {
        name: String::from("LA Metro"),
        original_name: String::from("Los Angeles"),
        latitude: 34.0522,
        longitude: -118.2437,
    };

    run_tick(&api, &db, fast_policy(5), &renamed, &test_logger()).await;
    run_tick(&api, &db, fast_policy(5), &renamed, &test_logger()).await;

    // both ticks' rows were rewritten to the new identity and collapsed
    let rows = db.read_all().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].city, "LA Metro");
    assert_eq!(rows[0].station_name, "Los Angeles");
}
