//! Hourly scheduler: one polling task per location, start offsets spread
//! evenly across the window.
//!
//! The timer loops only dispatch work; each location's ticks run inside that
//! location's own task, so two ticks for the same location can never overlap
//! while slow locations leave the others undisturbed.

use std::{sync::Arc, time::Duration};

use airwatch_core::{Measurement, POLL_WINDOW_SECS};
use slog::{error, info, warn, Logger};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    fetch_with_retry, normalize, AirQualityApi, Database, Location, NormalizeError, RetryPolicy,
    StoreError,
};

/// Whole-minute start offsets within the hour for `n` locations:
/// location `i` fires at `i * 60 / n` minutes past the window start.
pub fn slot_offsets(n: usize) -> Vec<u64> {
    let n = n as u64;
    (0..n).map(|i| i * 60 / n).collect()
}

pub struct Scheduler {
    api: Arc<dyn AirQualityApi>,
    db: Arc<Database>,
    policy: RetryPolicy,
    logger: Logger,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Scheduler {
    pub fn new(
        api: Arc<dyn AirQualityApi>,
        db: Arc<Database>,
        policy: RetryPolicy,
        logger: Logger,
    ) -> Self {
        Self {
            api,
            db,
            policy,
            logger,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Spawns one polling task per location and returns immediately. The
    /// schedule is fixed for the life of the process; changing the registry
    /// requires a restart.
    pub fn start(&self, locations: Vec<Location>) {
        let offsets = slot_offsets(locations.len());
        for (location, offset_min) in locations.into_iter().zip(offsets) {
            info!(
                self.logger,
                "scheduling {} at +{} minutes each hour", location.name, offset_min
            );
            let api = Arc::clone(&self.api);
            let db = Arc::clone(&self.db);
            let policy = self.policy;
            let cancel = self.cancel.clone();
            let logger = self.logger.clone();
            self.tracker.spawn(async move {
                poll_location(api, db, policy, location, offset_min, cancel, logger).await;
            });
        }
        self.tracker.close();
    }

    /// Stops dispatching new ticks and waits for in-flight ones to finish, so
    /// no record is left half-written.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.wait().await;
    }
}

async fn poll_location(
    api: Arc<dyn AirQualityApi>,
    db: Arc<Database>,
    policy: RetryPolicy,
    location: Location,
    offset_min: u64,
    cancel: CancellationToken,
    logger: Logger,
) {
    let window = Duration::from_secs(POLL_WINDOW_SECS);
    let first_tick = Instant::now() + Duration::from_secs(offset_min * 60);
    let mut ticker = interval_at(first_tick, window);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(logger, "stopping polling for {}", location.name);
                return;
            }
            _ = ticker.tick() => {}
        }

        let started = Instant::now();
        run_tick(api.as_ref(), &db, policy, &location, &logger).await;
        if started.elapsed() > window {
            warn!(
                logger,
                "tick for {} overran the hourly window, skipping missed trigger", location.name
            );
        }
    }
}

/// One fetch-normalize-store cycle for a single location. Every failure is
/// recorded and the cycle ends; nothing propagates past the tick.
pub async fn run_tick(
    api: &dyn AirQualityApi,
    db: &Database,
    policy: RetryPolicy,
    location: &Location,
    logger: &Logger,
) {
    let raw = match fetch_with_retry(
        api,
        location.latitude,
        location.longitude,
        policy,
        logger,
    )
    .await
    {
        Ok(raw) => raw,
        Err(err) => {
            error!(
                logger,
                "fetch for {} failed: {}; skipping tick", location.name, err
            );
            return;
        }
    };

    let record = match normalize(&raw) {
        Ok(record) => record,
        Err(NormalizeError::Rejected(reason)) => {
            error!(
                logger,
                "payload for {} rejected: {}; skipping tick", location.name, reason
            );
            return;
        }
    };

    if let Err(err) = store_cycle(db, location, &record).await {
        error!(
            logger,
            "store cycle for {} failed: {}; record lost", location.name, err
        );
    }
}

/// Insert, then identity check/update, then dedup sweep.
async fn store_cycle(
    db: &Database,
    location: &Location,
    record: &Measurement,
) -> Result<(), StoreError> {
    db.insert(record).await?;
    if location.is_renamed() && db.location_exists(&location.original_name).await? {
        db.update_location(
            &location.original_name,
            &location.name,
            location.latitude,
            location.longitude,
        )
        .await?;
    }
    db.dedup_sweep().await?;
    Ok(())
}

/// A single sequential ingestion pass over every location, with a short
/// courtesy gap between provider calls. This is the one-shot pipeline stage;
/// the orchestrator triggers it and the hourly scheduler never runs.
pub async fn run_once(
    api: &dyn AirQualityApi,
    db: &Database,
    policy: RetryPolicy,
    locations: &[Location],
    logger: &Logger,
) {
    for location in locations {
        run_tick(api, db, policy, location, logger).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
