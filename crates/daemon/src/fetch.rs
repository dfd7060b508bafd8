//! Fetch client for the AirVisual nearest-city endpoint.
//!
//! One request per location per tick, keyed by coordinates and the API key.
//! Failures are classified before the retry engine decides what to do with
//! them: HTTP 429 and other transport-level trouble are retried on the same
//! exponential curve, anything else aborts the tick immediately.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use slog::{debug, warn, Logger};
use thiserror::Error;

use crate::NearestCityResponse;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("rate limited by provider (HTTP 429)")]
    RateLimited,
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("fatal request failure: {0}")]
    Fatal(String),
    #[error("retries exhausted after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

impl FetchError {
    fn is_retryable(&self) -> bool {
        matches!(self, FetchError::RateLimited | FetchError::Transient(_))
    }
}

/// Provider seam. Production uses [`AirVisualClient`]; tests substitute mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AirQualityApi: Send + Sync {
    async fn nearest_city(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<NearestCityResponse, FetchError>;
}

pub struct AirVisualClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AirVisualClient {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Fatal(format!("error building http client: {}", e)))?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }
}

#[async_trait]
impl AirQualityApi for AirVisualClient {
    async fn nearest_city(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<NearestCityResponse, FetchError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Transient(format!("error sending request: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            return Err(FetchError::Transient(format!(
                "error response from request: {}",
                status
            )));
        }

        response
            .json::<NearestCityResponse>()
            .await
            .map_err(|e| FetchError::Fatal(format!("error decoding body of request: {}", e)))
    }
}

/// Retry schedule for one tick.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts before the tick is given up
    pub max_retries: u32,
    /// Multiplier for the exponential delay, in seconds
    pub backoff_factor: f64,
}

impl RetryPolicy {
    /// Deterministic component of the delay before retrying after failed
    /// attempt `attempt` (zero-based): `backoff_factor * 2^attempt` seconds.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(self.backoff_factor * 2f64.powi(attempt as i32))
    }
}

/// Uniform jitter in [0, 1) seconds, added to every retry delay.
fn jitter() -> Duration {
    Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..1.0))
}

/// Fetch with retries per the policy. Rate-limited and transient failures
/// share the same backoff curve; fatal ones abort immediately. Once all
/// attempts are spent this returns [`FetchError::Exhausted`] without a
/// trailing sleep.
pub async fn fetch_with_retry(
    api: &dyn AirQualityApi,
    latitude: f64,
    longitude: f64,
    policy: RetryPolicy,
    logger: &Logger,
) -> Result<NearestCityResponse, FetchError> {
    for attempt in 0..policy.max_retries {
        match api.nearest_city(latitude, longitude).await {
            Ok(response) => {
                debug!(
                    logger,
                    "fetched ({}, {}) on attempt {}",
                    latitude,
                    longitude,
                    attempt + 1
                );
                return Ok(response);
            }
            Err(err) if err.is_retryable() && attempt + 1 < policy.max_retries => {
                let delay = policy.base_delay(attempt) + jitter();
                warn!(
                    logger,
                    "attempt {}/{} for ({}, {}) failed: {}; retrying in {:.2}s",
                    attempt + 1,
                    policy.max_retries,
                    latitude,
                    longitude,
                    err,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) if err.is_retryable() => {
                warn!(
                    logger,
                    "attempt {}/{} for ({}, {}) failed: {}",
                    attempt + 1,
                    policy.max_retries,
                    latitude,
                    longitude,
                    err
                );
            }
            Err(err) => return Err(err),
        }
    }

    Err(FetchError::Exhausted {
        attempts: policy.max_retries,
    })
}
