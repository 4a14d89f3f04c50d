//! Clients for the upstream air-quality and weather services.
//!
//! These are the pipeline's data-supply collaborators: they own their HTTP
//! retries and caching, and hand the core plain observation records and
//! target-day weather. The core itself never performs I/O.

pub mod airnow;
pub mod nws;

pub use airnow::AirNowClient;
pub use nws::NwsClient;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::ml::features::TargetWeather;

/// One current PM2.5 AQI reading from a monitor network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AqiReading {
    pub date: NaiveDate,
    pub aqi: u16,
    pub pm25: Option<f64>,
}

/// Supplies the current PM2.5 AQI observation for a location
#[async_trait]
pub trait AqiProvider: Send + Sync {
    async fn current_aqi(&self, zip_code: &str) -> Result<Option<AqiReading>>;
}

/// Supplies the weather forecast for the target (next) day
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    async fn target_day_weather(&self, latitude: f64, longitude: f64) -> Result<TargetWeather>;
}

/// Shared HTTP client with timeout, user agent, and exponential-backoff
/// retries on transient failures
pub(crate) fn retrying_client(timeout: Duration, user_agent: &str) -> Result<ClientWithMiddleware> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()?;
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
    Ok(ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build())
}

/// New Jersey ZIP codes with monitor coverage
static NJ_ZIP_COORDS: Lazy<HashMap<&'static str, (f64, f64)>> = Lazy::new(|| {
    HashMap::from([
        ("08901", (40.4862, -74.4518)), // New Brunswick
        ("07960", (40.7968, -74.4821)), // Morristown
        ("08540", (40.3573, -74.6672)), // Princeton
        ("07302", (40.7178, -74.0431)), // Jersey City
        ("08002", (39.8654, -75.0357)), // Cherry Hill
    ])
});

/// Coordinates for a NJ ZIP, defaulting to the state centroid
pub fn coordinates_for_zip(zip_code: &str) -> (f64, f64) {
    NJ_ZIP_COORDS
        .get(zip_code)
        .copied()
        .unwrap_or((40.0583, -74.4057))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_zip_resolves() {
        let (lat, lon) = coordinates_for_zip("08901");
        assert!((lat - 40.4862).abs() < 1e-9);
        assert!((lon + 74.4518).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_zip_falls_back_to_centroid() {
        let (lat, lon) = coordinates_for_zip("00000");
        assert!((lat - 40.0583).abs() < 1e-9);
        assert!((lon + 74.4057).abs() < 1e-9);
    }
}
