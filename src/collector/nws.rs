//! National Weather Service forecast client.
//!
//! Two-step fetch: the points endpoint resolves a coordinate to its forecast
//! URL, then the forecast's "tomorrow" period is parsed into the target-day
//! weather. Fields the feed does not carry stay `None` and flow into the
//! pipeline's imputation policy.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::{retrying_client, ForecastProvider};
use crate::ml::features::TargetWeather;

#[derive(Clone)]
pub struct NwsClient {
    base_url: String,
    client: ClientWithMiddleware,
    cache: Arc<RwLock<Option<(DateTime<Utc>, (f64, f64), TargetWeather)>>>,
    ttl: Duration,
}

impl NwsClient {
    pub fn new(base_url: String, timeout: Duration, ttl: Duration, user_agent: &str) -> Result<Self> {
        Ok(Self {
            base_url,
            client: retrying_client(timeout, user_agent)?,
            cache: Arc::new(RwLock::new(None)),
            ttl,
        })
    }

    async fn fetch_forecast(&self, latitude: f64, longitude: f64) -> Result<TargetWeather> {
        let points_url = format!(
            "{}/points/{},{}",
            self.base_url.trim_end_matches('/'),
            latitude,
            longitude
        );
        let points: PointsResponse = self
            .client
            .get(&points_url)
            .send()
            .await
            .context("NWS points GET failed")?
            .error_for_status()
            .context("NWS points API error")?
            .json()
            .await
            .context("NWS points JSON parse failed")?;

        let forecast: ForecastResponse = self
            .client
            .get(&points.properties.forecast)
            .send()
            .await
            .context("NWS forecast GET failed")?
            .error_for_status()
            .context("NWS forecast API error")?
            .json()
            .await
            .context("NWS forecast JSON parse failed")?;

        let periods = &forecast.properties.periods;
        let period = periods
            .iter()
            .take(4)
            .find(|p| p.name.to_lowercase().contains("tomorrow"))
            .or_else(|| periods.get(1))
            .context("NWS forecast has no usable periods")?;

        Ok(parse_period(period))
    }
}

#[async_trait]
impl ForecastProvider for NwsClient {
    async fn target_day_weather(&self, latitude: f64, longitude: f64) -> Result<TargetWeather> {
        {
            let cached = self.cache.read().await;
            if let Some((at, coords, weather)) = &*cached {
                if *coords == (latitude, longitude)
                    && (Utc::now() - *at).num_seconds() < self.ttl.as_secs() as i64
                {
                    return Ok(weather.clone());
                }
            }
        }

        let weather = self.fetch_forecast(latitude, longitude).await?;

        let mut cached = self.cache.write().await;
        *cached = Some((Utc::now(), (latitude, longitude), weather.clone()));
        Ok(weather)
    }
}

fn parse_period(period: &Period) -> TargetWeather {
    let precip_prob = period
        .probability_of_precipitation
        .as_ref()
        .and_then(|p| p.value)
        .unwrap_or(0.0);

    TargetWeather {
        temp_max: period.temperature,
        wind_avg: period.wind_speed.as_deref().and_then(parse_wind_speed),
        // the daily feed gives a probability, not an amount; treat a likely
        // rain day as measurable precipitation
        precip: Some(if precip_prob > 50.0 { 0.1 } else { 0.0 }),
        rh_avg: period.relative_humidity.as_ref().and_then(|p| p.value),
    }
}

/// Parse NWS wind strings like "8 mph" or "10 to 15 mph" (range averages)
fn parse_wind_speed(raw: &str) -> Option<f64> {
    let cleaned = raw.to_lowercase().replace("mph", "");
    let parts: Vec<&str> = cleaned.split("to").map(str::trim).collect();
    match parts.as_slice() {
        [single] => single.parse().ok(),
        [low, high] => {
            let low: f64 = low.parse().ok()?;
            let high: f64 = high.parse().ok()?;
            Some((low + high) / 2.0)
        }
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct PointsResponse {
    properties: PointsProperties,
}

#[derive(Debug, Deserialize)]
struct PointsProperties {
    forecast: String,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    properties: ForecastProperties,
}

#[derive(Debug, Deserialize)]
struct ForecastProperties {
    periods: Vec<Period>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Period {
    #[serde(default)]
    name: String,
    temperature: Option<f64>,
    wind_speed: Option<String>,
    probability_of_precipitation: Option<UnitValue>,
    relative_humidity: Option<UnitValue>,
}

#[derive(Debug, Deserialize)]
struct UnitValue {
    value: Option<f64>,
}
