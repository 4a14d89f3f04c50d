//! AirNow API client for current PM2.5 observations.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use super::{retrying_client, AqiProvider, AqiReading};

#[derive(Clone)]
pub struct AirNowClient {
    base_url: String,
    api_key: String,
    client: ClientWithMiddleware,
}

impl AirNowClient {
    pub fn new(
        base_url: String,
        api_key: String,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self> {
        Ok(Self {
            base_url,
            api_key,
            client: retrying_client(timeout, user_agent)?,
        })
    }

    async fn fetch_current(&self, zip_code: &str) -> Result<Option<AqiReading>> {
        if self.api_key.is_empty() {
            warn!("no AirNow API key configured; skipping AQI fetch");
            return Ok(None);
        }

        let url = format!(
            "{}/aq/observation/zipCode/current/",
            self.base_url.trim_end_matches('/')
        );
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("format", "application/json"),
                ("zipCode", zip_code),
                ("distance", "25"),
                ("API_KEY", &self.api_key),
            ])
            .send()
            .await
            .context("AirNow GET failed")?;

        let status = resp.status();
        let body = resp.text().await.context("AirNow read failed")?;
        if !status.is_success() {
            anyhow::bail!("AirNow API error: HTTP {status}: {body}");
        }

        let raw: Vec<RawObservation> =
            serde_json::from_str(&body).context("AirNow JSON parse failed")?;

        // the feed reports several parameters; only the PM2.5 sub-index matters here
        let Some(pm25) = raw.into_iter().find(|o| o.parameter_name == "PM2.5") else {
            return Ok(None);
        };
        if pm25.aqi < 0 {
            return Ok(None);
        }

        let date = NaiveDate::parse_from_str(pm25.date_observed.trim(), "%Y-%m-%d")
            .with_context(|| format!("unexpected DateObserved '{}'", pm25.date_observed))?;

        Ok(Some(AqiReading {
            date,
            aqi: pm25.aqi.min(500) as u16,
            pm25: None,
        }))
    }
}

#[async_trait]
impl AqiProvider for AirNowClient {
    async fn current_aqi(&self, zip_code: &str) -> Result<Option<AqiReading>> {
        self.fetch_current(zip_code).await
    }
}

#[derive(Debug, Deserialize)]
struct RawObservation {
    #[serde(rename = "DateObserved")]
    date_observed: String,
    #[serde(rename = "ParameterName")]
    parameter_name: String,
    #[serde(rename = "AQI")]
    aqi: i64,
}
