use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::net::SocketAddr;

use crate::ml::features::{FeatureConfig, HolidayCalendar};
use crate::ml::training::TrainingConfig;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub enable_cors: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enable_cors: true,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Directory holding the trained artifact pair (classifier.bin + manifest.json).
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,
    /// Operator override for the decision threshold; shifts the recall/precision
    /// trade-off without retraining. Unset means the artifact's own threshold.
    #[serde(default)]
    pub threshold_override: Option<f64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
            threshold_override: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// How many extra days back forward-fill may reach for a missing AQI lag.
    #[serde(default = "default_lookback_days")]
    pub forward_fill_lookback_days: u32,
    /// Wind speed below which the air is considered stagnant (mph).
    #[serde(default = "default_stagnation_wind")]
    pub stagnation_wind_mph: f64,
    /// Trailing days of history handed to the feature builder.
    #[serde(default = "default_min_history_days")]
    pub min_history_days: usize,
    /// Fixed holiday calendar as (month, day) pairs.
    #[serde(default = "default_holidays")]
    pub holidays: Vec<(u32, u32)>,
}

impl PipelineConfig {
    pub fn feature_config(&self) -> FeatureConfig {
        FeatureConfig {
            forward_fill_lookback_days: self.forward_fill_lookback_days,
            stagnation_wind_mph: self.stagnation_wind_mph,
        }
    }

    pub fn holiday_calendar(&self) -> HolidayCalendar {
        HolidayCalendar::new(self.holidays.clone())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            forward_fill_lookback_days: default_lookback_days(),
            stagnation_wind_mph: default_stagnation_wind(),
            min_history_days: default_min_history_days(),
            holidays: default_holidays(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    #[serde(default = "default_airnow_base_url")]
    pub airnow_base_url: String,
    #[serde(default)]
    pub airnow_api_key: String,
    #[serde(default = "default_nws_base_url")]
    pub nws_base_url: String,
    #[serde(default = "default_nws_user_agent")]
    pub nws_user_agent: String,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "default_refresh_minutes")]
    pub refresh_minutes: u64,
    #[serde(default = "default_zip")]
    pub default_zip: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            airnow_base_url: default_airnow_base_url(),
            airnow_api_key: String::new(),
            nws_base_url: default_nws_base_url(),
            nws_user_agent: default_nws_user_agent(),
            http_timeout_seconds: default_http_timeout(),
            cache_ttl_seconds: default_cache_ttl(),
            refresh_minutes: default_refresh_minutes(),
            default_zip: default_zip(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("AIRWATCH__").split("__"));
        Ok(figment.extract()?)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_true() -> bool {
    true
}
fn default_request_timeout() -> u64 {
    30
}
fn default_artifact_dir() -> String {
    "artifacts".to_string()
}
fn default_lookback_days() -> u32 {
    2
}
fn default_stagnation_wind() -> f64 {
    5.0
}
fn default_min_history_days() -> usize {
    8
}
fn default_holidays() -> Vec<(u32, u32)> {
    // New Year's Day, Independence Day, Christmas
    vec![(1, 1), (7, 4), (12, 25)]
}
fn default_airnow_base_url() -> String {
    "https://www.airnowapi.org".to_string()
}
fn default_nws_base_url() -> String {
    "https://api.weather.gov".to_string()
}
fn default_nws_user_agent() -> String {
    "airwatch/0.1 (contact@example.com)".to_string()
}
fn default_http_timeout() -> u64 {
    10
}
fn default_cache_ttl() -> u64 {
    3600
}
fn default_refresh_minutes() -> u64 {
    60
}
fn default_zip() -> String {
    // New Brunswick, NJ
    "08901".to_string()
}
