pub mod error;
pub mod health;
pub mod model;
pub mod predict;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::collector::{
    coordinates_for_zip, AirNowClient, AqiProvider, ForecastProvider, NwsClient,
};
use crate::config::Config;
use crate::domain::{Observation, ObservationStore, PredictionResult};
use crate::ml::features::{FeatureEngineer, ImputationBaseline, TargetWeather};
use crate::ml::{artifact, Predictor, TrainedModel};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    /// Current model; swapped wholesale on reload, never mutated in place
    model: Arc<RwLock<Option<Arc<TrainedModel>>>>,
    pub store: Arc<RwLock<ObservationStore>>,
    pub predictor: Arc<Predictor>,
    pub aqi: Arc<dyn AqiProvider>,
    pub forecast: Arc<dyn ForecastProvider>,
    /// One prediction per (location, target date) per day
    cache: Arc<Mutex<HashMap<(String, NaiveDate), PredictionResult>>>,
}

impl AppState {
    pub fn new(cfg: Config) -> Result<Self> {
        let model = match artifact::try_load(Path::new(&cfg.model.artifact_dir))? {
            Some(m) => {
                info!(model_id = %m.metadata.model_id, threshold = m.threshold, "loaded model artifact");
                Some(Arc::new(m))
            }
            None => {
                warn!(
                    dir = %cfg.model.artifact_dir,
                    "no model artifact found; predictions unavailable until one is trained and loaded"
                );
                None
            }
        };

        let engineer = FeatureEngineer::new(
            cfg.pipeline.feature_config(),
            cfg.pipeline.holiday_calendar(),
        );
        let timeout = Duration::from_secs(cfg.collector.http_timeout_seconds);
        let aqi = AirNowClient::new(
            cfg.collector.airnow_base_url.clone(),
            cfg.collector.airnow_api_key.clone(),
            timeout,
            &cfg.collector.nws_user_agent,
        )?;
        let forecast = NwsClient::new(
            cfg.collector.nws_base_url.clone(),
            timeout,
            Duration::from_secs(cfg.collector.cache_ttl_seconds),
            &cfg.collector.nws_user_agent,
        )?;

        Ok(Self {
            cfg,
            model: Arc::new(RwLock::new(model)),
            store: Arc::new(RwLock::new(ObservationStore::new())),
            predictor: Arc::new(Predictor::new(engineer)),
            aqi: Arc::new(aqi),
            forecast: Arc::new(forecast),
            cache: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn current_model(&self) -> Option<Arc<TrainedModel>> {
        self.model.read().clone()
    }

    /// Atomic wholesale swap; in-flight requests keep the model they started
    /// with. Cached predictions from the old model are dropped.
    pub fn swap_model(&self, model: TrainedModel) {
        *self.model.write() = Some(Arc::new(model));
        self.cache.lock().clear();
    }

    pub fn cached_prediction(&self, key: &(String, NaiveDate)) -> Option<PredictionResult> {
        self.cache.lock().get(key).cloned()
    }

    pub fn cache_prediction(&self, key: (String, NaiveDate), result: PredictionResult) {
        self.cache.lock().insert(key, result);
    }
}

pub fn router(state: AppState, cfg: &Config) -> Router {
    let api = Router::new()
        .route("/health", get(health::health_check))
        .route("/predict", get(predict::predict_get).post(predict::predict_post))
        .route("/model", get(model::model_info))
        .route("/model/reload", post(model::reload_model))
        .with_state(state);

    let mut router = Router::new().nest("/api", api);

    if cfg.server.enable_cors {
        use tower_http::cors::{Any, CorsLayer};
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router = router.layer(cors);
    }

    router
        .layer(
            ServiceBuilder::new().layer(TimeoutLayer::new(Duration::from_secs(
                cfg.server.request_timeout_secs,
            ))),
        )
        .layer(TraceLayer::new_for_http())
}

/// Periodically pull the current AQI reading into the observation store so
/// tomorrow's prediction has today's lag available.
pub fn spawn_collector_tasks(state: AppState, cfg: Config) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(
            cfg.collector.refresh_minutes.max(1) * 60,
        ));
        loop {
            interval.tick().await;
            if let Err(e) = refresh_observations(&state).await {
                warn!(error = %e, "observation refresh failed");
            }
        }
    });
}

pub async fn refresh_observations(state: &AppState) -> Result<()> {
    let zip = state.cfg.collector.default_zip.clone();
    let Some(reading) = state.aqi.current_aqi(&zip).await? else {
        info!(%zip, "no current AQI reading available");
        return Ok(());
    };

    let (lat, lon) = coordinates_for_zip(&zip);
    let weather = match state.forecast.target_day_weather(lat, lon).await {
        Ok(w) => w,
        Err(e) => {
            warn!(error = %e, "weather fetch failed; recording reading with fallback weather");
            TargetWeather::default()
        }
    };

    let fallback = ImputationBaseline::default();
    let obs = Observation {
        date: reading.date,
        location_id: zip.clone(),
        pm25: reading.pm25,
        aqi: Some(reading.aqi),
        temp_max: weather.temp_max.unwrap_or(fallback.temp_max),
        wind_avg: weather.wind_avg.unwrap_or(fallback.wind_avg),
        precip: weather.precip.unwrap_or(fallback.precip),
        rh_avg: weather.rh_avg.unwrap_or(fallback.rh_avg),
    };
    if let Err(reason) = obs.validate() {
        warn!(%reason, "discarding invalid observation");
        return Ok(());
    }

    state.store.write().record(obs);
    info!(%zip, date = %reading.date, aqi = reading.aqi, "recorded observation");
    Ok(())
}
