use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use validator::Validate;

use crate::api::error::ApiError;
use crate::api::AppState;
use crate::collector::coordinates_for_zip;
use crate::domain::{Classification, ConfidenceTier, PredictionResult};
use crate::ml::features::TargetWeather;

#[derive(Debug, Deserialize, Validate)]
pub struct PredictQuery {
    #[validate(length(min = 5, max = 5))]
    pub zip_code: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PredictRequest {
    #[validate(length(min = 5, max = 5))]
    pub zip_code: Option<String>,
}

/// Wire shape of a prediction; field naming is this layer's concern, not the
/// pipeline's.
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub date: NaiveDate,
    pub location: String,
    pub prob_unhealthy: f64,
    pub classification: Classification,
    pub threshold: f64,
    pub confidence: ConfidenceTier,
    pub aqi_category: String,
    pub top_factors: Vec<String>,
}

impl From<PredictionResult> for PredictResponse {
    fn from(r: PredictionResult) -> Self {
        let aqi_category = match r.classification {
            Classification::Unhealthy => {
                "Unhealthy for Sensitive Groups or worse (AQI \u{2265} 101)".to_string()
            }
            Classification::Safe => "Good to Moderate (AQI \u{2264} 100)".to_string(),
        };
        Self {
            date: r.date,
            location: r.location,
            prob_unhealthy: (r.probability * 1000.0).round() / 1000.0,
            classification: r.classification,
            threshold: r.threshold,
            confidence: r.confidence,
            aqi_category,
            top_factors: r.top_factors,
        }
    }
}

/// GET /api/predict?zip_code=08901
pub async fn predict_get(
    State(state): State<AppState>,
    Query(query): Query<PredictQuery>,
) -> Result<Json<PredictResponse>, ApiError> {
    query.validate()?;
    run_prediction(&state, query.zip_code).await.map(Json)
}

/// POST /api/predict
pub async fn predict_post(
    State(state): State<AppState>,
    body: Option<Json<PredictRequest>>,
) -> Result<Json<PredictResponse>, ApiError> {
    let zip_code = match body {
        Some(Json(request)) => {
            request.validate()?;
            request.zip_code
        }
        None => None,
    };
    run_prediction(&state, zip_code).await.map(Json)
}

async fn run_prediction(
    state: &AppState,
    zip_code: Option<String>,
) -> Result<PredictResponse, ApiError> {
    let zip = zip_code.unwrap_or_else(|| state.cfg.collector.default_zip.clone());
    let target_date = Utc::now()
        .date_naive()
        .succ_opt()
        .ok_or_else(|| ApiError::InternalError("date overflow".to_string()))?;

    let cache_key = (zip.clone(), target_date);
    if let Some(hit) = state.cached_prediction(&cache_key) {
        return Ok(hit.into());
    }

    let model = state.current_model().ok_or_else(|| {
        ApiError::ServiceUnavailable("no model loaded; train and reload first".to_string())
    })?;

    let history = state
        .store
        .read()
        .history(&zip, target_date, state.cfg.pipeline.min_history_days);

    let (lat, lon) = coordinates_for_zip(&zip);
    let weather = match state.forecast.target_day_weather(lat, lon).await {
        Ok(w) => w,
        Err(e) => {
            // missing forecast fields are a designed degradation: imputation
            // fills them and the confidence tier reflects it
            warn!(error = %e, "weather forecast unavailable; predicting with imputed weather");
            TargetWeather::default()
        }
    };

    let result = state.predictor.predict_with_explanation(
        &model,
        &history,
        &weather,
        target_date,
        &zip,
        state.cfg.model.threshold_override,
    )?;

    state.cache_prediction(cache_key, result.clone());
    Ok(result.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_rounds_probability_and_categorizes() {
        let result = PredictionResult {
            date: NaiveDate::from_ymd_opt(2024, 7, 9).unwrap(),
            location: "08901".to_string(),
            probability: 0.371_456,
            classification: Classification::Safe,
            threshold: 0.40,
            confidence: ConfidenceTier::Low,
            top_factors: vec!["Yesterday's AQI was moderate (45)".to_string()],
        };
        let response = PredictResponse::from(result);
        assert_eq!(response.prob_unhealthy, 0.371);
        assert!(response.aqi_category.contains("Good to Moderate"));

        let result = PredictionResult {
            date: NaiveDate::from_ymd_opt(2024, 7, 9).unwrap(),
            location: "08901".to_string(),
            probability: 0.81,
            classification: Classification::Unhealthy,
            threshold: 0.40,
            confidence: ConfidenceTier::High,
            top_factors: vec![],
        };
        let response = PredictResponse::from(result);
        assert!(response.aqi_category.contains("Unhealthy"));
    }

    #[test]
    fn test_query_validation_rejects_short_zip() {
        let query = PredictQuery {
            zip_code: Some("089".to_string()),
        };
        assert!(query.validate().is_err());

        let query = PredictQuery {
            zip_code: Some("08901".to_string()),
        };
        assert!(query.validate().is_ok());

        let query = PredictQuery { zip_code: None };
        assert!(query.validate().is_ok());
    }
}
