//! Online inference: feature build, probability, classification, confidence.
//!
//! Pure against an immutable `TrainedModel`; safe to call concurrently from
//! many requests against the same artifact.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{Classification, ConfidenceTier, PredictionResult};
use crate::domain::Observation;
use crate::ml::artifact::TrainedModel;
use crate::ml::error::PipelineError;
use crate::ml::explainer;
use crate::ml::features::{canonical_feature_names, FeatureEngineer, FeatureVector, TargetWeather};
use crate::ml::ProbabilisticClassifier;

/// How many explanation factors a prediction carries
pub const TOP_FACTORS: usize = 3;

/// Raw model output before the decision procedure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Positive-class (Unhealthy) probability
    pub probability: f64,
    pub vector: FeatureVector,
}

#[derive(Debug, Clone, Default)]
pub struct Predictor {
    engineer: FeatureEngineer,
}

impl Predictor {
    pub fn new(engineer: FeatureEngineer) -> Self {
        Self { engineer }
    }

    /// Probability and feature vector for `target_date`
    pub fn predict(
        &self,
        model: &TrainedModel,
        history: &[Observation],
        weather: &TargetWeather,
        target_date: NaiveDate,
    ) -> Result<Prediction, PipelineError> {
        verify_feature_order(model)?;
        let vector = self
            .engineer
            .build(history, weather, target_date, &model.imputation)?;
        let probability = model.classifier.predict_proba(vector.values());
        Ok(Prediction {
            probability,
            vector,
        })
    }

    /// Full decision procedure: probability, thresholded classification,
    /// confidence tier, and ranked explanation. `threshold_override` lets an
    /// operator shift the recall/precision trade-off without retraining.
    pub fn predict_with_explanation(
        &self,
        model: &TrainedModel,
        history: &[Observation],
        weather: &TargetWeather,
        target_date: NaiveDate,
        location: &str,
        threshold_override: Option<f64>,
    ) -> Result<PredictionResult, PipelineError> {
        let prediction = self.predict(model, history, weather, target_date)?;
        let threshold = threshold_override.unwrap_or(model.threshold);
        let classification = classify(prediction.probability, threshold);
        let confidence = confidence_tier(
            prediction.probability,
            threshold,
            prediction.vector.low_quality,
        );
        let top_factors = explainer::explain(&prediction.vector, model, TOP_FACTORS);

        Ok(PredictionResult {
            date: target_date,
            location: location.to_string(),
            probability: prediction.probability,
            classification,
            threshold,
            confidence,
            top_factors,
        })
    }
}

/// The artifact's feature list must match the canonical order exactly;
/// anything else is a deployment inconsistency, not something to predict
/// through.
pub fn verify_feature_order(model: &TrainedModel) -> Result<(), PipelineError> {
    let canonical = canonical_feature_names();
    if model.feature_names.len() != canonical.len() {
        return Err(PipelineError::FeatureMismatch(format!(
            "model records {} features, pipeline computes {}",
            model.feature_names.len(),
            canonical.len()
        )));
    }
    for (i, (recorded, expected)) in model.feature_names.iter().zip(&canonical).enumerate() {
        if recorded != expected {
            return Err(PipelineError::FeatureMismatch(format!(
                "feature {i} is '{recorded}' in the model but '{expected}' in the pipeline"
            )));
        }
    }
    Ok(())
}

/// Unhealthy at or above the threshold: an exact tie classifies Unhealthy
pub fn classify(probability: f64, threshold: f64) -> Classification {
    if probability >= threshold {
        Classification::Unhealthy
    } else {
        Classification::Safe
    }
}

/// Confidence from distance to the threshold, downgraded one tier when the
/// vector leaned on imputation
pub fn confidence_tier(probability: f64, threshold: f64, low_quality: bool) -> ConfidenceTier {
    let tier = ConfidenceTier::from_distance((probability - threshold).abs());
    if low_quality {
        tier.downgrade()
    } else {
        tier
    }
}
