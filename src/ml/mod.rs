//! Feature engineering, training, and inference for the AQI classifier.
//!
//! The pipeline is a deterministic transform from daily observation history
//! to a fixed-order feature vector, a probability from a trained classifier,
//! a thresholded classification with a confidence tier, and a ranked
//! natural-language explanation. Every step is pure against an immutable
//! `TrainedModel`, so concurrent predictions need no locking.

use serde::{Deserialize, Serialize};

pub mod artifact;
pub mod error;
pub mod explainer;
pub mod features;
pub mod gbdt;
pub mod logistic;
pub mod metrics;
pub mod predictor;
pub mod training;

pub use artifact::{ModelMetadata, TrainedModel};
pub use error::PipelineError;
pub use features::{FeatureEngineer, FeatureVector, ImputationBaseline, TargetWeather};
pub use predictor::Predictor;
pub use training::ModelTrainer;

/// The capability the pipeline needs from a fitted classifier: a positive-class
/// probability for a feature vector, and per-feature importance weights.
/// Any classifier satisfying this can back a `TrainedModel`.
pub trait ProbabilisticClassifier {
    /// Probability of the positive (Unhealthy) class, in [0, 1]
    fn predict_proba(&self, features: &[f64]) -> f64;

    /// Non-negative importance per feature in canonical order, summing to 1
    fn feature_importances(&self) -> Vec<f64>;

    fn kind(&self) -> &'static str;
}

/// Serializable fitted classifier state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClassifierState {
    GradientBoosted(gbdt::GradientBoostedClassifier),
    Logistic(logistic::LogisticBaseline),
}

impl ProbabilisticClassifier for ClassifierState {
    fn predict_proba(&self, features: &[f64]) -> f64 {
        match self {
            Self::GradientBoosted(m) => m.predict_proba(features),
            Self::Logistic(m) => m.predict_proba(features),
        }
    }

    fn feature_importances(&self) -> Vec<f64> {
        match self {
            Self::GradientBoosted(m) => m.feature_importances(),
            Self::Logistic(m) => m.feature_importances(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::GradientBoosted(m) => m.kind(),
            Self::Logistic(m) => m.kind(),
        }
    }
}

/// Numerically stable logistic function
pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
