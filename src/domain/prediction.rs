use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Probability distance from the threshold at or above which a prediction is
/// high confidence, and the lower bound of the medium band.
pub const HIGH_CONFIDENCE_MARGIN: f64 = 0.20;
pub const MEDIUM_CONFIDENCE_MARGIN: f64 = 0.08;

/// Next-day air quality classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
pub enum Classification {
    Safe,
    Unhealthy,
}

/// Confidence tier derived from how far the probability sits from the threshold
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    /// Tier for a distance `d = |probability - threshold|`
    pub fn from_distance(d: f64) -> Self {
        if d >= HIGH_CONFIDENCE_MARGIN {
            Self::High
        } else if d >= MEDIUM_CONFIDENCE_MARGIN {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// One tier lower; Low stays Low
    pub fn downgrade(self) -> Self {
        match self {
            Self::High => Self::Medium,
            Self::Medium => Self::Low,
            Self::Low => Self::Low,
        }
    }
}

/// Result of one prediction request. Created fresh per call, never persisted
/// by the pipeline itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Target date the forecast is for
    pub date: NaiveDate,
    pub location: String,
    /// Raw positive-class (Unhealthy) probability
    pub probability: f64,
    pub classification: Classification,
    /// Decision threshold the classification used
    pub threshold: f64,
    pub confidence: ConfidenceTier,
    /// At most three ranked natural-language factors
    pub top_factors: Vec<String>,
}
