//! Offline training pipeline for the AQI classifier.
//!
//! Assembles labeled feature vectors from observation history, fits the
//! boosted model and the logistic baseline on a chronological split, keeps
//! whichever validates better, and selects the operating threshold on the
//! validation split.

use chrono::NaiveDate;
use itertools::Itertools;
use ordered_float::OrderedFloat;
use rand::distributions::{Bernoulli, Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Exp, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, info, warn};

use crate::domain::Observation;
use crate::ml::artifact::{ModelMetadata, TrainedModel};
use crate::ml::error::PipelineError;
use crate::ml::features::{
    canonical_feature_names, FeatureEngineer, FeatureVector, ImputationBaseline, TargetWeather,
};
use crate::ml::gbdt::{GbdtParams, GradientBoostedClassifier};
use crate::ml::logistic::{LogisticBaseline, LogisticParams};
use crate::ml::metrics::{self, precision_recall_at};
use crate::ml::{ClassifierState, ProbabilisticClassifier};

/// A day is labeled Unhealthy iff its realized PM2.5 AQI reaches this value.
/// Fixed by the AQI scale ("Unhealthy for Sensitive Groups" starts at 101),
/// not tuned.
pub const AQI_UNHEALTHY_CUTOFF: u16 = 101;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Fraction of the most recent dates held out for validation
    #[serde(default = "default_validation_split")]
    pub validation_split: f64,
    /// Threshold sweep keeps only candidates with at least this precision
    #[serde(default = "default_precision_floor")]
    pub precision_floor: f64,
    /// Minimum usable labeled samples for a training run
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// Weight multiplier for Unhealthy samples; unset means the neg/pos
    /// ratio of the training split
    #[serde(default)]
    pub positive_class_weight: Option<f64>,
    #[serde(default)]
    pub gbdt: GbdtParams,
    #[serde(default)]
    pub logistic: LogisticParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            validation_split: default_validation_split(),
            precision_floor: default_precision_floor(),
            min_samples: default_min_samples(),
            positive_class_weight: None,
            gbdt: GbdtParams::default(),
            logistic: LogisticParams::default(),
        }
    }
}

fn default_validation_split() -> f64 {
    0.2
}
fn default_precision_floor() -> f64 {
    0.5
}
fn default_min_samples() -> usize {
    50
}

/// How the operating threshold was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdStrategy {
    /// Maximum recall subject to the precision floor
    RecallAtPrecisionFloor,
    /// No candidate met the floor; maximum F1 instead
    MaxF1Fallback,
}

/// One labeled training example
#[derive(Debug, Clone)]
pub struct LabeledSample {
    pub date: NaiveDate,
    pub vector: FeatureVector,
    pub unhealthy: bool,
}

/// Build labeled samples from an ascending observation history: each day with
/// a realized AQI becomes one sample, featurized from the days before it and
/// its own weather. Days without enough history are skipped.
pub fn build_training_set(
    observations: &[Observation],
    engineer: &FeatureEngineer,
    baseline: &ImputationBaseline,
) -> Vec<LabeledSample> {
    let mut samples = Vec::new();
    for (i, obs) in observations.iter().enumerate() {
        let Some(aqi) = obs.aqi else { continue };
        let weather = TargetWeather::from(obs);
        match engineer.build(&observations[..i], &weather, obs.date, baseline) {
            Ok(vector) => samples.push(LabeledSample {
                date: obs.date,
                vector,
                unhealthy: aqi >= AQI_UNHEALTHY_CUTOFF,
            }),
            Err(PipelineError::InsufficientHistory(reason)) => {
                debug!(date = %obs.date, %reason, "skipping day without enough history");
            }
            Err(other) => {
                warn!(date = %obs.date, error = %other, "skipping day");
            }
        }
    }
    samples
}

pub struct ModelTrainer {
    config: TrainingConfig,
}

impl ModelTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    /// Fit a model from labeled samples and the imputation baseline that was
    /// used to build them. The baseline is baked into the returned artifact
    /// so serving imputes with the same medians.
    pub fn fit(
        &self,
        samples: &[LabeledSample],
        baseline: ImputationBaseline,
    ) -> Result<TrainedModel, PipelineError> {
        let mut usable: Vec<LabeledSample> = samples
            .iter()
            .filter(|s| !s.vector.low_quality)
            .cloned()
            .collect();
        usable.sort_by_key(|s| s.date);

        let excluded = samples.len() - usable.len();
        if excluded > 0 {
            info!(excluded, "excluded low-quality samples from training");
        }

        if usable.len() < self.config.min_samples.max(2) {
            return Err(PipelineError::InsufficientTrainingData(format!(
                "{} usable samples, need at least {}",
                usable.len(),
                self.config.min_samples.max(2)
            )));
        }
        let positives = usable.iter().filter(|s| s.unhealthy).count();
        if positives == 0 {
            return Err(PipelineError::InsufficientTrainingData(
                "no Unhealthy examples in the labeled set".to_string(),
            ));
        }

        let (train, val) = chronological_split(&usable, self.config.validation_split);
        let train_positives = train.iter().filter(|s| s.unhealthy).count();
        if train_positives == 0 {
            return Err(PipelineError::InsufficientTrainingData(
                "no Unhealthy examples in the training split".to_string(),
            ));
        }

        let pos_weight = self.config.positive_class_weight.unwrap_or_else(|| {
            (train.len() - train_positives) as f64 / train_positives as f64
        });
        info!(
            train = train.len(),
            validation = val.len(),
            positives,
            pos_weight,
            "fitting classifiers"
        );

        let x_train: Vec<Vec<f64>> = train.iter().map(|s| s.vector.values().to_vec()).collect();
        let y_train: Vec<f64> = train
            .iter()
            .map(|s| if s.unhealthy { 1.0 } else { 0.0 })
            .collect();
        let w_train: Vec<f64> = train
            .iter()
            .map(|s| if s.unhealthy { pos_weight } else { 1.0 })
            .collect();

        let boosted =
            GradientBoostedClassifier::fit(&x_train, &y_train, &w_train, self.config.gbdt.clone())
                .map_err(|e| PipelineError::InsufficientTrainingData(e.to_string()))?;
        let logistic =
            LogisticBaseline::fit(&x_train, &y_train, &w_train, self.config.logistic.clone())
                .map_err(|e| PipelineError::InsufficientTrainingData(e.to_string()))?;

        let val_labels: Vec<bool> = val.iter().map(|s| s.unhealthy).collect();
        let boosted_probs: Vec<f64> = val
            .iter()
            .map(|s| boosted.predict_proba(s.vector.values()))
            .collect();
        let logistic_probs: Vec<f64> = val
            .iter()
            .map(|s| logistic.predict_proba(s.vector.values()))
            .collect();

        let boosted_pr_auc = metrics::pr_auc(&boosted_probs, &val_labels);
        let logistic_pr_auc = metrics::pr_auc(&logistic_probs, &val_labels);
        info!(boosted_pr_auc, logistic_pr_auc, "validation PR-AUC");

        // boosted model wins ties
        let (classifier, probs) = if logistic_pr_auc > boosted_pr_auc {
            (ClassifierState::Logistic(logistic), logistic_probs)
        } else {
            (ClassifierState::GradientBoosted(boosted), boosted_probs)
        };

        let (threshold, threshold_strategy) =
            select_threshold(&probs, &val_labels, self.config.precision_floor);
        let validation_metrics = metrics::evaluate(&probs, &val_labels, threshold);
        info!(
            kind = classifier.kind(),
            threshold,
            strategy = ?threshold_strategy,
            precision = validation_metrics.precision,
            recall = validation_metrics.recall,
            "selected model and threshold"
        );

        let importances = classifier.feature_importances();
        let metadata = ModelMetadata {
            model_id: format!("aqi_{}_{}", classifier.kind(), uuid::Uuid::new_v4()),
            kind: classifier.kind().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: chrono::Utc::now(),
            training_samples: train.len(),
            validation_samples: val.len(),
            positive_samples: positives,
            metrics: validation_metrics,
            threshold_strategy,
        };

        Ok(TrainedModel {
            classifier,
            feature_names: canonical_feature_names(),
            threshold,
            importances,
            imputation: baseline,
            metadata,
        })
    }
}

/// Split sorted samples by time: the earliest `1 - validation_split` train,
/// the most recent validate. No shuffling, so validation never leaks the
/// future into training.
pub(crate) fn chronological_split(
    sorted: &[LabeledSample],
    validation_split: f64,
) -> (&[LabeledSample], &[LabeledSample]) {
    let split_idx = ((sorted.len() as f64) * (1.0 - validation_split)).floor() as usize;
    let split_idx = split_idx.clamp(1, sorted.len() - 1);
    (&sorted[..split_idx], &sorted[split_idx..])
}

/// Sweep the deduplicated validation probabilities: keep the candidate with
/// maximum recall among those meeting the precision floor; if none does, fall
/// back to maximum F1.
pub fn select_threshold(
    probs: &[f64],
    labels: &[bool],
    precision_floor: f64,
) -> (f64, ThresholdStrategy) {
    let candidates: Vec<f64> = probs
        .iter()
        .copied()
        .map(OrderedFloat)
        .sorted()
        .dedup()
        .map(|c| c.0)
        .collect();
    if candidates.is_empty() {
        return (0.5, ThresholdStrategy::MaxF1Fallback);
    }

    let mut best: Option<(f64, f64, f64)> = None; // (recall, precision, threshold)
    for &t in &candidates {
        let (precision, recall, _) = precision_recall_at(probs, labels, t);
        if precision < precision_floor {
            continue;
        }
        let better = match best {
            None => true,
            Some((br, bp, bt)) => {
                recall > br
                    || (recall == br && (precision > bp || (precision == bp && t > bt)))
            }
        };
        if better {
            best = Some((recall, precision, t));
        }
    }
    if let Some((_, _, t)) = best {
        return (t, ThresholdStrategy::RecallAtPrecisionFloor);
    }

    warn!(
        precision_floor,
        "no threshold meets the precision floor; falling back to max F1"
    );
    let mut best_f1 = f64::NEG_INFINITY;
    let mut best_t = candidates[0];
    for &t in &candidates {
        let (_, _, f1) = precision_recall_at(probs, labels, t);
        if f1 > best_f1 || (f1 == best_f1 && t > best_t) {
            best_f1 = f1;
            best_t = t;
        }
    }
    (best_t, ThresholdStrategy::MaxF1Fallback)
}

/// Seeded synthetic daily history: a seasonal AQI sinusoid with noise and
/// occasional pollution spikes, plus weather with matching seasonality.
/// Deterministic for a given seed.
pub fn synthetic_observations(n_days: usize, seed: u64, location_id: &str) -> Vec<Observation> {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).expect("valid date");

    let aqi_noise = Normal::new(0.0, 10.0).expect("valid distribution");
    let spike_flag = Bernoulli::new(0.05).expect("valid distribution");
    let spike_size = Uniform::new(60.0, 100.0);
    let temp_noise = Normal::new(0.0, 5.0).expect("valid distribution");
    let wind_dist: Normal<f64> = Normal::new(8.0, 3.0).expect("valid distribution");
    let precip_dist = Exp::new(10.0).expect("valid distribution");
    let rh_noise = Normal::new(0.0, 10.0).expect("valid distribution");

    (0..n_days)
        .map(|d| {
            let phase = d as f64 * 2.0 * PI / 365.0;
            let seasonal = phase.sin();

            let mut aqi = 40.0 + 20.0 * seasonal + aqi_noise.sample(&mut rng);
            if spike_flag.sample(&mut rng) {
                aqi += spike_size.sample(&mut rng);
            }
            let aqi = aqi.clamp(0.0, 300.0);

            let temp_max = 50.0 + 30.0 * seasonal + temp_noise.sample(&mut rng);
            let wind_avg = wind_dist.sample(&mut rng).abs();
            let precip = precip_dist.sample(&mut rng);
            let rh_avg = (50.0 + 20.0 * seasonal + rh_noise.sample(&mut rng)).clamp(5.0, 100.0);

            Observation {
                date: start + chrono::Duration::days(d as i64),
                location_id: location_id.to_string(),
                pm25: Some(aqi / 2.0),
                aqi: Some(aqi.round() as u16),
                temp_max,
                wind_avg,
                precip,
                rh_avg,
            }
        })
        .collect()
}
