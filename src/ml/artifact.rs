//! Trained model artifact and its on-disk persistence.
//!
//! The artifact is two co-located pieces: the fitted classifier state
//! (bincode) and a JSON manifest carrying the ordered feature-name list,
//! threshold, importances, imputation baseline, and metadata. Both pieces
//! load together or loading fails; a serving process never runs with the
//! classifier but not its feature list, or vice versa.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::ml::error::PipelineError;
use crate::ml::features::ImputationBaseline;
use crate::ml::metrics::ClassificationMetrics;
use crate::ml::training::ThresholdStrategy;
use crate::ml::ClassifierState;

pub const CLASSIFIER_FILE: &str = "classifier.bin";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const METADATA_TEXT_FILE: &str = "model_metadata.txt";

/// Descriptive metadata recorded with every training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_id: String,
    pub kind: String,
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub training_samples: usize,
    pub validation_samples: usize,
    pub positive_samples: usize,
    pub metrics: ClassificationMetrics,
    pub threshold_strategy: ThresholdStrategy,
}

/// Immutable bundle produced by a training run. Replaced wholesale on
/// retraining; a serving process swaps the whole reference, never fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub classifier: ClassifierState,
    /// Feature names in the exact order the classifier was fit with
    pub feature_names: Vec<String>,
    /// Operating probability threshold selected on the validation split
    pub threshold: f64,
    /// Per-feature importance weights, non-negative, summing to 1
    pub importances: Vec<f64>,
    /// Training-set medians for the imputation policy
    pub imputation: ImputationBaseline,
    pub metadata: ModelMetadata,
}

/// The JSON piece of the artifact: everything except the classifier state
#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    feature_names: Vec<String>,
    threshold: f64,
    importances: Vec<f64>,
    imputation: ImputationBaseline,
    metadata: ModelMetadata,
}

/// Write the artifact pair (plus a human-readable summary) into `dir`
pub fn save(model: &TrainedModel, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("creating artifact directory {}", dir.display()))?;

    let classifier_bytes =
        bincode::serialize(&model.classifier).context("serializing classifier state")?;
    fs::write(dir.join(CLASSIFIER_FILE), classifier_bytes)
        .with_context(|| format!("writing {}", CLASSIFIER_FILE))?;

    let manifest = Manifest {
        feature_names: model.feature_names.clone(),
        threshold: model.threshold,
        importances: model.importances.clone(),
        imputation: model.imputation.clone(),
        metadata: model.metadata.clone(),
    };
    let manifest_bytes =
        serde_json::to_vec_pretty(&manifest).context("serializing manifest")?;
    fs::write(dir.join(MANIFEST_FILE), manifest_bytes)
        .with_context(|| format!("writing {}", MANIFEST_FILE))?;

    fs::write(dir.join(METADATA_TEXT_FILE), metadata_text(model))
        .with_context(|| format!("writing {}", METADATA_TEXT_FILE))?;

    Ok(())
}

/// Load the artifact pair from `dir`. Any missing or unreadable piece is an
/// `ArtifactLoadError`.
pub fn load(dir: &Path) -> Result<TrainedModel, PipelineError> {
    try_load(dir)?.ok_or_else(|| {
        PipelineError::ArtifactLoadError(format!("no model artifact in {}", dir.display()))
    })
}

/// Load the artifact pair if present. `Ok(None)` when neither piece exists
/// (a fresh deployment); an error when the artifact is partial or corrupt.
pub fn try_load(dir: &Path) -> Result<Option<TrainedModel>, PipelineError> {
    let classifier_path = dir.join(CLASSIFIER_FILE);
    let manifest_path = dir.join(MANIFEST_FILE);

    match (classifier_path.exists(), manifest_path.exists()) {
        (false, false) => return Ok(None),
        (true, true) => {}
        (true, false) => {
            return Err(PipelineError::ArtifactLoadError(format!(
                "{} present but {} missing in {}",
                CLASSIFIER_FILE,
                MANIFEST_FILE,
                dir.display()
            )))
        }
        (false, true) => {
            return Err(PipelineError::ArtifactLoadError(format!(
                "{} present but {} missing in {}",
                MANIFEST_FILE,
                CLASSIFIER_FILE,
                dir.display()
            )))
        }
    }

    let classifier_bytes = fs::read(&classifier_path).map_err(|e| {
        PipelineError::ArtifactLoadError(format!("reading {}: {e}", classifier_path.display()))
    })?;
    let classifier: ClassifierState = bincode::deserialize(&classifier_bytes).map_err(|e| {
        PipelineError::ArtifactLoadError(format!("decoding {}: {e}", classifier_path.display()))
    })?;

    let manifest_bytes = fs::read(&manifest_path).map_err(|e| {
        PipelineError::ArtifactLoadError(format!("reading {}: {e}", manifest_path.display()))
    })?;
    let manifest: Manifest = serde_json::from_slice(&manifest_bytes).map_err(|e| {
        PipelineError::ArtifactLoadError(format!("decoding {}: {e}", manifest_path.display()))
    })?;

    if manifest.feature_names.len() != manifest.importances.len() {
        return Err(PipelineError::ArtifactLoadError(format!(
            "manifest lists {} features but {} importance weights",
            manifest.feature_names.len(),
            manifest.importances.len()
        )));
    }
    if !(0.0..=1.0).contains(&manifest.threshold) {
        return Err(PipelineError::ArtifactLoadError(format!(
            "threshold {} outside [0, 1]",
            manifest.threshold
        )));
    }

    Ok(Some(TrainedModel {
        classifier,
        feature_names: manifest.feature_names,
        threshold: manifest.threshold,
        importances: manifest.importances,
        imputation: manifest.imputation,
        metadata: manifest.metadata,
    }))
}

fn metadata_text(model: &TrainedModel) -> String {
    let m = &model.metadata;
    let mut out = String::new();
    out.push_str(&format!("Model trained: {}\n", m.trained_at));
    out.push_str(&format!("Model id: {}\n", m.model_id));
    out.push_str(&format!("Model type: {}\n", m.kind));
    out.push_str(&format!("Number of features: {}\n", model.feature_names.len()));
    out.push_str(&format!("Optimal threshold: {:.4}\n", model.threshold));
    out.push_str(&format!("Threshold strategy: {:?}\n", m.threshold_strategy));
    out.push_str(&format!(
        "Samples: {} train / {} validation ({} positive)\n",
        m.training_samples, m.validation_samples, m.positive_samples
    ));
    out.push_str(&format!(
        "Validation: precision {:.3}, recall {:.3}, F1 {:.3}, PR-AUC {:.3}, ROC-AUC {:.3}, Brier {:.4}\n",
        m.metrics.precision, m.metrics.recall, m.metrics.f1, m.metrics.pr_auc, m.metrics.roc_auc, m.metrics.brier
    ));
    out.push_str("\nFeature names:\n");
    for name in &model.feature_names {
        out.push_str(&format!("  - {name}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::features::canonical_feature_names;
    use crate::ml::logistic::LogisticBaseline;
    use crate::ml::metrics::ClassificationMetrics;

    fn dummy_model() -> TrainedModel {
        let names = canonical_feature_names();
        let n = names.len();
        TrainedModel {
            classifier: ClassifierState::Logistic(LogisticBaseline::prior(n, 0.3)),
            feature_names: names,
            threshold: 0.4,
            importances: vec![1.0 / n as f64; n],
            imputation: ImputationBaseline::default(),
            metadata: ModelMetadata {
                model_id: "test".to_string(),
                kind: "logistic".to_string(),
                version: "0.1.0".to_string(),
                trained_at: Utc::now(),
                training_samples: 80,
                validation_samples: 20,
                positive_samples: 10,
                metrics: ClassificationMetrics {
                    precision: 0.7,
                    recall: 0.8,
                    f1: 0.75,
                    pr_auc: 0.8,
                    roc_auc: 0.9,
                    brier: 0.1,
                },
                threshold_strategy: ThresholdStrategy::RecallAtPrecisionFloor,
            },
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let model = dummy_model();
        save(&model, dir.path()).unwrap();

        let loaded = load(dir.path()).unwrap();
        assert_eq!(loaded.feature_names, model.feature_names);
        assert_eq!(loaded.threshold, model.threshold);
        assert_eq!(loaded.importances, model.importances);
        assert_eq!(loaded.imputation, model.imputation);
        assert_eq!(loaded.metadata, model.metadata);
        assert!(dir.path().join(METADATA_TEXT_FILE).exists());
    }

    #[test]
    fn test_empty_directory_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(try_load(dir.path()).unwrap().is_none());
        assert!(matches!(
            load(dir.path()),
            Err(PipelineError::ArtifactLoadError(_))
        ));
    }

    #[test]
    fn test_partial_artifact_fails() {
        let dir = tempfile::tempdir().unwrap();
        let model = dummy_model();
        save(&model, dir.path()).unwrap();
        fs::remove_file(dir.path().join(MANIFEST_FILE)).unwrap();

        assert!(matches!(
            try_load(dir.path()),
            Err(PipelineError::ArtifactLoadError(_))
        ));

        // and the mirror case
        save(&model, dir.path()).unwrap();
        fs::remove_file(dir.path().join(CLASSIFIER_FILE)).unwrap();
        assert!(matches!(
            try_load(dir.path()),
            Err(PipelineError::ArtifactLoadError(_))
        ));
    }

    #[test]
    fn test_corrupt_classifier_fails() {
        let dir = tempfile::tempdir().unwrap();
        let model = dummy_model();
        save(&model, dir.path()).unwrap();
        fs::write(dir.path().join(CLASSIFIER_FILE), b"not bincode").unwrap();

        assert!(matches!(
            try_load(dir.path()),
            Err(PipelineError::ArtifactLoadError(_))
        ));
    }
}
