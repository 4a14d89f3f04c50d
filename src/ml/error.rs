use thiserror::Error;

/// Pipeline error taxonomy.
///
/// The feature builder and predictor surface these to the caller instead of
/// substituting defaults; the only designed degradation is the documented
/// imputation policy in the feature builder. Nothing here is retried
/// internally.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Not enough observed days to compute the required windows. Recoverable
    /// by supplying more history.
    #[error("insufficient history: {0}")]
    InsufficientHistory(String),

    /// Training-time only; fatal to that training run.
    #[error("insufficient training data: {0}")]
    InsufficientTrainingData(String),

    /// The artifact's feature list has drifted from the canonical order.
    /// Fatal: indicates a deployment inconsistency, never a silently-wrong
    /// prediction.
    #[error("feature mismatch: {0}")]
    FeatureMismatch(String),

    /// Partial or corrupt model artifact; the classifier state and the
    /// feature manifest must load together.
    #[error("artifact load error: {0}")]
    ArtifactLoadError(String),
}
