//! Classifier ports: traits for the pre-trained model and its scaler.
//!
//! These abstract the exported model artifacts from the pipelines, so the
//! pipelines can be exercised with stub models in tests. Implementations are
//! loaded once and never mutated afterwards, hence `Send + Sync`.

/// Errors raised by a classifier or scaler call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassifierError {
    #[error("expected {expected} features, got {actual}")]
    FeatureCount { expected: usize, actual: usize },

    #[error("non-finite feature at index {0}")]
    NonFiniteInput(usize),

    #[error("model returned an invalid output: {0}")]
    InvalidOutput(String),

    #[error("model call failed: {0}")]
    Failed(String),
}

/// A classifier that outputs per-class probabilities.
pub trait ProbabilityClassifier: Send + Sync {
    /// Number of features the model was trained on.
    fn n_features(&self) -> usize;

    /// Per-class probabilities for one sample, indexed by class (0, 1).
    ///
    /// # Errors
    /// Returns `ClassifierError` if the model cannot score the sample.
    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, ClassifierError>;
}

/// A classifier that outputs a hard class, already thresholded at training
/// time.
pub trait LabelClassifier: Send + Sync {
    /// Number of features the model was trained on.
    fn n_features(&self) -> usize;

    /// Predicted class for one sample.
    ///
    /// # Errors
    /// Returns `ClassifierError` if the model cannot score the sample.
    fn predict(&self, features: &[f64]) -> Result<u8, ClassifierError>;
}

/// A pre-fit per-feature transform applied before inference.
pub trait FeatureScaler: Send + Sync {
    /// Number of features the scaler was fit on.
    fn n_features(&self) -> usize;

    /// Scale one sample.
    ///
    /// # Errors
    /// Returns `ClassifierError` on a feature-count mismatch.
    fn transform(&self, features: &[f64]) -> Result<Vec<f64>, ClassifierError>;
}
