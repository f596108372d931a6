//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundary between
//! the scoring pipelines and the pre-trained model artifacts.

mod classifier;

pub use classifier::{ClassifierError, FeatureScaler, LabelClassifier, ProbabilityClassifier};
