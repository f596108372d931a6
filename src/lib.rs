//! # CycleCare
//!
//! PCOS risk scoring core.
//!
//! This crate provides:
//! - A rule-based Rotterdam criteria counter over an 11-item questionnaire
//! - Feature assembly that turns raw form input into the exact feature vector
//!   a pre-trained classifier was fit on
//! - Inference and thresholding for two independent classifier pipelines
//! - Flat key-value records of every result for tabular export
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Pure types and rules (questionnaire, schemas, results)
//! - `ports`: Trait definitions for the classifier and scaler
//! - `adapters`: Artifact loading, JSON-exported models, log redaction
//! - `application`: Pipelines and the assessment service
//!
//! Nothing is persisted: every assessment is derived from the current input.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use application::{AssessmentService, HormoneUltrasoundPipeline, SymptomVitalsPipeline};
pub use domain::{
    DiagnosisLabel, PredictionResult, RawInputs, RiskAssessment, RiskLevel, SchemaId,
};

/// Result type for CycleCare operations
pub type Result<T> = std::result::Result<T, CyclecareError>;

/// Main error type for CycleCare
#[derive(Debug, thiserror::Error)]
pub enum CyclecareError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing field '{field}': expected {expected}")]
    MissingField {
        field: &'static str,
        expected: String,
    },

    #[error("Feature vector does not match the {schema} classifier: expected {expected} features, got {actual}")]
    SchemaMismatch {
        schema: SchemaId,
        expected: usize,
        actual: usize,
    },

    #[error("Model invocation failed: {0}")]
    ModelInvocation(#[from] ports::ClassifierError),

    #[error("Artifact load failed: {0}")]
    ArtifactLoad(#[from] adapters::ArtifactError),

    #[error("Pipeline not loaded: {0}")]
    PipelineNotLoaded(SchemaId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
