//! Application layer: Use cases and services.
//!
//! This module combines domain assembly with the classifier ports into the
//! two prediction pipelines, and exposes both pipelines plus the rule-based
//! assessment through [`AssessmentService`].

mod pipeline;
mod service;

pub use pipeline::{
    predict_label, predict_probability, Evaluation, HormoneUltrasoundPipeline,
    ScaledFeatureVector, SymptomVitalsPipeline,
};
pub use service::AssessmentService;
