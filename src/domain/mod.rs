//! Domain layer: questionnaire scoring, feature schemas and result types.
//!
//! Everything here is pure: no I/O, no shared state, no classifier calls.

mod diagnosis;
pub mod features;
mod questionnaire;
mod report;
pub mod schema;

pub use diagnosis::{
    DiagnosisLabel, PredictionResult, RiskAssessment, RiskLevel, LIKELY_PROBABILITY_THRESHOLD,
};
pub use features::{
    assemble, compute_bmi, ClinicalFeatureVector, MissingValuePolicy, RawInputs, RawValue,
};
pub use questionnaire::{
    assess, assess_answers, CriteriaBucket, Question, Questionnaire, SymptomAnswer, QUESTION_COUNT,
};
pub use report::FlatRecord;
pub use schema::{FieldKind, FieldSpec, SchemaId};
