//! Assessment and prediction result types.
//!
//! Results are derived on demand from the current input and never stored.

use serde::{Deserialize, Serialize};

use super::questionnaire::CriteriaBucket;
use super::report::FlatRecord;
use super::schema::SchemaId;
use crate::CyclecareError;

/// Positive-class probability above which a probability classifier's output
/// is labeled [`DiagnosisLabel::Likely`].
///
/// The comparison is strict: exactly 0.50 is `Unlikely`. This is a clinical
/// policy value carried over from the deployed tool, not something derived
/// here, and any change to it needs clinical review.
pub const LIKELY_PROBABILITY_THRESHOLD: f64 = 0.50;

/// Risk level from the rule-based criteria count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    /// No criterion met
    Low,
    /// One criterion met
    Moderate,
    /// Two or more criteria met
    High,
}

impl RiskLevel {
    /// Map a satisfied-criteria count to a level.
    ///
    /// Non-linear: two and three criteria are both `High`.
    #[must_use]
    pub fn from_criteria_count(count: u8) -> Self {
        match count {
            0 => Self::Low,
            1 => Self::Moderate,
            _ => Self::High,
        }
    }

    /// Get a human-readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Low => "Low risk - no Rotterdam criterion met",
            Self::Moderate => "Moderate risk - one criterion met, follow-up recommended",
            Self::High => "High risk - two or more criteria met, clinical evaluation advised",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low Risk"),
            Self::Moderate => write!(f, "Moderate Risk"),
            Self::High => write!(f, "High Risk"),
        }
    }
}

/// Output of the rule-based classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,

    /// Number of criteria buckets met (0-3)
    pub criteria_met: u8,

    /// Which buckets were met, in reporting order
    pub buckets_met: Vec<CriteriaBucket>,
}

impl RiskAssessment {
    /// Flatten for tabular export.
    #[must_use]
    pub fn to_record(&self) -> FlatRecord {
        let mut record = FlatRecord::new();
        for bucket in CriteriaBucket::ALL {
            let met = if self.buckets_met.contains(&bucket) { "Yes" } else { "No" };
            record.push(bucket.label(), met);
        }
        record.push(RECORD_CRITERIA_MET, self.criteria_met.to_string());
        record.push(RECORD_RISK_LEVEL, self.level.to_string());
        record
    }
}

/// Two-level diagnosis category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosisLabel {
    Likely,
    Unlikely,
}

impl DiagnosisLabel {
    /// Label a positive-class probability against the fixed threshold.
    #[must_use]
    pub fn from_probability(probability: f64) -> Self {
        if probability > LIKELY_PROBABILITY_THRESHOLD {
            Self::Likely
        } else {
            Self::Unlikely
        }
    }

    /// Label a hard class emitted by a pre-thresholded classifier.
    /// `None` for any class other than 0 or 1.
    #[must_use]
    pub fn from_class(class: u8) -> Option<Self> {
        match class {
            0 => Some(Self::Unlikely),
            1 => Some(Self::Likely),
            _ => None,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "PCOS Likely" => Some(Self::Likely),
            "PCOS Unlikely" => Some(Self::Unlikely),
            _ => None,
        }
    }
}

impl std::fmt::Display for DiagnosisLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Likely => write!(f, "PCOS Likely"),
            Self::Unlikely => write!(f, "PCOS Unlikely"),
        }
    }
}

/// Output of a statistical pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Pipeline that produced the result
    pub pipeline: SchemaId,

    pub label: DiagnosisLabel,

    /// Positive-class probability (0.0 to 1.0), probability classifiers only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,

    /// `probability * 100`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likelihood_percent: Option<f64>,

    /// Fields filled from a caller-supplied sentinel instead of real input
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imputed_fields: Vec<String>,
}

const RECORD_PIPELINE: &str = "Pipeline";
const RECORD_DIAGNOSIS: &str = "Diagnosis";
const RECORD_LIKELIHOOD: &str = "Likelihood (%)";
const RECORD_IMPUTED: &str = "Imputed Fields";
const RECORD_CRITERIA_MET: &str = "Criteria Met";
const RECORD_RISK_LEVEL: &str = "Risk Level";

impl PredictionResult {
    /// Result from a probability classifier.
    #[must_use]
    pub fn from_probability(pipeline: SchemaId, probability: f64) -> Self {
        Self {
            pipeline,
            label: DiagnosisLabel::from_probability(probability),
            probability: Some(probability),
            likelihood_percent: Some(probability * 100.0),
            imputed_fields: Vec::new(),
        }
    }

    /// Result from a hard-label classifier.
    #[must_use]
    pub fn from_label(pipeline: SchemaId, label: DiagnosisLabel) -> Self {
        Self {
            pipeline,
            label,
            probability: None,
            likelihood_percent: None,
            imputed_fields: Vec::new(),
        }
    }

    /// Flatten for tabular export.
    ///
    /// Floats are written in shortest round-trip form so [`Self::from_record`]
    /// recovers them exactly.
    #[must_use]
    pub fn to_record(&self) -> FlatRecord {
        let mut record = FlatRecord::new();
        record.push(RECORD_PIPELINE, self.pipeline.id());
        record.push(RECORD_DIAGNOSIS, self.label.to_string());
        if let Some(likelihood) = self.likelihood_percent {
            record.push(RECORD_LIKELIHOOD, likelihood.to_string());
        }
        if !self.imputed_fields.is_empty() {
            record.push(RECORD_IMPUTED, self.imputed_fields.join(";"));
        }
        record
    }

    /// Parse a record written by [`Self::to_record`].
    ///
    /// Extra keys (feature values, timestamps) are ignored.
    ///
    /// # Errors
    /// Returns `InvalidInput` if a required key is missing or malformed.
    pub fn from_record(record: &FlatRecord) -> Result<Self, CyclecareError> {
        let field = |key: &str| {
            record
                .get(key)
                .ok_or_else(|| CyclecareError::InvalidInput(format!("record has no '{key}' entry")))
        };

        let pipeline = SchemaId::from_id(field(RECORD_PIPELINE)?).ok_or_else(|| {
            CyclecareError::InvalidInput("record names an unknown pipeline".to_string())
        })?;
        let label = DiagnosisLabel::parse(field(RECORD_DIAGNOSIS)?).ok_or_else(|| {
            CyclecareError::InvalidInput("record has an unknown diagnosis label".to_string())
        })?;
        let likelihood_percent = match record.get(RECORD_LIKELIHOOD) {
            Some(v) => Some(v.parse::<f64>().map_err(|e| {
                CyclecareError::InvalidInput(format!("invalid likelihood '{v}': {e}"))
            })?),
            None => None,
        };
        let imputed_fields = record
            .get(RECORD_IMPUTED)
            .map(|v| v.split(';').map(str::to_string).collect())
            .unwrap_or_default();

        Ok(Self {
            pipeline,
            label,
            probability: likelihood_percent.map(|l| l / 100.0),
            likelihood_percent,
            imputed_fields,
        })
    }
}
