//! Standard scaler loaded from an exported JSON artifact.

use serde::{Deserialize, Serialize};

use super::artifact::{ArtifactError, VerifiedArtifactDir};
use super::linear::FORMAT_VERSION;
use crate::domain::SchemaId;
use crate::ports::{ClassifierError, FeatureScaler};

/// Scaler file name inside an artifact directory.
pub const SCALER_FILE: &str = "scaler.json";

/// Per-feature centering and scaling parameters fit at training time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedScaler {
    pub format_version: u32,
    pub schema: SchemaId,
    pub feature_names: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// `x' = (x - mean) / scale`, with a zero scale treated as 1 (constant
/// feature at fit time).
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Validate an export against `schema`.
    ///
    /// # Errors
    /// Returns `ArtifactError::Schema` on any shape or value mismatch.
    pub fn from_exported(export: ExportedScaler, schema: SchemaId) -> Result<Self, ArtifactError> {
        let mismatch = |reason: String| ArtifactError::Schema {
            schema: schema.to_string(),
            reason,
        };

        if export.format_version != FORMAT_VERSION {
            return Err(mismatch(format!(
                "unsupported format_version {}",
                export.format_version
            )));
        }
        if export.schema != schema {
            return Err(mismatch(format!("scaler was fit for {}", export.schema)));
        }
        if !export.feature_names.iter().map(String::as_str).eq(schema.columns()) {
            return Err(mismatch("scaler feature_names do not match training columns".into()));
        }
        let n = schema.arity();
        if export.mean.len() != n || export.scale.len() != n {
            return Err(mismatch(format!(
                "expected {n} mean/scale values, got {}/{}",
                export.mean.len(),
                export.scale.len()
            )));
        }
        if export
            .mean
            .iter()
            .chain(&export.scale)
            .any(|v| !v.is_finite())
        {
            return Err(mismatch("non-finite scaler parameter".into()));
        }

        let scale = export
            .scale
            .into_iter()
            .map(|s| if s == 0.0 { 1.0 } else { s })
            .collect();
        Ok(Self {
            mean: export.mean,
            scale,
        })
    }

    /// Load `scaler.json` from a verified directory.
    ///
    /// # Errors
    /// Returns error if the file fails integrity or schema checks.
    pub fn load(dir: &VerifiedArtifactDir, schema: SchemaId) -> Result<Self, ArtifactError> {
        let export: ExportedScaler = dir.read_json(SCALER_FILE)?;
        let scaler = Self::from_exported(export, schema)?;
        tracing::info!("Loaded scaler for {} from {:?}", schema, dir.path());
        Ok(scaler)
    }
}

impl FeatureScaler for StandardScaler {
    fn n_features(&self) -> usize {
        self.mean.len()
    }

    fn transform(&self, features: &[f64]) -> Result<Vec<f64>, ClassifierError> {
        if features.len() != self.mean.len() {
            return Err(ClassifierError::FeatureCount {
                expected: self.mean.len(),
                actual: features.len(),
            });
        }
        Ok(features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect())
    }
}
