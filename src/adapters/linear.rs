//! Logistic-regression classifiers loaded from exported JSON artifacts.
//!
//! The training pipeline exports a fitted linear model as coefficients plus an
//! intercept, tagged with the schema it was trained on and the output mode it
//! was validated for. A probability artifact can only become a
//! [`LogisticProbabilityModel`] and a label artifact only a
//! [`LogisticLabelModel`], so one deployment never mixes both inference paths.

use serde::{Deserialize, Serialize};

use super::artifact::{ArtifactError, VerifiedArtifactDir};
use crate::domain::SchemaId;
use crate::ports::{ClassifierError, LabelClassifier, ProbabilityClassifier};

/// Classifier file name inside an artifact directory.
pub const CLASSIFIER_FILE: &str = "classifier.json";

/// Only artifact format version understood by this loader.
pub const FORMAT_VERSION: u32 = 1;

/// How the classifier's output is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Per-class probabilities, thresholded by the pipeline
    Probability,
    /// Hard class, thresholded at training time
    Label,
}

/// Model parameters exported by the training pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedLinearModel {
    pub format_version: u32,
    pub schema: SchemaId,
    pub output: OutputMode,
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl ExportedLinearModel {
    /// Check the export against the schema and output mode it will serve.
    fn validate(&self, schema: SchemaId, output: OutputMode) -> Result<(), ArtifactError> {
        let mismatch = |reason: String| ArtifactError::Schema {
            schema: schema.to_string(),
            reason,
        };

        if self.format_version != FORMAT_VERSION {
            return Err(mismatch(format!(
                "unsupported format_version {}",
                self.format_version
            )));
        }
        if self.schema != schema {
            return Err(mismatch(format!("artifact was trained for {}", self.schema)));
        }
        if self.output != output {
            return Err(mismatch(format!(
                "artifact output mode is {:?}, pipeline requires {:?}",
                self.output, output
            )));
        }
        if !self.feature_names.iter().map(String::as_str).eq(schema.columns()) {
            return Err(mismatch(format!(
                "feature_names {:?} do not match training columns {:?}",
                self.feature_names,
                schema.columns().collect::<Vec<_>>()
            )));
        }
        if self.coefficients.len() != self.feature_names.len() {
            return Err(mismatch(format!(
                "{} coefficients for {} features",
                self.coefficients.len(),
                self.feature_names.len()
            )));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(mismatch("non-finite model parameter".into()));
        }
        Ok(())
    }

    fn decision_function(&self, features: &[f64]) -> Result<f64, ClassifierError> {
        if features.len() != self.coefficients.len() {
            return Err(ClassifierError::FeatureCount {
                expected: self.coefficients.len(),
                actual: features.len(),
            });
        }
        if let Some(i) = features.iter().position(|x| !x.is_finite()) {
            return Err(ClassifierError::NonFiniteInput(i));
        }

        let z = self
            .coefficients
            .iter()
            .zip(features)
            .fold(self.intercept, |acc, (w, x)| acc + w * x);

        if z.is_finite() {
            Ok(z)
        } else {
            Err(ClassifierError::InvalidOutput(
                "decision function overflowed".into(),
            ))
        }
    }

    fn load(
        dir: &VerifiedArtifactDir,
        schema: SchemaId,
        output: OutputMode,
    ) -> Result<Self, ArtifactError> {
        let model: Self = dir.read_json(CLASSIFIER_FILE)?;
        model.validate(schema, output)?;
        tracing::info!(
            "Loaded {:?} classifier for {} from {:?} (n_features={})",
            output,
            schema,
            dir.path(),
            model.coefficients.len()
        );
        Ok(model)
    }
}

/// Numerically stable logistic function.
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Logistic regression exposing `predict_proba`.
#[derive(Debug, Clone)]
pub struct LogisticProbabilityModel {
    model: ExportedLinearModel,
}

impl LogisticProbabilityModel {
    /// Wrap an export after validating it.
    ///
    /// # Errors
    /// Returns `ArtifactError::Schema` if the export does not fit `schema` or
    /// is not a probability model.
    pub fn from_exported(
        model: ExportedLinearModel,
        schema: SchemaId,
    ) -> Result<Self, ArtifactError> {
        model.validate(schema, OutputMode::Probability)?;
        Ok(Self { model })
    }

    /// Load `classifier.json` from a verified directory.
    ///
    /// # Errors
    /// Returns error if the file fails integrity or schema checks.
    pub fn load(dir: &VerifiedArtifactDir, schema: SchemaId) -> Result<Self, ArtifactError> {
        ExportedLinearModel::load(dir, schema, OutputMode::Probability).map(|model| Self { model })
    }
}

impl ProbabilityClassifier for LogisticProbabilityModel {
    fn n_features(&self) -> usize {
        self.model.coefficients.len()
    }

    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, ClassifierError> {
        let p = sigmoid(self.model.decision_function(features)?);
        Ok(vec![1.0 - p, p])
    }
}

/// Logistic regression exposing only hard labels.
#[derive(Debug, Clone)]
pub struct LogisticLabelModel {
    model: ExportedLinearModel,
}

impl LogisticLabelModel {
    /// Wrap an export after validating it.
    ///
    /// # Errors
    /// Returns `ArtifactError::Schema` if the export does not fit `schema` or
    /// is not a label model.
    pub fn from_exported(
        model: ExportedLinearModel,
        schema: SchemaId,
    ) -> Result<Self, ArtifactError> {
        model.validate(schema, OutputMode::Label)?;
        Ok(Self { model })
    }

    /// Load `classifier.json` from a verified directory.
    ///
    /// # Errors
    /// Returns error if the file fails integrity or schema checks.
    pub fn load(dir: &VerifiedArtifactDir, schema: SchemaId) -> Result<Self, ArtifactError> {
        ExportedLinearModel::load(dir, schema, OutputMode::Label).map(|model| Self { model })
    }
}

impl LabelClassifier for LogisticLabelModel {
    fn n_features(&self) -> usize {
        self.model.coefficients.len()
    }

    fn predict(&self, features: &[f64]) -> Result<u8, ClassifierError> {
        Ok(u8::from(self.model.decision_function(features)? > 0.0))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adapters::artifact::tests::write_manifest;
    use crate::adapters::artifact::ArtifactVerifier;
    use tempfile::tempdir;

    pub(crate) fn exported(
        schema: SchemaId,
        output: OutputMode,
        intercept: f64,
    ) -> ExportedLinearModel {
        ExportedLinearModel {
            format_version: FORMAT_VERSION,
            schema,
            output,
            feature_names: schema.columns().map(str::to_string).collect(),
            coefficients: vec![0.0; schema.arity()],
            intercept,
        }
    }

    #[test]
    fn test_probability_model_sums_to_one() {
        let mut export = exported(SchemaId::HormoneUltrasound, OutputMode::Probability, -1.0);
        export.coefficients[5] = 0.25; // AMH
        let model = LogisticProbabilityModel::from_exported(export, SchemaId::HormoneUltrasound)
            .expect("Should validate");

        let mut x = vec![0.0; 12];
        x[5] = 4.0;
        let proba = model.predict_proba(&x).expect("Should predict");
        assert_eq!(proba.len(), 2);
        assert!((proba[0] + proba[1] - 1.0).abs() < 1e-12);
        // z = -1 + 0.25 * 4 = 0
        assert!((proba[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_sigmoid_extremes_are_finite() {
        assert!((sigmoid(1000.0) - 1.0).abs() < 1e-12);
        assert!(sigmoid(-1000.0) >= 0.0);
        assert!(sigmoid(-1000.0) < 1e-12);
    }

    #[test]
    fn test_label_model_thresholds_decision_function() {
        let model = LogisticLabelModel::from_exported(
            exported(SchemaId::SymptomVitals, OutputMode::Label, 0.5),
            SchemaId::SymptomVitals,
        )
        .expect("Should validate");
        assert_eq!(model.predict(&[0.0; 15]).expect("Should predict"), 1);

        let model = LogisticLabelModel::from_exported(
            exported(SchemaId::SymptomVitals, OutputMode::Label, -0.5),
            SchemaId::SymptomVitals,
        )
        .expect("Should validate");
        assert_eq!(model.predict(&[0.0; 15]).expect("Should predict"), 0);
    }

    #[test]
    fn test_output_mode_is_exclusive() {
        let err = LogisticLabelModel::from_exported(
            exported(SchemaId::SymptomVitals, OutputMode::Probability, 0.0),
            SchemaId::SymptomVitals,
        )
        .expect_err("must fail");
        assert!(err.to_string().contains("output mode"));

        let err = LogisticProbabilityModel::from_exported(
            exported(SchemaId::HormoneUltrasound, OutputMode::Label, 0.0),
            SchemaId::HormoneUltrasound,
        )
        .expect_err("must fail");
        assert!(matches!(err, ArtifactError::Schema { .. }));
    }

    #[test]
    fn test_reordered_feature_names_rejected() {
        let mut export = exported(SchemaId::HormoneUltrasound, OutputMode::Probability, 0.0);
        export.feature_names.swap(0, 1);
        let err = LogisticProbabilityModel::from_exported(export, SchemaId::HormoneUltrasound)
            .expect_err("must fail");
        assert!(err.to_string().contains("feature_names"));
    }

    #[test]
    fn test_wrong_schema_rejected() {
        let export = exported(SchemaId::SymptomVitals, OutputMode::Probability, 0.0);
        let err = LogisticProbabilityModel::from_exported(export, SchemaId::HormoneUltrasound)
            .expect_err("must fail");
        assert!(err.to_string().contains("trained for symptom_vitals"));
    }

    #[test]
    fn test_feature_count_mismatch_at_call() {
        let model = LogisticProbabilityModel::from_exported(
            exported(SchemaId::HormoneUltrasound, OutputMode::Probability, 0.0),
            SchemaId::HormoneUltrasound,
        )
        .expect("Should validate");
        let err = model.predict_proba(&[1.0; 11]).expect_err("must fail");
        assert_eq!(err, ClassifierError::FeatureCount { expected: 12, actual: 11 });
    }

    #[test]
    fn test_load_from_verified_dir() {
        let temp = tempdir().expect("tempdir");
        let export = exported(SchemaId::HormoneUltrasound, OutputMode::Probability, 0.3);
        std::fs::write(
            temp.path().join(CLASSIFIER_FILE),
            serde_json::to_vec(&export).expect("serialize"),
        )
        .expect("write");
        write_manifest(temp.path(), &[CLASSIFIER_FILE], None);

        let dir = ArtifactVerifier::new(None, false)
            .open(temp.path())
            .expect("Should open");
        let model = LogisticProbabilityModel::load(&dir, SchemaId::HormoneUltrasound)
            .expect("Should load");
        assert_eq!(model.n_features(), 12);
    }
}
