//! Assessment service: the single entry point used by presentation code.
//!
//! The service owns the loaded pipelines. Artifacts are verified and loaded
//! once at startup; any failure there aborts construction, so a running
//! service never serves from a partially loaded or unverified model.

use std::sync::Arc;

use super::pipeline::{Evaluation, HormoneUltrasoundPipeline, SymptomVitalsPipeline};
use crate::adapters::{
    ArtifactVerifier, LogisticLabelModel, LogisticProbabilityModel, StandardScaler,
};
use crate::config::ServiceConfig;
use crate::domain::{
    self, MissingValuePolicy, PredictionResult, RawInputs, RiskAssessment, SchemaId,
    SymptomAnswer,
};
use crate::ports::{FeatureScaler, LabelClassifier, ProbabilityClassifier};
use crate::CyclecareError;

/// Rule-based assessment plus whichever classifier pipelines are loaded.
pub struct AssessmentService<
    P = LogisticProbabilityModel,
    S = StandardScaler,
    L = LogisticLabelModel,
> where
    P: ProbabilityClassifier,
    S: FeatureScaler,
    L: LabelClassifier,
{
    hormone_ultrasound: Option<HormoneUltrasoundPipeline<P>>,
    symptom_vitals: Option<SymptomVitalsPipeline<S, L>>,
}

impl AssessmentService {
    /// Verify and load every configured pipeline from `config.model_dir`.
    ///
    /// Each pipeline reads `<model_dir>/<schema id>/`.
    ///
    /// # Errors
    /// Returns `ArtifactLoad` if any artifact directory fails verification or
    /// any artifact fails schema validation.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, CyclecareError> {
        let verifier = match config.artifact_public_key_b64.as_deref() {
            Some(b64) => {
                ArtifactVerifier::from_public_key_b64(b64, config.require_signed_artifacts)?
            }
            None => {
                if config.require_signed_artifacts {
                    tracing::warn!(
                        "Signed artifacts are required but no public key is configured"
                    );
                }
                ArtifactVerifier::new(None, config.require_signed_artifacts)
            }
        };

        let mut service = Self::from_parts(None, None);
        for &schema in &config.pipelines {
            let dir = verifier.open(&config.model_dir.join(schema.id()))?;
            match schema {
                SchemaId::HormoneUltrasound => {
                    let model = LogisticProbabilityModel::load(&dir, schema)?;
                    service.hormone_ultrasound =
                        Some(HormoneUltrasoundPipeline::new(Arc::new(model))?);
                }
                SchemaId::SymptomVitals => {
                    let scaler = StandardScaler::load(&dir, schema)?;
                    let model = LogisticLabelModel::load(&dir, schema)?;
                    service.symptom_vitals = Some(SymptomVitalsPipeline::new(
                        Arc::new(scaler),
                        Arc::new(model),
                    )?);
                }
            }
        }

        tracing::info!(
            "Assessment service ready (pipelines: {:?})",
            service.loaded_pipelines()
        );
        Ok(service)
    }
}

impl<P, S, L> AssessmentService<P, S, L>
where
    P: ProbabilityClassifier,
    S: FeatureScaler,
    L: LabelClassifier,
{
    /// Assemble a service from already-built pipelines.
    #[must_use]
    pub fn from_parts(
        hormone_ultrasound: Option<HormoneUltrasoundPipeline<P>>,
        symptom_vitals: Option<SymptomVitalsPipeline<S, L>>,
    ) -> Self {
        Self {
            hormone_ultrasound,
            symptom_vitals,
        }
    }

    /// Pipelines available for [`Self::predict`].
    #[must_use]
    pub fn loaded_pipelines(&self) -> Vec<SchemaId> {
        let mut loaded = Vec::with_capacity(2);
        if self.hormone_ultrasound.is_some() {
            loaded.push(SchemaId::HormoneUltrasound);
        }
        if self.symptom_vitals.is_some() {
            loaded.push(SchemaId::SymptomVitals);
        }
        loaded
    }

    /// Score 11 positional answers against the Rotterdam criteria.
    ///
    /// # Errors
    /// Returns `InvalidInput` unless exactly 11 answers are given.
    pub fn assess(&self, answers: &[bool]) -> Result<RiskAssessment, CyclecareError> {
        domain::assess(answers)
    }

    /// Score named answers against the Rotterdam criteria.
    ///
    /// # Errors
    /// Returns `InvalidInput` on a missing or duplicate question.
    pub fn assess_answers(
        &self,
        answers: &[SymptomAnswer],
    ) -> Result<RiskAssessment, CyclecareError> {
        domain::assess_answers(answers)
    }

    /// Run the `kind` pipeline, rejecting missing fields.
    ///
    /// # Errors
    /// Returns `PipelineNotLoaded`, or the pipeline's assembly or inference
    /// error.
    pub fn predict(
        &self,
        kind: SchemaId,
        raw: &RawInputs,
    ) -> Result<PredictionResult, CyclecareError> {
        self.predict_with_policy(kind, raw, MissingValuePolicy::Reject)
    }

    /// # Errors
    /// Same as [`Self::predict`].
    pub fn predict_with_policy(
        &self,
        kind: SchemaId,
        raw: &RawInputs,
        policy: MissingValuePolicy,
    ) -> Result<PredictionResult, CyclecareError> {
        self.evaluate(kind, raw, policy).map(|evaluation| evaluation.result)
    }

    /// Run the `kind` pipeline and keep the assembled input vector, for
    /// exports that show the entered values next to the result.
    ///
    /// # Errors
    /// Same as [`Self::predict`].
    pub fn evaluate(
        &self,
        kind: SchemaId,
        raw: &RawInputs,
        policy: MissingValuePolicy,
    ) -> Result<Evaluation, CyclecareError> {
        match kind {
            SchemaId::HormoneUltrasound => self
                .hormone_ultrasound
                .as_ref()
                .ok_or(CyclecareError::PipelineNotLoaded(kind))?
                .evaluate(raw, policy),
            SchemaId::SymptomVitals => self
                .symptom_vitals
                .as_ref()
                .ok_or(CyclecareError::PipelineNotLoaded(kind))?
                .evaluate(raw, policy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::artifact::tests::{signing_key, write_manifest};
    use crate::adapters::linear::tests::exported as exported_model;
    use crate::adapters::linear::{OutputMode, CLASSIFIER_FILE};
    use crate::adapters::scaler::tests::exported as exported_scaler;
    use crate::adapters::scaler::SCALER_FILE;
    use crate::domain::features::tests::{full_hormone_inputs, full_symptom_inputs};
    use crate::domain::{DiagnosisLabel, Question, RiskLevel};
    use base64::Engine;
    use ed25519_dalek::SigningKey;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_json<T: serde::Serialize>(path: &Path, value: &T) {
        std::fs::write(path, serde_json::to_vec_pretty(value).expect("serialize")).expect("write");
    }

    /// Writes both artifact directories; the hormone model always leans
    /// positive and the symptom model always negative.
    fn write_artifacts(root: &Path, key: Option<&SigningKey>) {
        let hormone = root.join(SchemaId::HormoneUltrasound.id());
        std::fs::create_dir_all(&hormone).expect("mkdir");
        write_json(
            &hormone.join(CLASSIFIER_FILE),
            &exported_model(SchemaId::HormoneUltrasound, OutputMode::Probability, 2.0),
        );
        write_manifest(&hormone, &[CLASSIFIER_FILE], key);

        let symptom = root.join(SchemaId::SymptomVitals.id());
        std::fs::create_dir_all(&symptom).expect("mkdir");
        write_json(
            &symptom.join(CLASSIFIER_FILE),
            &exported_model(SchemaId::SymptomVitals, OutputMode::Label, -1.0),
        );
        write_json(&symptom.join(SCALER_FILE), &exported_scaler(0.0, 1.0));
        write_manifest(&symptom, &[CLASSIFIER_FILE, SCALER_FILE], key);
    }

    fn config(root: &Path) -> ServiceConfig {
        ServiceConfig {
            model_dir: root.to_path_buf(),
            require_signed_artifacts: false,
            ..ServiceConfig::default()
        }
    }

    #[test]
    fn test_loads_both_pipelines() {
        let temp = tempdir().expect("tempdir");
        write_artifacts(temp.path(), None);

        let service = AssessmentService::from_config(&config(temp.path())).expect("Should load");
        assert_eq!(
            service.loaded_pipelines(),
            vec![SchemaId::HormoneUltrasound, SchemaId::SymptomVitals]
        );

        let hormone = service
            .predict(SchemaId::HormoneUltrasound, &full_hormone_inputs())
            .expect("Should predict");
        assert_eq!(hormone.label, DiagnosisLabel::Likely);
        assert!(hormone.likelihood_percent.expect("likelihood") > 80.0);

        let symptom = service
            .predict(SchemaId::SymptomVitals, &full_symptom_inputs())
            .expect("Should predict");
        assert_eq!(symptom.label, DiagnosisLabel::Unlikely);
        assert!(symptom.probability.is_none());
    }

    #[test]
    fn test_evaluation_exports_training_columns() {
        let temp = tempdir().expect("tempdir");
        write_artifacts(temp.path(), None);
        let service = AssessmentService::from_config(&config(temp.path())).expect("Should load");

        for (kind, raw) in [
            (SchemaId::HormoneUltrasound, full_hormone_inputs()),
            (SchemaId::SymptomVitals, full_symptom_inputs()),
        ] {
            let evaluation = service
                .evaluate(kind, &raw, MissingValuePolicy::Reject)
                .expect("Should evaluate");
            let record = evaluation.to_record();
            assert_eq!(record.get("Pipeline"), Some(kind.id()));
            for column in kind.columns() {
                assert!(record.get(column).is_some(), "{kind}: missing column {column}");
            }
            let parsed = PredictionResult::from_record(&record).expect("Should parse");
            assert_eq!(parsed.label, evaluation.result.label);
            assert_eq!(parsed.likelihood_percent, evaluation.result.likelihood_percent);
        }
    }

    #[test]
    fn test_signed_artifacts_required() {
        let temp = tempdir().expect("tempdir");
        let key = signing_key();
        write_artifacts(temp.path(), Some(&key));

        let mut cfg = config(temp.path());
        cfg.require_signed_artifacts = true;
        cfg.artifact_public_key_b64 = Some(
            base64::engine::general_purpose::STANDARD.encode(key.verifying_key().to_bytes()),
        );
        AssessmentService::from_config(&cfg).expect("Should load signed artifacts");
    }

    #[test]
    fn test_unsigned_artifacts_refused_when_required() {
        let temp = tempdir().expect("tempdir");
        write_artifacts(temp.path(), None);

        let mut cfg = config(temp.path());
        cfg.require_signed_artifacts = true;
        let err = AssessmentService::from_config(&cfg)
            .err()
            .expect("must fail");
        assert!(matches!(err, CyclecareError::ArtifactLoad(_)));
    }

    #[test]
    fn test_missing_artifact_dir_is_fatal() {
        let temp = tempdir().expect("tempdir");
        let err = AssessmentService::from_config(&config(temp.path()))
            .err()
            .expect("must fail");
        assert!(matches!(err, CyclecareError::ArtifactLoad(_)));
    }

    #[test]
    fn test_unloaded_pipeline_reported() {
        let temp = tempdir().expect("tempdir");
        write_artifacts(temp.path(), None);

        let mut cfg = config(temp.path());
        cfg.pipelines = vec![SchemaId::HormoneUltrasound];
        let service = AssessmentService::from_config(&cfg).expect("Should load");

        let err = service
            .predict(SchemaId::SymptomVitals, &full_symptom_inputs())
            .expect_err("must fail");
        assert!(matches!(
            err,
            CyclecareError::PipelineNotLoaded(SchemaId::SymptomVitals)
        ));
    }

    #[test]
    fn test_assessment_needs_no_artifacts() {
        let service: AssessmentService = AssessmentService::from_parts(None, None);

        let mut answers = [false; 11];
        answers[0] = true; // ovulatory
        answers[3] = true; // hyperandrogenism
        let result = service.assess(&answers).expect("Should assess");
        assert_eq!(result.level, RiskLevel::High);
        assert_eq!(result.criteria_met, 2);

        let named: Vec<SymptomAnswer> = Question::ALL
            .iter()
            .map(|&q| SymptomAnswer::new(q, answers[q as usize]))
            .collect();
        assert_eq!(
            service.assess_answers(&named).expect("Should assess"),
            result
        );
    }
}
