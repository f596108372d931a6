//! Classifier pipelines: assembly, optional scaling, one inference call,
//! thresholding.
//!
//! The two pipelines are separate types over separate port traits. A
//! HormoneUltrasound vector can never reach the hard-label classifier and an
//! unscaled SymptomVitals vector can never reach any classifier.

use std::sync::Arc;

use crate::domain::{
    assemble, ClinicalFeatureVector, DiagnosisLabel, FlatRecord, MissingValuePolicy,
    PredictionResult, RawInputs, SchemaId,
};
use crate::ports::{ClassifierError, FeatureScaler, LabelClassifier, ProbabilityClassifier};
use crate::CyclecareError;

/// SymptomVitals features after the pre-fit scaler has been applied.
///
/// Only [`SymptomVitalsPipeline::assemble`] produces this type.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledFeatureVector {
    values: Vec<f64>,
    imputed: Vec<&'static str>,
}

impl ScaledFeatureVector {
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn imputed_fields(&self) -> &[&'static str] {
        &self.imputed
    }
}

/// A prediction together with the features it was computed from.
///
/// `features` is the assembled vector before any scaling, in training column
/// order, so the export shows the values the user actually entered.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub result: PredictionResult,
    pub features: ClinicalFeatureVector,
}

impl Evaluation {
    /// Result fields followed by one entry per training column.
    #[must_use]
    pub fn to_record(&self) -> FlatRecord {
        let mut record = self.result.to_record();
        record.extend(self.features.to_record());
        record
    }
}

fn check_arity(schema: SchemaId, expected: usize, actual: usize) -> Result<(), CyclecareError> {
    if expected == actual {
        Ok(())
    } else {
        Err(CyclecareError::SchemaMismatch {
            schema,
            expected,
            actual,
        })
    }
}

fn is_probability(p: f64) -> bool {
    p.is_finite() && (0.0..=1.0).contains(&p)
}

fn imputed_names(imputed: &[&'static str]) -> Vec<String> {
    imputed.iter().map(|s| (*s).to_string()).collect()
}

/// Run the probability classifier once and threshold the positive class.
///
/// # Errors
/// - `SchemaMismatch` if the vector is not a HormoneUltrasound vector of the
///   classifier's arity
/// - `ModelInvocation` if the classifier fails or returns anything other than
///   two finite probabilities in [0, 1]
pub fn predict_probability<C>(
    features: &ClinicalFeatureVector,
    classifier: &C,
) -> Result<PredictionResult, CyclecareError>
where
    C: ProbabilityClassifier + ?Sized,
{
    let schema = SchemaId::HormoneUltrasound;
    if features.schema() != schema {
        return Err(CyclecareError::SchemaMismatch {
            schema,
            expected: schema.arity(),
            actual: features.len(),
        });
    }
    check_arity(schema, classifier.n_features(), features.len())?;

    let proba = classifier.predict_proba(features.values())?;
    let positive = match proba.as_slice() {
        [neg, pos] if is_probability(*neg) && is_probability(*pos) => *pos,
        _ => {
            return Err(ClassifierError::InvalidOutput(format!(
                "expected two class probabilities in [0, 1], got {} values",
                proba.len()
            ))
            .into())
        }
    };

    let mut result = PredictionResult::from_probability(schema, positive);
    result.imputed_fields = imputed_names(features.imputed_fields());
    tracing::debug!("{} prediction: {}", schema, result.label);
    Ok(result)
}

/// Run the hard-label classifier once on a scaled vector.
///
/// # Errors
/// - `SchemaMismatch` if the vector length differs from the classifier's arity
/// - `ModelInvocation` if the classifier fails or returns a class other than
///   0 or 1
pub fn predict_label<C>(
    features: &ScaledFeatureVector,
    classifier: &C,
) -> Result<PredictionResult, CyclecareError>
where
    C: LabelClassifier + ?Sized,
{
    let schema = SchemaId::SymptomVitals;
    check_arity(schema, classifier.n_features(), features.len())?;

    let class = classifier.predict(features.values())?;
    let label = DiagnosisLabel::from_class(class).ok_or_else(|| {
        ClassifierError::InvalidOutput(format!("unexpected class label {class}"))
    })?;

    let mut result = PredictionResult::from_label(schema, label);
    result.imputed_fields = imputed_names(features.imputed_fields());
    tracing::debug!("{} prediction: {}", schema, result.label);
    Ok(result)
}

/// Blood-panel pipeline backed by a probability classifier.
pub struct HormoneUltrasoundPipeline<C>
where
    C: ProbabilityClassifier,
{
    classifier: Arc<C>,
}

impl<C> HormoneUltrasoundPipeline<C>
where
    C: ProbabilityClassifier,
{
    pub const SCHEMA: SchemaId = SchemaId::HormoneUltrasound;

    /// Bind a classifier to this pipeline.
    ///
    /// # Errors
    /// Returns `SchemaMismatch` if the classifier was not fit on 12 features.
    pub fn new(classifier: Arc<C>) -> Result<Self, CyclecareError> {
        check_arity(Self::SCHEMA, Self::SCHEMA.arity(), classifier.n_features())?;
        Ok(Self { classifier })
    }

    /// # Errors
    /// See [`crate::domain::assemble`].
    pub fn assemble(&self, raw: &RawInputs) -> Result<ClinicalFeatureVector, CyclecareError> {
        self.assemble_with_policy(raw, MissingValuePolicy::Reject)
    }

    /// # Errors
    /// See [`crate::domain::assemble`].
    pub fn assemble_with_policy(
        &self,
        raw: &RawInputs,
        policy: MissingValuePolicy,
    ) -> Result<ClinicalFeatureVector, CyclecareError> {
        assemble(Self::SCHEMA, raw, policy)
    }

    /// Assemble and classify, rejecting missing fields.
    ///
    /// # Errors
    /// Returns assembly or inference errors.
    pub fn predict(&self, raw: &RawInputs) -> Result<PredictionResult, CyclecareError> {
        self.predict_with_policy(raw, MissingValuePolicy::Reject)
    }

    /// # Errors
    /// Returns assembly or inference errors.
    pub fn predict_with_policy(
        &self,
        raw: &RawInputs,
        policy: MissingValuePolicy,
    ) -> Result<PredictionResult, CyclecareError> {
        self.evaluate(raw, policy).map(|evaluation| evaluation.result)
    }

    /// Assemble and classify, keeping the assembled vector for export.
    ///
    /// # Errors
    /// Returns assembly or inference errors.
    pub fn evaluate(
        &self,
        raw: &RawInputs,
        policy: MissingValuePolicy,
    ) -> Result<Evaluation, CyclecareError> {
        let features = self.assemble_with_policy(raw, policy)?;
        let result = predict_probability(&features, self.classifier.as_ref())?;
        Ok(Evaluation { result, features })
    }
}

/// Symptom and vitals pipeline: scaler then hard-label classifier.
pub struct SymptomVitalsPipeline<S, C>
where
    S: FeatureScaler,
    C: LabelClassifier,
{
    scaler: Arc<S>,
    classifier: Arc<C>,
}

impl<S, C> SymptomVitalsPipeline<S, C>
where
    S: FeatureScaler,
    C: LabelClassifier,
{
    pub const SCHEMA: SchemaId = SchemaId::SymptomVitals;

    /// Bind a scaler and classifier to this pipeline.
    ///
    /// # Errors
    /// Returns `SchemaMismatch` if either was not fit on 15 features.
    pub fn new(scaler: Arc<S>, classifier: Arc<C>) -> Result<Self, CyclecareError> {
        let arity = Self::SCHEMA.arity();
        check_arity(Self::SCHEMA, arity, scaler.n_features())?;
        check_arity(Self::SCHEMA, arity, classifier.n_features())?;
        Ok(Self { scaler, classifier })
    }

    /// Assemble and scale `raw`.
    ///
    /// # Errors
    /// Returns assembly errors, or `ModelInvocation` if the scaler fails.
    pub fn assemble(&self, raw: &RawInputs) -> Result<ScaledFeatureVector, CyclecareError> {
        self.assemble_with_policy(raw, MissingValuePolicy::Reject)
    }

    /// # Errors
    /// Returns assembly errors, or `ModelInvocation` if the scaler fails.
    pub fn assemble_with_policy(
        &self,
        raw: &RawInputs,
        policy: MissingValuePolicy,
    ) -> Result<ScaledFeatureVector, CyclecareError> {
        let features = assemble(Self::SCHEMA, raw, policy)?;
        self.scale(&features)
    }

    fn scale(
        &self,
        features: &ClinicalFeatureVector,
    ) -> Result<ScaledFeatureVector, CyclecareError> {
        let values = self.scaler.transform(features.values())?;
        check_arity(Self::SCHEMA, features.len(), values.len())?;
        Ok(ScaledFeatureVector {
            values,
            imputed: features.imputed_fields().to_vec(),
        })
    }

    /// Assemble, scale and classify, rejecting missing fields.
    ///
    /// # Errors
    /// Returns assembly, scaling or inference errors.
    pub fn predict(&self, raw: &RawInputs) -> Result<PredictionResult, CyclecareError> {
        self.predict_with_policy(raw, MissingValuePolicy::Reject)
    }

    /// # Errors
    /// Returns assembly, scaling or inference errors.
    pub fn predict_with_policy(
        &self,
        raw: &RawInputs,
        policy: MissingValuePolicy,
    ) -> Result<PredictionResult, CyclecareError> {
        self.evaluate(raw, policy).map(|evaluation| evaluation.result)
    }

    /// Assemble, scale and classify, keeping the unscaled vector for export.
    ///
    /// # Errors
    /// Returns assembly, scaling or inference errors.
    pub fn evaluate(
        &self,
        raw: &RawInputs,
        policy: MissingValuePolicy,
    ) -> Result<Evaluation, CyclecareError> {
        let features = assemble(Self::SCHEMA, raw, policy)?;
        let scaled = self.scale(&features)?;
        let result = predict_label(&scaled, self.classifier.as_ref())?;
        Ok(Evaluation { result, features })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::features::tests::{full_hormone_inputs, full_symptom_inputs};
    use crate::domain::RawValue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedProba {
        output: Vec<f64>,
        calls: AtomicUsize,
    }

    impl FixedProba {
        fn new(output: Vec<f64>) -> Self {
            Self {
                output,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ProbabilityClassifier for FixedProba {
        fn n_features(&self) -> usize {
            12
        }

        fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, ClassifierError> {
            assert_eq!(features.len(), 12);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.clone())
        }
    }

    struct RecordingLabel {
        class: u8,
        seen: Mutex<Vec<Vec<f64>>>,
    }

    impl RecordingLabel {
        fn new(class: u8) -> Self {
            Self {
                class,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl LabelClassifier for RecordingLabel {
        fn n_features(&self) -> usize {
            15
        }

        fn predict(&self, features: &[f64]) -> Result<u8, ClassifierError> {
            self.seen.lock().expect("lock").push(features.to_vec());
            Ok(self.class)
        }
    }

    struct FailingLabel;

    impl LabelClassifier for FailingLabel {
        fn n_features(&self) -> usize {
            15
        }

        fn predict(&self, _features: &[f64]) -> Result<u8, ClassifierError> {
            Err(ClassifierError::Failed("backend unavailable".into()))
        }
    }

    /// Subtracts 1 from every feature.
    struct ShiftScaler;

    impl FeatureScaler for ShiftScaler {
        fn n_features(&self) -> usize {
            15
        }

        fn transform(&self, features: &[f64]) -> Result<Vec<f64>, ClassifierError> {
            Ok(features.iter().map(|x| x - 1.0).collect())
        }
    }

    fn hormone_pipeline(
        output: Vec<f64>,
    ) -> (HormoneUltrasoundPipeline<FixedProba>, Arc<FixedProba>) {
        let classifier = Arc::new(FixedProba::new(output));
        let pipeline =
            HormoneUltrasoundPipeline::new(Arc::clone(&classifier)).expect("Should build pipeline");
        (pipeline, classifier)
    }

    #[test]
    fn test_probability_above_threshold_is_likely() {
        let (pipeline, classifier) = hormone_pipeline(vec![0.27, 0.73]);
        let result = pipeline
            .predict(&full_hormone_inputs())
            .expect("Should predict");

        assert_eq!(result.label, DiagnosisLabel::Likely);
        assert_eq!(result.probability, Some(0.73));
        assert!((result.likelihood_percent.expect("likelihood") - 73.0).abs() < 1e-9);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_probability_at_threshold_is_unlikely() {
        let (pipeline, _) = hormone_pipeline(vec![0.5, 0.5]);
        let result = pipeline
            .predict(&full_hormone_inputs())
            .expect("Should predict");
        assert_eq!(result.label, DiagnosisLabel::Unlikely);
    }

    #[test]
    fn test_invalid_probability_output_rejected() {
        for output in [vec![0.7], vec![0.1, 0.2, 0.7], vec![f64::NAN, 0.5], vec![-0.2, 1.2]] {
            let (pipeline, _) = hormone_pipeline(output);
            let err = pipeline
                .predict(&full_hormone_inputs())
                .expect_err("must fail");
            assert!(matches!(
                err,
                CyclecareError::ModelInvocation(ClassifierError::InvalidOutput(_))
            ));
        }
    }

    #[test]
    fn test_missing_field_never_calls_classifier() {
        let (pipeline, classifier) = hormone_pipeline(vec![0.2, 0.8]);
        let raw = full_hormone_inputs().with("amh", RawValue::Null);
        let err = pipeline.predict(&raw).expect_err("must fail");
        assert!(matches!(err, CyclecareError::MissingField { field: "amh", .. }));
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_sentinel_policy_reports_imputed_fields() {
        let (pipeline, _) = hormone_pipeline(vec![0.6, 0.4]);
        let raw = full_hormone_inputs().with("tsh", RawValue::Null);
        let result = pipeline
            .predict_with_policy(&raw, MissingValuePolicy::Sentinel(0.0))
            .expect("Should predict");
        assert_eq!(result.imputed_fields, vec!["tsh".to_string()]);
        assert_eq!(result.label, DiagnosisLabel::Unlikely);
    }

    #[test]
    fn test_wrong_arity_classifier_rejected() {
        struct ElevenFeatures;
        impl ProbabilityClassifier for ElevenFeatures {
            fn n_features(&self) -> usize {
                11
            }
            fn predict_proba(&self, _features: &[f64]) -> Result<Vec<f64>, ClassifierError> {
                Ok(vec![0.5, 0.5])
            }
        }

        let err = HormoneUltrasoundPipeline::new(Arc::new(ElevenFeatures))
            .err()
            .expect("must fail");
        assert!(matches!(
            err,
            CyclecareError::SchemaMismatch {
                expected: 12,
                actual: 11,
                ..
            }
        ));
    }

    #[test]
    fn test_symptom_vector_rejected_by_probability_path() {
        let features = assemble(
            SchemaId::SymptomVitals,
            &full_symptom_inputs(),
            MissingValuePolicy::Reject,
        )
        .expect("Should assemble");
        let classifier = FixedProba::new(vec![0.1, 0.9]);
        let err = predict_probability(&features, &classifier).expect_err("must fail");
        assert!(matches!(err, CyclecareError::SchemaMismatch { .. }));
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_label_pipeline_applies_scaling() {
        let classifier = Arc::new(RecordingLabel::new(1));
        let pipeline = SymptomVitalsPipeline::new(Arc::new(ShiftScaler), Arc::clone(&classifier))
            .expect("Should build pipeline");

        let result = pipeline
            .predict(&full_symptom_inputs())
            .expect("Should predict");
        assert_eq!(result.label, DiagnosisLabel::Likely);
        assert!(result.probability.is_none());
        assert!(result.likelihood_percent.is_none());

        let seen = classifier.seen.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        let expected: Vec<f64> = [
            1.0, 0.0, 1.0, 4.0, 25.0, 14.0, 1.0, 1.8, 2.3, 2.5, 60.0, 30.0, 75.0, 22.5, 0.0,
        ]
        .iter()
        .map(|x| x - 1.0)
        .collect();
        assert_eq!(seen[0].len(), 15);
        for (got, want) in seen[0].iter().zip(&expected) {
            assert!((got - want).abs() < 1e-9);
        }
    }

    #[test]
    fn test_evaluation_record_holds_result_and_inputs() {
        let (pipeline, _) = hormone_pipeline(vec![0.27, 0.73]);
        let evaluation = pipeline
            .evaluate(&full_hormone_inputs(), MissingValuePolicy::Reject)
            .expect("Should evaluate");
        let record = evaluation.to_record();

        assert_eq!(record.get("Diagnosis"), Some("PCOS Likely"));
        for column in SchemaId::HormoneUltrasound.columns() {
            assert!(record.get(column).is_some(), "missing column {column}");
        }
        assert_eq!(record.get("BMI"), Some("26.67"));
        assert_eq!(record.get("AMH"), Some("6.1"));
    }

    #[test]
    fn test_label_evaluation_exports_unscaled_inputs() {
        let pipeline = SymptomVitalsPipeline::new(
            Arc::new(ShiftScaler),
            Arc::new(RecordingLabel::new(1)),
        )
        .expect("Should build pipeline");
        let evaluation = pipeline
            .evaluate(&full_symptom_inputs(), MissingValuePolicy::Reject)
            .expect("Should evaluate");

        assert_eq!(evaluation.result.label, DiagnosisLabel::Likely);
        assert_eq!(evaluation.features.get("age"), Some(25.0));
        let record = evaluation.to_record();
        assert_eq!(record.len(), 2 + SchemaId::SymptomVitals.arity());
        assert_eq!(record.get("pulse_rate_bpm"), Some("75"));
    }

    #[test]
    fn test_label_zero_is_unlikely() {
        let pipeline = SymptomVitalsPipeline::new(
            Arc::new(ShiftScaler),
            Arc::new(RecordingLabel::new(0)),
        )
        .expect("Should build pipeline");
        let result = pipeline
            .predict(&full_symptom_inputs())
            .expect("Should predict");
        assert_eq!(result.label, DiagnosisLabel::Unlikely);
    }

    #[test]
    fn test_unexpected_class_rejected() {
        let pipeline = SymptomVitalsPipeline::new(
            Arc::new(ShiftScaler),
            Arc::new(RecordingLabel::new(2)),
        )
        .expect("Should build pipeline");
        let err = pipeline
            .predict(&full_symptom_inputs())
            .expect_err("must fail");
        assert!(matches!(err, CyclecareError::ModelInvocation(_)));
    }

    #[test]
    fn test_classifier_failure_propagates() {
        let pipeline = SymptomVitalsPipeline::new(Arc::new(ShiftScaler), Arc::new(FailingLabel))
            .expect("Should build pipeline");
        let err = pipeline
            .predict(&full_symptom_inputs())
            .expect_err("must fail");
        assert!(matches!(
            err,
            CyclecareError::ModelInvocation(ClassifierError::Failed(_))
        ));
    }
}
