//! Feature assembly: raw form input -> schema-ordered feature vector.
//!
//! Assembly selects the schema's fields, coerces each value to its training
//! encoding, and emits them in training column order. It never substitutes a
//! value for a missing field unless the caller explicitly asks for a sentinel.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::report::FlatRecord;
use super::schema::{FieldKind, FieldSpec, SchemaId};
use crate::CyclecareError;

/// Raw input keys used to derive BMI when it is not given directly.
pub const WEIGHT_KEY: &str = "weight_kg";
pub const HEIGHT_KEY: &str = "height_cm";

/// A single raw input value as entered by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl RawValue {
    /// Null and blank text count as not provided.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    fn as_yes_no(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Number(n) if *n == 0.0 => Some(false),
            Self::Number(n) if *n == 1.0 => Some(true),
            Self::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "yes" | "y" | "true" | "1" => Some(true),
                "no" | "n" | "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<bool> for RawValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Named raw clinical values, typically deserialized from a form submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawInputs(BTreeMap<String, RawValue>);

impl RawInputs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<RawValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// The value for `key`, if present and not blank.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.0.get(key).filter(|v| !v.is_absent())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// What to do when a plain numeric field is missing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MissingValuePolicy {
    /// Fail with `MissingField`.
    #[default]
    Reject,
    /// Substitute this value and record the field as imputed.
    ///
    /// Applies to numeric lab/vital fields only; yes/no, ordinal and BMI
    /// fields still reject.
    Sentinel(f64),
}

/// Schema-ordered numeric feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ClinicalFeatureVector {
    schema: SchemaId,
    values: Vec<f64>,
    imputed: Vec<&'static str>,
}

impl ClinicalFeatureVector {
    #[must_use]
    pub fn schema(&self) -> SchemaId {
        self.schema
    }

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

    /// Keys of fields filled from a sentinel.
    #[must_use]
    pub fn imputed_fields(&self) -> &[&'static str] {
        &self.imputed
    }

    /// Value of a field by its input key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<f64> {
        self.schema
            .fields()
            .iter()
            .position(|f| f.key == key)
            .map(|i| self.values[i])
    }

    /// Flatten as training column -> value, for export alongside a result.
    #[must_use]
    pub fn to_record(&self) -> FlatRecord {
        let mut record = FlatRecord::new();
        for (column, value) in self.schema.columns().zip(&self.values) {
            record.push(column, value.to_string());
        }
        record
    }
}

/// Body-mass index from weight in kilograms and height in centimetres,
/// rounded to 2 decimal places.
///
/// # Errors
/// `MissingField` if either measurement is absent, `InvalidInput` if either is
/// not a positive finite number.
pub fn compute_bmi(weight_kg: Option<f64>, height_cm: Option<f64>) -> Result<f64, CyclecareError> {
    let weight = weight_kg.ok_or_else(|| bmi_missing(WEIGHT_KEY))?;
    let height = height_cm.ok_or_else(|| bmi_missing(HEIGHT_KEY))?;

    for (name, v) in [(WEIGHT_KEY, weight), (HEIGHT_KEY, height)] {
        if !v.is_finite() || v <= 0.0 {
            return Err(CyclecareError::InvalidInput(format!(
                "{name} must be a positive number, got {v}"
            )));
        }
    }

    let height_m = height / 100.0;
    Ok((weight / (height_m * height_m) * 100.0).round() / 100.0)
}

fn bmi_missing(component: &'static str) -> CyclecareError {
    CyclecareError::MissingField {
        field: "bmi",
        expected: format!("bmi, or both {WEIGHT_KEY} and {HEIGHT_KEY} (missing {component})"),
    }
}

/// Assemble `raw` into the feature vector for `schema`.
///
/// # Errors
/// - `MissingField` for an absent required field (subject to `policy`)
/// - `InvalidInput` for a value that cannot be coerced or is out of range
pub fn assemble(
    schema: SchemaId,
    raw: &RawInputs,
    policy: MissingValuePolicy,
) -> Result<ClinicalFeatureVector, CyclecareError> {
    let fields = schema.fields();
    let mut values = Vec::with_capacity(fields.len());
    let mut imputed = Vec::new();

    for field in fields {
        let value = match coerce_field(field, raw)? {
            Some(v) => v,
            None => match (field.kind, policy) {
                (FieldKind::Numeric { .. }, MissingValuePolicy::Sentinel(sentinel)) => {
                    tracing::warn!(
                        "Field '{}' missing; substituting caller sentinel for {} pipeline",
                        field.key,
                        schema
                    );
                    imputed.push(field.key);
                    sentinel
                }
                _ => return Err(missing(field)),
            },
        };
        values.push(value);
    }

    let ignored = raw
        .keys()
        .filter(|k| *k != WEIGHT_KEY && *k != HEIGHT_KEY && !fields.iter().any(|f| f.key == *k))
        .count();
    tracing::debug!(
        "Assembled {} features for {} ({} ignored inputs, {} imputed)",
        values.len(),
        schema,
        ignored,
        imputed.len()
    );

    Ok(ClinicalFeatureVector {
        schema,
        values,
        imputed,
    })
}

/// Coerce one field; `Ok(None)` means the input is absent.
fn coerce_field(field: &FieldSpec, raw: &RawInputs) -> Result<Option<f64>, CyclecareError> {
    if let Some(value) = raw.get(field.key) {
        return coerce_value(field, value).map(Some);
    }
    if field.kind == FieldKind::Bmi {
        return derive_bmi(raw).map(Some);
    }
    Ok(None)
}

fn coerce_value(field: &FieldSpec, value: &RawValue) -> Result<f64, CyclecareError> {
    match field.kind {
        FieldKind::Numeric { min, max } => {
            let n = value
                .as_number()
                .filter(|n| n.is_finite())
                .ok_or_else(|| invalid(field, "a finite number", value))?;
            if !(min..=max).contains(&n) {
                return Err(invalid(
                    field,
                    &format!("a value in [{min}, {max}] {}", field.unit),
                    value,
                ));
            }
            Ok(n)
        }
        FieldKind::YesNo => match value.as_yes_no() {
            Some(true) => Ok(1.0),
            Some(false) => Ok(0.0),
            None => Err(invalid(field, "yes or no", value)),
        },
        FieldKind::Ordinal { min, max } => {
            let expected = format!("an integer from {min} to {max}");
            let n = value
                .as_number()
                .ok_or_else(|| invalid(field, &expected, value))?;
            if n.fract() != 0.0 || n < f64::from(min) || n > f64::from(max) {
                return Err(invalid(field, &expected, value));
            }
            Ok(n)
        }
        FieldKind::Bmi => value
            .as_number()
            .filter(|n| n.is_finite() && *n > 0.0)
            .ok_or_else(|| invalid(field, "a positive number", value)),
    }
}

fn derive_bmi(raw: &RawInputs) -> Result<f64, CyclecareError> {
    let measurement = |key: &str| -> Result<Option<f64>, CyclecareError> {
        raw.get(key)
            .map(|v| {
                v.as_number()
                    .ok_or_else(|| CyclecareError::InvalidInput(format!("{key} must be a number")))
            })
            .transpose()
    };

    compute_bmi(measurement(WEIGHT_KEY)?, measurement(HEIGHT_KEY)?)
}

fn missing(field: &FieldSpec) -> CyclecareError {
    let expected = match field.kind {
        FieldKind::Numeric { .. } => format!("a number in {}", field.unit),
        FieldKind::YesNo => "yes or no".to_string(),
        FieldKind::Ordinal { min, max } => format!("an integer from {min} to {max}"),
        FieldKind::Bmi => format!("bmi, or both {WEIGHT_KEY} and {HEIGHT_KEY}"),
    };
    CyclecareError::MissingField {
        field: field.key,
        expected,
    }
}

fn invalid(field: &FieldSpec, expected: &str, got: &RawValue) -> CyclecareError {
    let got = match got {
        RawValue::Null => "null".to_string(),
        RawValue::Bool(b) => b.to_string(),
        RawValue::Number(n) => n.to_string(),
        RawValue::Text(s) => format!("'{s}'"),
    };
    CyclecareError::InvalidInput(format!("{}: expected {expected}, got {got}", field.key))
}
