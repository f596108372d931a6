//! Training-time feature schemas.
//!
//! Each schema fixes the field set, order, units and encoding a classifier
//! was trained on. The two schemas are unrelated and must never be mixed:
//! a vector assembled for one is meaningless to the other's classifier.

use serde::{Deserialize, Serialize};

/// Identifies a feature schema and the pipeline built on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaId {
    /// Hormone panel + ultrasound, 12 fields, probability classifier, unscaled
    HormoneUltrasound,
    /// Symptoms + vitals, 15 fields, hard-label classifier, scaled
    SymptomVitals,
}

impl SchemaId {
    #[must_use]
    pub fn id(&self) -> &'static str {
        match self {
            Self::HormoneUltrasound => "hormone_ultrasound",
            Self::SymptomVitals => "symptom_vitals",
        }
    }

    /// Parse an identifier. Accepts `-` in place of `_`.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().replace('-', "_").as_str() {
            "hormone_ultrasound" => Some(Self::HormoneUltrasound),
            "symptom_vitals" => Some(Self::SymptomVitals),
            _ => None,
        }
    }

    /// Field specifications in training column order.
    #[must_use]
    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            Self::HormoneUltrasound => &HORMONE_ULTRASOUND_FIELDS,
            Self::SymptomVitals => &SYMPTOM_VITALS_FIELDS,
        }
    }

    /// Number of features the classifier expects.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.fields().len()
    }

    /// Training column names, in order.
    pub fn columns(&self) -> impl Iterator<Item = &'static str> {
        self.fields().iter().map(|f| f.column)
    }
}

impl std::fmt::Display for SchemaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// How a raw input value is coerced into a feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    /// Continuous value within a plausibility range
    Numeric { min: f64, max: f64 },
    /// Yes/no answer encoded as 0.0 or 1.0
    YesNo,
    /// Integral scale value within inclusive bounds
    Ordinal { min: u8, max: u8 },
    /// Body-mass index, given directly or derived from weight and height
    Bmi,
}

/// One column of a training schema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    /// Key looked up in the raw input
    pub key: &'static str,
    /// Column name the classifier was trained with
    pub column: &'static str,
    pub unit: &'static str,
    pub kind: FieldKind,
}

const fn numeric(
    key: &'static str,
    column: &'static str,
    unit: &'static str,
    min: f64,
    max: f64,
) -> FieldSpec {
    FieldSpec {
        key,
        column,
        unit,
        kind: FieldKind::Numeric { min, max },
    }
}

const fn yes_no(key: &'static str) -> FieldSpec {
    FieldSpec {
        key,
        column: key,
        unit: "0/1",
        kind: FieldKind::YesNo,
    }
}

const fn bmi(column: &'static str) -> FieldSpec {
    FieldSpec {
        key: "bmi",
        column,
        unit: "kg/m²",
        kind: FieldKind::Bmi,
    }
}

/// Hormone panel and ultrasound schema.
pub const HORMONE_ULTRASOUND_FIELDS: [FieldSpec; 12] = [
    numeric("age", "Age", "years", 0.0, 120.0),
    bmi("BMI"),
    numeric("fasting_glucose", "FastingGlucose", "mg/dL", 0.0, 1000.0),
    numeric("fasting_insulin", "FastingInsulin", "µIU/mL", 0.0, 1000.0),
    numeric("lh_fsh_ratio", "LH_FSH_Ratio", "ratio", 0.0, 100.0),
    numeric("amh", "AMH", "ng/mL", 0.0, 200.0),
    numeric("dheas", "DHEAS", "µg/dL", 0.0, 2000.0),
    numeric("prolactin", "Prolactin", "ng/mL", 0.0, 1000.0),
    numeric("tsh", "TSH", "mIU/L", 0.0, 200.0),
    numeric("free_testosterone", "FreeTestosterone", "pg/mL", 0.0, 1000.0),
    numeric("blood_sugar", "BloodSugar", "mg/dL", 0.0, 1500.0),
    FieldSpec {
        key: "symptom_score",
        column: "Score",
        unit: "1-10",
        kind: FieldKind::Ordinal { min: 1, max: 10 },
    },
];

/// Symptom and vitals schema.
pub const SYMPTOM_VITALS_FIELDS: [FieldSpec; 15] = [
    yes_no("hair_growth"),
    yes_no("skin_darkening"),
    yes_no("weight_gain"),
    FieldSpec {
        key: "cycle_regularity",
        column: "cycle_regularity",
        unit: "1-5",
        kind: FieldKind::Ordinal { min: 1, max: 5 },
    },
    numeric("age", "age", "years", 0.0, 120.0),
    numeric("avg_follicle_size_left", "avg_follicle_size_left", "mm", 0.0, 50.0),
    yes_no("pimples"),
    numeric("beta_hcg_ii", "beta_hcg_ii", "mIU/mL", 0.0, 100_000.0),
    numeric("beta_hcg_i", "beta_hcg_i", "mIU/mL", 0.0, 100_000.0),
    numeric("tsh", "tsh", "mIU/L", 0.0, 200.0),
    numeric("weight_kg", "weight_kg", "kg", 0.0, 400.0),
    numeric("cycle_length_days", "cycle_length_days", "days", 0.0, 365.0),
    numeric("pulse_rate_bpm", "pulse_rate_bpm", "bpm", 20.0, 250.0),
    bmi("bmi"),
    yes_no("fast_food"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_arity() {
        assert_eq!(SchemaId::HormoneUltrasound.arity(), 12);
        assert_eq!(SchemaId::SymptomVitals.arity(), 15);
    }

    #[test]
    fn test_keys_unique() {
        for schema in [SchemaId::HormoneUltrasound, SchemaId::SymptomVitals] {
            let keys: HashSet<&str> = schema.fields().iter().map(|f| f.key).collect();
            assert_eq!(keys.len(), schema.arity(), "{schema}");
        }
    }

    #[test]
    fn test_hormone_column_order() {
        let columns: Vec<&str> = SchemaId::HormoneUltrasound.columns().collect();
        assert_eq!(
            columns,
            vec![
                "Age",
                "BMI",
                "FastingGlucose",
                "FastingInsulin",
                "LH_FSH_Ratio",
                "AMH",
                "DHEAS",
                "Prolactin",
                "TSH",
                "FreeTestosterone",
                "BloodSugar",
                "Score",
            ]
        );
    }

    #[test]
    fn test_schema_id_parse() {
        assert_eq!(SchemaId::from_id("symptom-vitals"), Some(SchemaId::SymptomVitals));
        assert_eq!(SchemaId::from_id("hormone_ultrasound"), Some(SchemaId::HormoneUltrasound));
        assert_eq!(SchemaId::from_id("combined"), None);
    }
}
