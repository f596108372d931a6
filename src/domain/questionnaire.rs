//! Symptom questionnaire and Rotterdam-style criteria counting.
//!
//! Eleven yes/no questions are grouped into three criteria buckets. Bucket
//! membership is an explicit per-question mapping, so reordering or adding
//! questions cannot silently move an answer into a different criterion.

use serde::{Deserialize, Serialize};

use super::diagnosis::{RiskAssessment, RiskLevel};
use crate::CyclecareError;

/// Number of questions in the questionnaire.
pub const QUESTION_COUNT: usize = 11;

/// A Rotterdam diagnostic criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriteriaBucket {
    /// Irregular or absent ovulation
    OvulatoryDysfunction,
    /// Clinical signs of androgen excess
    Hyperandrogenism,
    /// Ultrasound morphology
    PolycysticOvaries,
}

impl CriteriaBucket {
    /// All buckets, in reporting order.
    pub const ALL: [CriteriaBucket; 3] = [
        Self::OvulatoryDysfunction,
        Self::Hyperandrogenism,
        Self::PolycysticOvaries,
    ];

    /// Human-readable criterion name.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::OvulatoryDysfunction => "Ovulatory dysfunction",
            Self::Hyperandrogenism => "Hyperandrogenism",
            Self::PolycysticOvaries => "Polycystic ovaries",
        }
    }
}

impl std::fmt::Display for CriteriaBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One of the eleven questionnaire items.
///
/// The declaration order is the documented positional order accepted by
/// [`assess`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Question {
    CycleLongerThan35Days,
    CycleTotallyVariable,
    FewerThanEightPeriodsPerYear,
    ExcessHairGrowth,
    PersistentAcne,
    ScalpHairThinning,
    /// 12 or more follicles per ovary on ultrasound
    HighFollicleCount,
    /// Ovarian volume above 10 cm³
    EnlargedOvarianVolume,
    UnexplainedWeightGain,
    HormonalContraception,
    OvariesOrUterusRemoved,
}

impl Question {
    /// All questions in positional order.
    pub const ALL: [Question; QUESTION_COUNT] = [
        Self::CycleLongerThan35Days,
        Self::CycleTotallyVariable,
        Self::FewerThanEightPeriodsPerYear,
        Self::ExcessHairGrowth,
        Self::PersistentAcne,
        Self::ScalpHairThinning,
        Self::HighFollicleCount,
        Self::EnlargedOvarianVolume,
        Self::UnexplainedWeightGain,
        Self::HormonalContraception,
        Self::OvariesOrUterusRemoved,
    ];

    /// The criterion this question contributes to.
    ///
    /// `None` marks informational questions, which are collected for clinical
    /// context and never counted.
    #[must_use]
    pub fn bucket(&self) -> Option<CriteriaBucket> {
        match self {
            Self::CycleLongerThan35Days
            | Self::CycleTotallyVariable
            | Self::FewerThanEightPeriodsPerYear => Some(CriteriaBucket::OvulatoryDysfunction),
            Self::ExcessHairGrowth | Self::PersistentAcne | Self::ScalpHairThinning => {
                Some(CriteriaBucket::Hyperandrogenism)
            }
            Self::HighFollicleCount | Self::EnlargedOvarianVolume => {
                Some(CriteriaBucket::PolycysticOvaries)
            }
            Self::UnexplainedWeightGain
            | Self::HormonalContraception
            | Self::OvariesOrUterusRemoved => None,
        }
    }

    /// Stable identifier used in requests and exports.
    #[must_use]
    pub fn id(&self) -> &'static str {
        match self {
            Self::CycleLongerThan35Days => "cycle_longer_than_35_days",
            Self::CycleTotallyVariable => "cycle_totally_variable",
            Self::FewerThanEightPeriodsPerYear => "fewer_than_eight_periods_per_year",
            Self::ExcessHairGrowth => "excess_hair_growth",
            Self::PersistentAcne => "persistent_acne",
            Self::ScalpHairThinning => "scalp_hair_thinning",
            Self::HighFollicleCount => "high_follicle_count",
            Self::EnlargedOvarianVolume => "enlarged_ovarian_volume",
            Self::UnexplainedWeightGain => "unexplained_weight_gain",
            Self::HormonalContraception => "hormonal_contraception",
            Self::OvariesOrUterusRemoved => "ovaries_or_uterus_removed",
        }
    }

    /// Look a question up by its identifier.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|q| q.id() == id)
    }

    fn position(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for Question {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// A single yes/no answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomAnswer {
    pub question: Question,
    pub value: bool,
}

impl SymptomAnswer {
    #[must_use]
    pub fn new(question: Question, value: bool) -> Self {
        Self { question, value }
    }
}

/// A complete questionnaire: every question answered exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Questionnaire {
    answers: [bool; QUESTION_COUNT],
}

impl Questionnaire {
    /// Build from answers in the documented positional order.
    ///
    /// # Errors
    /// Returns `InvalidInput` unless exactly eleven answers are given.
    pub fn from_positional(answers: &[bool]) -> Result<Self, CyclecareError> {
        let answers: [bool; QUESTION_COUNT] = answers.try_into().map_err(|_| {
            CyclecareError::InvalidInput(format!(
                "expected {QUESTION_COUNT} answers, got {}",
                answers.len()
            ))
        })?;
        Ok(Self { answers })
    }

    /// Build from named answers, in any order.
    ///
    /// # Errors
    /// Returns `InvalidInput` if a question is answered twice or left out.
    pub fn from_answers(answers: &[SymptomAnswer]) -> Result<Self, CyclecareError> {
        let mut slots: [Option<bool>; QUESTION_COUNT] = [None; QUESTION_COUNT];

        for answer in answers {
            let slot = &mut slots[answer.question.position()];
            if slot.is_some() {
                return Err(CyclecareError::InvalidInput(format!(
                    "question {} answered more than once",
                    answer.question
                )));
            }
            *slot = Some(answer.value);
        }

        let missing: Vec<&str> = Question::ALL
            .iter()
            .filter(|q| slots[q.position()].is_none())
            .map(Question::id)
            .collect();
        if !missing.is_empty() {
            return Err(CyclecareError::InvalidInput(format!(
                "unanswered questions: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            answers: slots.map(|s| s.unwrap_or(false)),
        })
    }

    /// The answer given to `question`.
    #[must_use]
    pub fn answer(&self, question: Question) -> bool {
        self.answers[question.position()]
    }

    /// Whether at least one answer in `bucket` is yes.
    #[must_use]
    pub fn bucket_met(&self, bucket: CriteriaBucket) -> bool {
        Question::ALL
            .iter()
            .filter(|q| q.bucket() == Some(bucket))
            .any(|q| self.answer(*q))
    }

    /// Count satisfied criteria and classify.
    #[must_use]
    pub fn assess(&self) -> RiskAssessment {
        let buckets_met: Vec<CriteriaBucket> = CriteriaBucket::ALL
            .into_iter()
            .filter(|b| self.bucket_met(*b))
            .collect();
        let criteria_met = buckets_met.len() as u8;

        RiskAssessment {
            level: RiskLevel::from_criteria_count(criteria_met),
            criteria_met,
            buckets_met,
        }
    }
}

/// Score eleven positional answers.
///
/// # Errors
/// Returns `InvalidInput` when `answers.len() != 11`.
pub fn assess(answers: &[bool]) -> Result<RiskAssessment, CyclecareError> {
    Ok(Questionnaire::from_positional(answers)?.assess())
}

/// Score named answers.
///
/// # Errors
/// Returns `InvalidInput` if the answers do not cover each question exactly once.
pub fn assess_answers(answers: &[SymptomAnswer]) -> Result<RiskAssessment, CyclecareError> {
    Ok(Questionnaire::from_answers(answers)?.assess())
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: bool = true;
    const F: bool = false;

    fn bits(mask: u16) -> Vec<bool> {
        (0..QUESTION_COUNT).map(|i| mask & (1 << i) != 0).collect()
    }

    #[test]
    fn test_all_no_is_low() {
        let result = assess(&[F; 11]).expect("Should assess");
        assert_eq!(result.level, RiskLevel::Low);
        assert_eq!(result.criteria_met, 0);
        assert!(result.buckets_met.is_empty());
    }

    #[test]
    fn test_single_bucket_is_moderate() {
        let result = assess(&[T, F, F, F, F, F, F, F, F, F, F]).expect("Should assess");
        assert_eq!(result.level, RiskLevel::Moderate);
        assert_eq!(result.criteria_met, 1);

        for question in Question::ALL.iter().filter(|q| q.bucket().is_some()) {
            let answers: Vec<SymptomAnswer> = Question::ALL
                .iter()
                .map(|q| SymptomAnswer::new(*q, q == question))
                .collect();
            let result = assess_answers(&answers).expect("Should assess");
            assert_eq!(result.level, RiskLevel::Moderate, "question {question}");
            assert_eq!(result.buckets_met, vec![question.bucket().unwrap()]);
        }
    }

    #[test]
    fn test_two_and_three_buckets_are_high() {
        let two = assess(&[F, F, T, F, T, F, F, F, F, F, F]).expect("Should assess");
        assert_eq!(two.level, RiskLevel::High);
        assert_eq!(two.criteria_met, 2);

        let three = assess(&[T, F, F, T, F, F, T, F, F, F, F]).expect("Should assess");
        assert_eq!(three.level, RiskLevel::High);
        assert_eq!(three.criteria_met, 3);
    }

    #[test]
    fn test_informational_answers_never_count() {
        let result = assess(&[F, F, F, F, F, F, F, F, T, T, T]).expect("Should assess");
        assert_eq!(result.level, RiskLevel::Low);
        assert_eq!(result.criteria_met, 0);
    }

    #[test]
    fn test_wrong_length_rejected() {
        for len in [0, 8, 10, 12] {
            let err = assess(&vec![T; len]).expect_err("Should reject");
            assert!(matches!(err, CyclecareError::InvalidInput(_)));
        }
    }

    #[test]
    fn test_exhaustive_total_and_deterministic() {
        for mask in 0u16..(1 << QUESTION_COUNT) {
            let answers = bits(mask);
            let first = assess(&answers).expect("Should assess");
            let second = assess(&answers).expect("Should assess");
            assert_eq!(first, second);

            let expected = [0..3usize, 3..6, 6..8]
                .into_iter()
                .filter(|r| answers[r.clone()].iter().any(|a| *a))
                .count() as u8;
            assert_eq!(first.criteria_met, expected, "mask {mask:#013b}");
            assert_eq!(first.level, RiskLevel::from_criteria_count(expected));
        }
    }

    #[test]
    fn test_named_answers_match_positional() {
        let positional = [F, T, F, F, F, F, F, T, T, F, F];
        let mut named: Vec<SymptomAnswer> = Question::ALL
            .iter()
            .zip(positional)
            .map(|(q, v)| SymptomAnswer::new(*q, v))
            .collect();
        named.reverse();

        assert_eq!(
            assess(&positional).expect("Should assess"),
            assess_answers(&named).expect("Should assess")
        );
    }

    #[test]
    fn test_duplicate_and_missing_answers_rejected() {
        let mut answers: Vec<SymptomAnswer> = Question::ALL
            .iter()
            .map(|q| SymptomAnswer::new(*q, false))
            .collect();
        answers.push(SymptomAnswer::new(Question::PersistentAcne, true));
        let err = assess_answers(&answers).expect_err("Should reject duplicate");
        assert!(err.to_string().contains("persistent_acne"));

        let err = assess_answers(&answers[..9]).expect_err("Should reject missing");
        assert!(err.to_string().contains("hormonal_contraception"));
    }

    #[test]
    fn test_question_ids_roundtrip() {
        for question in Question::ALL {
            assert_eq!(Question::from_id(question.id()), Some(question));
        }
        assert_eq!(Question::from_id("unknown"), None);
    }

    #[test]
    fn test_bucket_sizes() {
        let count = |b| Question::ALL.iter().filter(|q| q.bucket() == Some(b)).count();
        assert_eq!(count(CriteriaBucket::OvulatoryDysfunction), 3);
        assert_eq!(count(CriteriaBucket::Hyperandrogenism), 3);
        assert_eq!(count(CriteriaBucket::PolycysticOvaries), 2);
    }
}
