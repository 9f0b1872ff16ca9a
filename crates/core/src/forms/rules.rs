//! Derived values computed from questionnaire answers.

use serde::{Deserialize, Serialize};

use super::{DerivedRule, Submission};

pub const INCLUSION_FIELDS: [&str; 6] = [
    "inclusion_1",
    "inclusion_2",
    "inclusion_3",
    "inclusion_4",
    "inclusion_5",
    "inclusion_6",
];

pub const IMMEDIATE_EXCLUSION_FIELDS: [&str; 5] = [
    "immediate_exclusion_1",
    "immediate_exclusion_2",
    "immediate_exclusion_3",
    "immediate_exclusion_4",
    "immediate_exclusion_5",
];

pub const SECONDARY_EXCLUSION_FIELDS: [&str; 6] = [
    "secondary_exclusion_1",
    "secondary_exclusion_2",
    "secondary_exclusion_3",
    "secondary_exclusion_4",
    "secondary_exclusion_5",
    "secondary_exclusion_6",
];

/// Number of secondary exclusions that together disqualify a subject.
pub const SECONDARY_EXCLUSION_LIMIT: usize = 3;

pub const SF36_DOMAIN_FIELDS: [&str; 8] = [
    "domain_1", "domain_2", "domain_3", "domain_4", "domain_5", "domain_6", "domain_7",
    "domain_8",
];

/// Missing or blank answers are not "yes".
fn is_yes(submission: &Submission, field: &str) -> bool {
    submission
        .field(field)
        .is_some_and(|value| value.eq_ignore_ascii_case("yes"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityVerdict {
    pub eligible: bool,
    pub inclusion_met: bool,
    pub immediate_exclusion: bool,
    pub secondary_exclusions: usize,
}

/// Eligible iff every inclusion criterion is met, no immediate exclusion applies, and fewer
/// than three secondary exclusions apply.
pub fn evaluate_eligibility(submission: &Submission) -> EligibilityVerdict {
    let inclusion_met = INCLUSION_FIELDS
        .iter()
        .all(|field| is_yes(submission, field));
    let immediate_exclusion = IMMEDIATE_EXCLUSION_FIELDS
        .iter()
        .any(|field| is_yes(submission, field));
    let secondary_exclusions = SECONDARY_EXCLUSION_FIELDS
        .iter()
        .filter(|field| is_yes(submission, field))
        .count();

    EligibilityVerdict {
        eligible: inclusion_met
            && !immediate_exclusion
            && secondary_exclusions < SECONDARY_EXCLUSION_LIMIT,
        inclusion_met,
        immediate_exclusion,
        secondary_exclusions,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sf36Summary {
    /// Raw values as entered, `None` where missing.
    pub scores: Vec<Option<String>>,
    pub average: f64,
}

impl Sf36Summary {
    /// Average with one decimal place, as printed and stored.
    pub fn formatted(&self) -> String {
        format!("{:.1}", self.average)
    }
}

/// Mean of the eight domain scores; missing or unparsable scores count as zero.
pub fn sf36_summary(submission: &Submission) -> Sf36Summary {
    let scores: Vec<Option<String>> = SF36_DOMAIN_FIELDS
        .iter()
        .map(|field| submission.field(field).map(str::to_string))
        .collect();

    let sum: f64 = scores
        .iter()
        .map(|score| {
            score
                .as_deref()
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|n| n.is_finite())
                .unwrap_or(0.0)
        })
        .sum();

    Sf36Summary {
        scores,
        average: sum / SF36_DOMAIN_FIELDS.len() as f64,
    }
}

/// The derived value of a submission, according to its form's rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Derived {
    None,
    Eligibility(EligibilityVerdict),
    Sf36(Sf36Summary),
}

impl Derived {
    pub fn compute(submission: &Submission) -> Self {
        match submission.descriptor().derived {
            DerivedRule::None => Derived::None,
            DerivedRule::Eligibility => Derived::Eligibility(evaluate_eligibility(submission)),
            DerivedRule::Sf36Average => Derived::Sf36(sf36_summary(submission)),
        }
    }

    pub fn eligible(&self) -> Option<bool> {
        match self {
            Derived::Eligibility(verdict) => Some(verdict.eligible),
            _ => None,
        }
    }

    pub fn sf36_average(&self) -> Option<String> {
        match self {
            Derived::Sf36(summary) => Some(summary.formatted()),
            _ => None,
        }
    }
}
