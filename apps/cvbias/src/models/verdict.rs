//! Audit-side data model: the demographic dimension under test and the verdict the
//! audit engine produces for one (CV, category, dimension) triple.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::extraction::{Category, VariantLabel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Gender,
    Age,
    Origin,
    /// Form-fidelity audits: reference CV content vs. what the extractor returned.
    Extraction,
}

impl Dimension {
    /// Demographic dimensions tested simultaneously in a bias run.
    pub const BIAS: [Dimension; 3] = [Dimension::Gender, Dimension::Age, Dimension::Origin];

    /// Lowercase slug used in persisted file names (`audit_<slug>_<category>.json`).
    pub fn slug(self) -> &'static str {
        match self {
            Self::Gender => "gender",
            Self::Age => "age",
            Self::Origin => "origin",
            Self::Extraction => "extraction",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gender => "Gender",
            Self::Age => "Age",
            Self::Origin => "Origin",
            Self::Extraction => "Extraction",
        }
    }

    /// The variant judged against `Original` for this dimension.
    pub fn variant_label(self) -> Option<VariantLabel> {
        match self {
            Self::Gender => Some(VariantLabel::Gender),
            Self::Age => Some(VariantLabel::Age),
            Self::Origin => Some(VariantLabel::Origin),
            Self::Extraction => None,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "gender" | "genre" => Some(Self::Gender),
            "age" | "âge" => Some(Self::Age),
            "origin" | "origine" => Some(Self::Origin),
            "extraction" | "form" => Some(Self::Extraction),
            _ => None,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nonconformance class. `JudgeFailure` marks an infrastructure failure of the judge
/// (timeout, transport, unparseable reply) and is never a semantic finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Option<String>")]
pub enum ErrorType {
    #[default]
    None,
    Omission,
    Hallucination,
    Modification,
    JudgeFailure,
}

impl ErrorType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Omission => "Omission",
            Self::Hallucination => "Hallucination",
            Self::Modification => "Modification",
            Self::JudgeFailure => "JudgeFailure",
        }
    }

    /// Lenient parse for model output and legacy verdict files, which sometimes carry
    /// lowercase names or compound labels such as "Omission / Modification". Compound
    /// labels resolve to the most severe type named.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let lower = raw.trim().to_lowercase();
        if lower.is_empty() || lower == "none" || lower == "null" || lower == "consistent" {
            return Some(Self::None);
        }
        if lower.contains("judgefailure") || lower.contains("judge failure") {
            return Some(Self::JudgeFailure);
        }
        if lower.contains("modification") {
            return Some(Self::Modification);
        }
        if lower.contains("omission") {
            return Some(Self::Omission);
        }
        if lower.contains("hallucination") {
            return Some(Self::Hallucination);
        }
        None
    }
}

impl TryFrom<Option<String>> for ErrorType {
    type Error = String;

    fn try_from(raw: Option<String>) -> Result<Self, Self::Error> {
        match raw {
            None => Ok(Self::None),
            Some(s) => Self::parse_lenient(&s).ok_or_else(|| format!("unknown error_type '{s}'")),
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable outcome of one audit call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditVerdict {
    pub cv_id: String,
    pub dimension: Dimension,
    pub category: Category,
    pub coherent: bool,
    /// The variant extraction was structurally empty while Original was not.
    pub empty_list: bool,
    pub error_type: ErrorType,
    pub details: String,
}

impl AuditVerdict {
    pub fn is_judge_failure(&self) -> bool {
        self.error_type == ErrorType::JudgeFailure
    }

    /// A semantic nonconformance found by judgment or by the empty-variant override.
    pub fn is_error(&self) -> bool {
        !self.coherent && !self.is_judge_failure()
    }
}
