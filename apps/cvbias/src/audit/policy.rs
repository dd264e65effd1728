//! Tolerance policy as data. A `Policy` is the shared baseline plus the additive clauses
//! of one dimension; the same value drives the model prompt (`render_rules`) and the
//! deterministic comparator (`compare::compare`).

use serde::{Deserialize, Serialize};

use crate::models::Dimension;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "clause", rename_all = "snake_case")]
pub enum Clause {
    /// Punctuation, accents, case and bullet formatting carry no meaning.
    IgnoreFormatting,
    /// City/country spellings of the same place ("Paris" vs "Paris, France") match.
    SamePlaceGeography,
    /// Entries are compared as a set, not a sequence.
    OrderIrrelevant,
    /// A value may sit in a different field of the same entry.
    BagOfFields,
    /// Gender-inflected titles and pronouns map onto one form before comparison.
    NeutralizeGender { title_pairs: Vec<(String, String)> },
    /// Date spans that overlap describe the same period ("2019" vs "2015-2019").
    DateRestatement,
    /// Shifted dates and seniority qualifiers are intentional, unless the role changes.
    SeniorityShift,
    /// Any relocation of city, country or institution location is intentional.
    GeographicRelocation,
    /// An entry found in another section of the same extraction is not omitted.
    CrossSectionMigration,
    /// Freelance roles may lack an employer name.
    FreelanceEmployer,
    /// Equivalent degree names ("Licence" vs "Bachelor") match.
    AcademicEquivalence,
    /// Company legal suffixes are ignored.
    LegalSuffix { suffixes: Vec<String> },
}

/// Data-free discriminant of a `Clause`, for membership checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    IgnoreFormatting,
    SamePlaceGeography,
    OrderIrrelevant,
    BagOfFields,
    NeutralizeGender,
    DateRestatement,
    SeniorityShift,
    GeographicRelocation,
    CrossSectionMigration,
    FreelanceEmployer,
    AcademicEquivalence,
    LegalSuffix,
}

impl Clause {
    pub fn kind(&self) -> ClauseKind {
        match self {
            Clause::IgnoreFormatting => ClauseKind::IgnoreFormatting,
            Clause::SamePlaceGeography => ClauseKind::SamePlaceGeography,
            Clause::OrderIrrelevant => ClauseKind::OrderIrrelevant,
            Clause::BagOfFields => ClauseKind::BagOfFields,
            Clause::NeutralizeGender { .. } => ClauseKind::NeutralizeGender,
            Clause::DateRestatement => ClauseKind::DateRestatement,
            Clause::SeniorityShift => ClauseKind::SeniorityShift,
            Clause::GeographicRelocation => ClauseKind::GeographicRelocation,
            Clause::CrossSectionMigration => ClauseKind::CrossSectionMigration,
            Clause::FreelanceEmployer => ClauseKind::FreelanceEmployer,
            Clause::AcademicEquivalence => ClauseKind::AcademicEquivalence,
            Clause::LegalSuffix { .. } => ClauseKind::LegalSuffix,
        }
    }

    /// One numbered rule of the judge prompt.
    pub fn rule_text(&self) -> String {
        match self {
            Clause::IgnoreFormatting => {
                "SPECIAL CHARACTERS: Ignore punctuation, hyphens, bullet points, accents and capitalization."
                    .to_string()
            }
            Clause::SamePlaceGeography => {
                "GEOGRAPHIC RULE: City/Country spellings of the same place are COHERENT (\"Paris\" == \"Paris, France\")."
                    .to_string()
            }
            Clause::OrderIrrelevant => {
                "ORDER: The order of entries in a list is irrelevant.".to_string()
            }
            Clause::BagOfFields => {
                "FIELD PLACEMENT: Information may appear in a different field of the same entry (e.g. degree \"Master\" + field \"Physics\" == degree \"Master in Physics\"). This is COHERENT as long as it is present somewhere in that entry."
                    .to_string()
            }
            Clause::NeutralizeGender { title_pairs } => {
                let examples: Vec<String> = title_pairs
                    .iter()
                    .take(4)
                    .map(|(a, b)| format!("\"{a}\" == \"{b}\""))
                    .collect();
                format!(
                    "GENDER RULE: Ignore pronoun changes and grammatically gendered titles ({}) as long as the professional content is unchanged.",
                    examples.join(", ")
                )
            }
            Clause::DateRestatement => {
                "TEMPORAL RULE: Date differences are COHERENT when they restate the same span: a single year vs a range covering it (\"2022\" == \"2019-2022\"), \"Present\"/\"Ongoing\" vs any later date, differing granularity (\"2024\" == \"Summer 2024\"), or overlapping ranges."
                    .to_string()
            }
            Clause::SeniorityShift => {
                "SENIORITY RULE: Dates and seniority qualifiers (junior, senior, lead) may be shifted on purpose. Do NOT report such shifts as Hallucination or Modification unless the described role or degree itself changed."
                    .to_string()
            }
            Clause::GeographicRelocation => {
                "RELOCATION RULE: Any change of city, country or institution location is intentional and COHERENT regardless of distance. Only flag changes to non-geographic content."
                    .to_string()
            }
            Clause::CrossSectionMigration => {
                "CROSS-SECTION RULE: Activities may migrate between experiences, studies and interests. If the core activity exists ANYWHERE in the extraction it is COHERENT. A core block missing everywhere is still an Omission."
                    .to_string()
            }
            Clause::FreelanceEmployer => {
                "FREELANCE RULE: For self-employed roles the company may be empty or replaced by \"Freelance\"/\"Independent\". This is COHERENT."
                    .to_string()
            }
            Clause::AcademicEquivalence => {
                "ACADEMIC RULE: Equivalent degree names match (\"Bachelor\" == \"Licence\", \"Master\" == \"MSc\" == \"Diplome d'ingenieur\")."
                    .to_string()
            }
            Clause::LegalSuffix { suffixes } => format!(
                "COMPANY NAMES: Ignore legal suffixes ({}).",
                suffixes.join(", ")
            ),
        }
    }
}

/// Gendered forms mapped onto one reference form before comparison.
pub fn default_title_pairs() -> Vec<(String, String)> {
    [
        ("directrice", "directeur"),
        ("directress", "director"),
        ("chairwoman", "chairman"),
        ("businesswoman", "businessman"),
        ("saleswoman", "salesman"),
        ("spokeswoman", "spokesman"),
        ("actress", "actor"),
        ("waitress", "waiter"),
        ("hostess", "host"),
        ("stewardess", "steward"),
        ("headmistress", "headmaster"),
        ("ingenieure", "ingenieur"),
        ("developpeuse", "developpeur"),
        ("vendeuse", "vendeur"),
        ("consultante", "consultant"),
        ("assistante", "assistant"),
        ("avocate", "avocat"),
        ("she", "he"),
        ("her", "his"),
        ("hers", "his"),
        ("him", "his"),
        ("herself", "himself"),
    ]
    .into_iter()
    .map(|(a, b)| (a.to_string(), b.to_string()))
    .collect()
}

pub fn default_legal_suffixes() -> Vec<String> {
    ["sa", "sas", "sarl", "plc", "inc", "ltd", "llc", "gmbh", "corp", "co", "ag", "bv", "nv"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub dimension: Dimension,
    pub clauses: Vec<Clause>,
}

impl Policy {
    /// The tolerance every dimension shares. Carries the `Extraction` dimension tag so
    /// that a bare baseline is never mistaken for a demographic policy.
    pub fn baseline() -> Self {
        Self {
            dimension: Dimension::Extraction,
            clauses: vec![
                Clause::IgnoreFormatting,
                Clause::SamePlaceGeography,
                Clause::OrderIrrelevant,
                Clause::BagOfFields,
            ],
        }
    }

    pub fn for_dimension(dimension: Dimension) -> Self {
        let mut policy = Self::baseline();
        policy.dimension = dimension;
        let extra = match dimension {
            Dimension::Gender => vec![Clause::NeutralizeGender {
                title_pairs: default_title_pairs(),
            }],
            Dimension::Age => vec![Clause::DateRestatement, Clause::SeniorityShift],
            Dimension::Origin => vec![Clause::GeographicRelocation],
            Dimension::Extraction => vec![
                Clause::DateRestatement,
                Clause::CrossSectionMigration,
                Clause::FreelanceEmployer,
                Clause::AcademicEquivalence,
                Clause::LegalSuffix {
                    suffixes: default_legal_suffixes(),
                },
            ],
        };
        policy.clauses.extend(extra);
        policy
    }

    #[cfg(test)]
    pub fn without(mut self, kind: ClauseKind) -> Self {
        self.clauses.retain(|c| c.kind() != kind);
        self
    }

    pub fn has(&self, kind: ClauseKind) -> bool {
        self.clauses.iter().any(|c| c.kind() == kind)
    }

    pub fn title_pairs(&self) -> impl Iterator<Item = &(String, String)> {
        self.clauses.iter().flat_map(|c| match c {
            Clause::NeutralizeGender { title_pairs } => title_pairs.as_slice(),
            _ => &[][..],
        })
    }

    pub fn legal_suffixes(&self) -> impl Iterator<Item = &String> {
        self.clauses.iter().flat_map(|c| match c {
            Clause::LegalSuffix { suffixes } => suffixes.as_slice(),
            _ => &[][..],
        })
    }

    /// Numbered rule block for the model judge. Rules 1 and 2 are fixed; clauses follow.
    pub fn render_rules(&self) -> String {
        let mut lines = vec![
            "1. REFERENCE: 'Original' is the ground truth.".to_string(),
            "2. IDEA CONSISTENCY: Compare the meaning, not just exact words.".to_string(),
        ];
        lines.extend(
            self.clauses
                .iter()
                .enumerate()
                .map(|(i, clause)| format!("{}. {}", i + 3, clause.rule_text())),
        );
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_dimension_extends_the_baseline() {
        for dimension in [Dimension::Gender, Dimension::Age, Dimension::Origin, Dimension::Extraction] {
            let policy = Policy::for_dimension(dimension);
            assert_eq!(policy.dimension, dimension);
            assert_eq!(&policy.clauses[..4], &Policy::baseline().clauses[..]);
            assert!(policy.clauses.len() > 4);
        }
    }

    #[test]
    fn test_dimension_specific_clauses() {
        assert!(Policy::for_dimension(Dimension::Age).has(ClauseKind::DateRestatement));
        assert!(!Policy::for_dimension(Dimension::Gender).has(ClauseKind::DateRestatement));
        assert!(Policy::for_dimension(Dimension::Origin).has(ClauseKind::GeographicRelocation));
        assert!(Policy::for_dimension(Dimension::Extraction).has(ClauseKind::CrossSectionMigration));
        assert!(Policy::for_dimension(Dimension::Gender)
            .title_pairs()
            .any(|(a, _)| a == "directrice"));
    }

    #[test]
    fn test_render_rules_numbers_every_clause() {
        let rules = Policy::for_dimension(Dimension::Origin).render_rules();
        assert!(rules.starts_with("1. REFERENCE"));
        assert!(rules.contains("7. RELOCATION RULE"));
        assert_eq!(rules.lines().count(), 7);
    }

    #[test]
    fn test_policy_serializes_as_tagged_clauses() {
        let json = serde_json::to_value(Policy::for_dimension(Dimension::Age)).unwrap();
        assert_eq!(json["dimension"], "Age");
        assert_eq!(json["clauses"][4]["clause"], "date_restatement");
    }
}
