//! Extraction-side data model: what the Extraction Collaborator produced for one CV,
//! grouped by category and demographic variant.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel for a scalar field the extractor could not find in the document.
pub const NOT_FOUND: &str = "not found";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Experiences,
    Studies,
    Interests,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Experiences, Category::Studies, Category::Interests];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Experiences => "experiences",
            Self::Studies => "studies",
            Self::Interests => "interests",
        }
    }

    /// Joined file name inside a run directory, e.g. `studies.json`.
    pub fn file_name(self) -> String {
        format!("{}.json", self.as_str())
    }

    /// Keys every field map of this category carries after normalization.
    /// Interests are plain strings and have no schema.
    pub fn schema_keys(self) -> &'static [&'static str] {
        match self {
            Self::Experiences => &["company", "job_title", "description", "location", "dates"],
            Self::Studies => &["university", "level_of_degree", "field", "location", "dates"],
            Self::Interests => &[],
        }
    }

    /// Container keys the extractor sometimes wraps the list in.
    pub fn wrapper_keys(self) -> &'static [&'static str] {
        match self {
            Self::Experiences => &["experiences"],
            Self::Studies => &["studies", "education"],
            Self::Interests => &["interests"],
        }
    }

    /// A key whose presence marks a bare object as a single entry of this category.
    pub fn diagnostic_key(self) -> Option<&'static str> {
        match self {
            Self::Experiences => Some("company"),
            Self::Studies => Some("university"),
            Self::Interests => None,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "experiences" | "experience" | "list of professional experiences" => {
                Some(Self::Experiences)
            }
            "studies" | "study" | "education" | "list of studies" => Some(Self::Studies),
            "interests" | "interest" | "list of personal interests" => Some(Self::Interests),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rendering of the CV an extraction came from. `Original` is ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VariantLabel {
    Original,
    Gender,
    Age,
    Origin,
}

impl VariantLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Original => "Original",
            Self::Gender => "Gender",
            Self::Age => "Age",
            Self::Origin => "Origin",
        }
    }

    /// Accepts joined-file keys and extraction file prefixes (`genre` is the
    /// French spelling used by older runs).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "original" => Some(Self::Original),
            "gender" | "genre" => Some(Self::Gender),
            "age" => Some(Self::Age),
            "origin" => Some(Self::Origin),
            _ => None,
        }
    }
}

impl fmt::Display for VariantLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extracted item: a field map for experiences/studies, a bare string for interests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entry {
    Text(String),
    Fields(BTreeMap<String, Value>),
}

impl Entry {
    /// Builds a field-map entry from `(key, value)` string pairs.
    pub fn fields<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Entry::Fields(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect(),
        )
    }

    pub fn text(value: impl Into<String>) -> Self {
        Entry::Text(value.into())
    }

    /// All `(key, text)` pairs that carry information.
    pub fn meaningful_pairs(&self) -> Vec<(String, String)> {
        match self {
            Entry::Text(t) => non_sentinel(t)
                .map(|t| vec![("text".to_string(), t)])
                .unwrap_or_default(),
            Entry::Fields(map) => map
                .iter()
                .filter_map(|(k, v)| {
                    value_text(v)
                        .and_then(|t| non_sentinel(&t))
                        .map(|t| (k.clone(), t))
                })
                .collect(),
        }
    }
}

/// Renders a JSON value as comparable text. Lists are joined, nested maps flattened.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        Value::Object(map) => {
            let parts: Vec<String> = map.values().filter_map(value_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
    }
}

fn non_sentinel(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NOT_FOUND) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Joined per-category file: canonical CV id -> variant key -> entries.
/// Variant keys stay strings on disk so unknown labels do not poison the whole file.
pub type CategoryTable = BTreeMap<String, BTreeMap<String, Vec<Entry>>>;

/// All variants of one candidate for one category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantSet {
    pub cv_id: String,
    pub variants: BTreeMap<VariantLabel, Vec<Entry>>,
}

impl VariantSet {
    pub fn from_table_row(cv_id: &str, row: &BTreeMap<String, Vec<Entry>>) -> Self {
        let variants = row
            .iter()
            .filter_map(|(label, entries)| VariantLabel::parse(label).map(|l| (l, entries.clone())))
            .collect();
        Self {
            cv_id: cv_id.to_string(),
            variants,
        }
    }

    /// Entries for a variant; a variant whose extraction failed is an empty list.
    pub fn get(&self, label: VariantLabel) -> &[Entry] {
        self.variants.get(&label).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn original(&self) -> &[Entry] {
        self.get(VariantLabel::Original)
    }
}
