use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::join::cv_id::canonical_cv_id;
use crate::join::normalize::normalize_payload;
use crate::models::{Category, CategoryTable, VariantLabel};
use crate::util::{read_json, write_json_pretty};

/// Section keys of the single-file-per-variant layout (`original.json` holding every category).
const LEGACY_SECTIONS: [(&str, Category); 3] = [
    ("List of professional experiences", Category::Experiences),
    ("List of studies", Category::Studies),
    ("List of personal interests", Category::Interests),
];

/// One (variant, category) extraction output: free-form CV label -> raw payload.
#[derive(Debug, Clone)]
pub struct RawSource {
    pub variant: VariantLabel,
    pub category: Category,
    pub payload: Value,
}

#[derive(Debug, Default)]
pub struct JoinOutput {
    pub tables: BTreeMap<Category, CategoryTable>,
    /// Free-form label -> canonical CV id, for every label seen.
    pub labels: BTreeMap<String, String>,
    /// Labels dropped because another label of the same variant already claimed their id.
    pub collisions: Vec<String>,
}

impl JoinOutput {
    pub fn table(&self, category: Category) -> Option<&CategoryTable> {
        self.tables.get(&category)
    }
}

/// Pure join: keys every payload by canonical CV id, then variant, and normalizes it.
/// When two labels of one variant resolve to the same id, the first one seen wins.
pub fn join_sources(sources: &[RawSource]) -> JoinOutput {
    let mut output = JoinOutput::default();

    for source in sources {
        let Some(records) = source.payload.as_object() else {
            warn!(
                variant = %source.variant,
                category = %source.category,
                "extraction source is not a label -> payload object, skipping"
            );
            continue;
        };

        let table = output.tables.entry(source.category).or_default();
        for (label, payload) in records {
            let cv_id = canonical_cv_id(label);
            output.labels.insert(label.clone(), cv_id.clone());

            let row = table.entry(cv_id.clone()).or_default();
            let variant_key = source.variant.as_str().to_string();
            if row.contains_key(&variant_key) {
                warn!(
                    label = %label,
                    cv_id = %cv_id,
                    variant = %source.variant,
                    category = %source.category,
                    "duplicate CV label for the same variant, keeping the first"
                );
                output.collisions.push(label.clone());
                continue;
            }
            row.insert(variant_key, normalize_payload(source.category, payload));
        }
    }

    output
}

/// Splits a file stem into (variant, optional category): `genre_studies` -> (Gender, Studies),
/// `original` -> (Original, None).
fn parse_source_stem(stem: &str) -> Option<(VariantLabel, Option<Category>)> {
    match stem.split_once('_') {
        Some((variant, category)) => {
            Some((VariantLabel::parse(variant)?, Some(Category::parse(category)?)))
        }
        None => Some((VariantLabel::parse(stem)?, None)),
    }
}

/// Reads every extraction file of one run directory. Malformed files are reported and skipped.
pub fn load_sources(run_dir: &Path) -> Result<Vec<RawSource>, AppError> {
    let mut paths: Vec<_> = fs::read_dir(run_dir)
        .map_err(|e| AppError::io(run_dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut sources = Vec::new();
    for path in paths {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some((variant, category)) = parse_source_stem(stem) else {
            warn!(path = %path.display(), "unrecognized extraction file name, skipping");
            continue;
        };

        let payload: Value = match read_json(&path) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable extraction file");
                continue;
            }
        };

        match category {
            Some(category) => sources.push(RawSource {
                variant,
                category,
                payload,
            }),
            None => sources.extend(split_legacy_file(variant, &payload)),
        }
    }
    Ok(sources)
}

fn split_legacy_file(variant: VariantLabel, payload: &Value) -> Vec<RawSource> {
    let Some(records) = payload.as_object() else {
        return Vec::new();
    };
    LEGACY_SECTIONS
        .iter()
        .map(|(section, category)| {
            let per_cv = records
                .iter()
                .map(|(label, record)| {
                    let section_payload = record.get(*section).cloned().unwrap_or(Value::Array(Vec::new()));
                    (label.clone(), section_payload)
                })
                .collect();
            RawSource {
                variant,
                category: *category,
                payload: Value::Object(per_cv),
            }
        })
        .collect()
}

/// Joins `<extraction_root>/<run>/` into `<join_root>/<run>/<category>.json`.
pub fn run_join(extraction_root: &Path, join_root: &Path, run: &str) -> Result<JoinOutput, AppError> {
    let input_dir = extraction_root.join(run);
    if !input_dir.is_dir() {
        return Err(AppError::MissingInput {
            run: run.to_string(),
            path: input_dir,
        });
    }

    let sources = load_sources(&input_dir)?;
    if sources.is_empty() {
        return Err(AppError::MissingInput {
            run: run.to_string(),
            path: input_dir,
        });
    }

    let output = join_sources(&sources);
    let output_dir = join_root.join(run);
    for category in Category::ALL {
        let empty = CategoryTable::new();
        let table = output.table(category).unwrap_or(&empty);
        write_json_pretty(&output_dir.join(category.file_name()), table)?;
    }

    info!(
        run = %run,
        cvs = output.labels.values().collect::<std::collections::BTreeSet<_>>().len(),
        collisions = output.collisions.len(),
        "join complete"
    );
    Ok(output)
}
