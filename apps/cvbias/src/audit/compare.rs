//! Deterministic comparator. Pairs Original and Variant entries without regard to order,
//! then compares each pair as a bag of fields split into content, dates and locations.
//!
//! A value counts as present when its tokens are covered anywhere in the paired entry,
//! so values that moved between fields of one entry do not surface as errors.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::audit::policy::{ClauseKind, Policy};
use crate::models::{Entry, ErrorType};

const DATE_KEYS: &[&str] = &["dates", "date", "start_date", "end_date", "year", "period", "duration"];
const LOCATION_KEYS: &[&str] = &["location", "city", "country", "address", "country or city"];

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "in", "at", "and", "for", "on", "to", "with", "de", "d", "du", "des",
    "la", "le", "les", "l", "et", "en", "au", "aux",
];

const SENIORITY_TOKENS: &[&str] = &[
    "junior", "senior", "lead", "principal", "chief", "head", "associate", "assistant", "intern",
    "trainee", "apprentice", "stagiaire", "confirme", "experimente", "sr", "jr",
];

const FREELANCE_MARKERS: &[&str] = &[
    "freelance", "freelancer", "independent", "independant", "self employed", "auto entrepreneur",
    "autoentrepreneur",
];

const ONGOING_MARKERS: &[&str] = &[
    "present", "current", "currently", "ongoing", "now", "today", "since", "aujourd hui",
    "actuel", "actuellement", "en cours", "depuis",
];

const ACADEMIC_EQUIVALENTS: &[(&str, &str)] = &[
    ("diplome d ingenieur", "master"),
    ("diplome ingenieur", "master"),
    ("engineering degree", "master"),
    ("mastere", "master"),
    ("masters", "master"),
    ("msc", "master"),
    ("licence", "bachelor"),
    ("bachelors", "bachelor"),
    ("bsc", "bachelor"),
    ("doctorat", "phd"),
    ("doctorate", "phd"),
];

/// Entries ranked by content similarity; the shared-key term keeps two field maps of
/// the same shape pairable even when their values differ completely.
const SHARED_KEY_WEIGHT: f64 = 0.1;
const IDENTICAL_ENTRY_BONUS: f64 = 0.5;
/// Above this many tokens a field needs only this share of its tokens covered.
const SHORT_FIELD_TOKENS: usize = 4;
const LONG_FIELD_COVERAGE: f64 = 0.8;

fn year_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").expect("static regex is valid"))
}

/// Case-folds, strips accents (NFKD then drops combining marks), replaces punctuation
/// with spaces and collapses whitespace.
pub fn normalize_text(raw: &str) -> String {
    let folded: String = raw
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn contains_phrase(text: &str, phrase: &str) -> bool {
    format!(" {text} ").contains(&format!(" {phrase} "))
}

/// Order-insensitive canonical rendering of an entry list, used for the identity check.
pub fn canonical_form(entries: &[Entry]) -> Vec<String> {
    let mut forms: Vec<String> = entries.iter().map(canonical_entry).collect();
    forms.sort();
    forms
}

fn canonical_entry(entry: &Entry) -> String {
    let mut pairs: Vec<String> = entry
        .meaningful_pairs()
        .into_iter()
        .map(|(k, v)| format!("{}={}", normalize_text(&k), normalize_text(&v)))
        .collect();
    pairs.sort();
    pairs.join("|")
}

/// Text and token normalization configured by the policy's clauses.
struct Normalizer<'p> {
    fold: bool,
    academic: bool,
    drop_seniority: bool,
    gender: HashMap<&'p str, &'p str>,
    suffixes: HashSet<&'p str>,
}

impl<'p> Normalizer<'p> {
    fn new(policy: &'p Policy) -> Self {
        Self {
            fold: policy.has(ClauseKind::IgnoreFormatting),
            academic: policy.has(ClauseKind::AcademicEquivalence),
            drop_seniority: policy.has(ClauseKind::SeniorityShift),
            gender: policy
                .title_pairs()
                .map(|(a, b)| (a.as_str(), b.as_str()))
                .collect(),
            suffixes: policy.legal_suffixes().map(String::as_str).collect(),
        }
    }

    fn text(&self, raw: &str) -> String {
        let mut text = if self.fold {
            normalize_text(raw)
        } else {
            collapse_whitespace(raw)
        };
        if self.academic {
            for (from, to) in ACADEMIC_EQUIVALENTS {
                if contains_phrase(&text, from) {
                    text = format!(" {text} ")
                        .replace(&format!(" {from} "), &format!(" {to} "))
                        .trim()
                        .to_string();
                }
            }
        }
        text
    }

    fn tokens(&self, text: &str) -> BTreeSet<String> {
        text.split_whitespace()
            .map(|t| self.gender.get(t).copied().unwrap_or(t))
            .filter(|t| !STOPWORDS.contains(t))
            .filter(|t| !self.suffixes.contains(*t))
            .filter(|t| !(self.drop_seniority && SENIORITY_TOKENS.contains(t)))
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone)]
struct Field {
    key: String,
    raw: String,
    tokens: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
struct EntryView {
    content: Vec<Field>,
    /// Normalized date values, sorted.
    dates: Vec<String>,
    raw_dates: Vec<String>,
    locations: BTreeSet<String>,
    raw_locations: Vec<String>,
    keys: BTreeSet<String>,
    canonical: String,
    freelance: bool,
}

impl EntryView {
    fn build(entry: &Entry, norm: &Normalizer<'_>, policy: &Policy) -> Self {
        let relocation = policy.has(ClauseKind::GeographicRelocation);
        let mut view = EntryView {
            canonical: canonical_entry(entry),
            ..Default::default()
        };

        for (key, value) in entry.meaningful_pairs() {
            let key = key.trim().to_lowercase();
            let text = norm.text(&value);
            if DATE_KEYS.contains(&key.as_str()) {
                view.keys.insert(key);
                view.dates.push(text);
                view.raw_dates.push(value);
            } else if LOCATION_KEYS.contains(&key.as_str()) {
                if relocation {
                    continue;
                }
                view.keys.insert(key);
                view.locations.extend(norm.tokens(&text));
                view.raw_locations.push(value);
            } else {
                if FREELANCE_MARKERS.iter().any(|m| contains_phrase(&text, m)) {
                    view.freelance = true;
                }
                view.keys.insert(key.clone());
                view.content.push(Field {
                    key,
                    raw: value,
                    tokens: norm.tokens(&text),
                });
            }
        }
        view.dates.sort();
        view
    }

    fn is_blank(&self) -> bool {
        self.keys.is_empty()
    }

    fn content_tokens(&self) -> BTreeSet<String> {
        self.content.iter().flat_map(|f| f.tokens.iter().cloned()).collect()
    }

    fn field(&self, key: &str) -> Option<&Field> {
        self.content.iter().find(|f| f.key == key)
    }

    /// Short human-readable name for details: the first content value, else the dates.
    fn label(&self) -> String {
        self.content
            .first()
            .map(|f| f.raw.clone())
            .or_else(|| self.raw_dates.first().cloned())
            .or_else(|| self.raw_locations.first().cloned())
            .unwrap_or_else(|| self.canonical.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub error_type: ErrorType,
    pub detail: String,
}

impl Finding {
    fn new(error_type: ErrorType, detail: String) -> Self {
        Self { error_type, detail }
    }
}

fn severity(error_type: ErrorType) -> u8 {
    match error_type {
        ErrorType::Modification => 3,
        ErrorType::Omission => 2,
        ErrorType::Hallucination => 1,
        ErrorType::None | ErrorType::JudgeFailure => 0,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Comparison {
    pub findings: Vec<Finding>,
}

impl Comparison {
    pub fn is_coherent(&self) -> bool {
        self.findings.is_empty()
    }

    /// The single reported type: Modification over Omission over Hallucination.
    pub fn error_type(&self) -> ErrorType {
        self.findings
            .iter()
            .map(|f| f.error_type)
            .max_by_key(|t| severity(*t))
            .unwrap_or(ErrorType::None)
    }

    pub fn details(&self) -> String {
        if self.findings.is_empty() {
            return "Consistent".to_string();
        }
        self.findings
            .iter()
            .map(|f| format!("{}: {}", f.error_type, f.detail))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Whether `outer` carries the information of `inner`.
fn covered(inner: &BTreeSet<String>, outer: &BTreeSet<String>) -> bool {
    if inner.is_empty() {
        return true;
    }
    let hits = inner.intersection(outer).count();
    if inner.len() <= SHORT_FIELD_TOKENS {
        hits == inner.len()
    } else {
        hits as f64 / inner.len() as f64 >= LONG_FIELD_COVERAGE
    }
}

fn pair_score(o: &EntryView, v: &EntryView) -> f64 {
    let mut score = jaccard(&o.content_tokens(), &v.content_tokens());
    let key_union = o.keys.union(&v.keys).count();
    if key_union > 0 {
        score += SHARED_KEY_WEIGHT * o.keys.intersection(&v.keys).count() as f64 / key_union as f64;
    }
    if o.canonical == v.canonical {
        score += IDENTICAL_ENTRY_BONUS;
    }
    score
}

struct Pairing {
    pairs: Vec<(usize, usize)>,
    unpaired_original: Vec<usize>,
    unpaired_variant: Vec<usize>,
}

fn pair_entries(original: &[EntryView], variant: &[EntryView], order_irrelevant: bool) -> Pairing {
    let mut pairs = Vec::new();
    let mut used_o = vec![false; original.len()];
    let mut used_v = vec![false; variant.len()];

    if order_irrelevant {
        let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
        for (i, o) in original.iter().enumerate() {
            for (j, v) in variant.iter().enumerate() {
                let score = pair_score(o, v);
                if score > 0.0 {
                    candidates.push((score, i, j));
                }
            }
        }
        // Ties resolve on canonical text so the result does not depend on input order.
        candidates.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| original[a.1].canonical.cmp(&original[b.1].canonical))
                .then_with(|| variant[a.2].canonical.cmp(&variant[b.2].canonical))
        });
        for (_, i, j) in candidates {
            if !used_o[i] && !used_v[j] {
                used_o[i] = true;
                used_v[j] = true;
                pairs.push((i, j));
            }
        }
    } else {
        for i in 0..original.len().min(variant.len()) {
            used_o[i] = true;
            used_v[i] = true;
            pairs.push((i, i));
        }
    }

    Pairing {
        pairs,
        unpaired_original: (0..original.len()).filter(|i| !used_o[*i]).collect(),
        unpaired_variant: (0..variant.len()).filter(|j| !used_v[*j]).collect(),
    }
}

fn compare_content(o: &EntryView, v: &EntryView, policy: &Policy, findings: &mut Vec<Finding>) {
    let bag = policy.has(ClauseKind::BagOfFields);
    let skip_company = policy.has(ClauseKind::FreelanceEmployer) && (o.freelance || v.freelance);
    let keep = |f: &&Field| !(skip_company && f.key == "company");

    let o_fields: Vec<&Field> = o.content.iter().filter(keep).collect();
    let v_fields: Vec<&Field> = v.content.iter().filter(keep).collect();
    let o_all: BTreeSet<String> = o_fields.iter().flat_map(|f| f.tokens.iter().cloned()).collect();
    let v_all: BTreeSet<String> = v_fields.iter().flat_map(|f| f.tokens.iter().cloned()).collect();

    let mut conflicted: BTreeSet<&str> = BTreeSet::new();

    for f in &o_fields {
        let same_key = v_fields.iter().find(|g| g.key == f.key);
        let present = if bag {
            covered(&f.tokens, &v_all)
        } else {
            same_key.is_some_and(|g| covered(&f.tokens, &g.tokens))
        };
        if present {
            continue;
        }
        match same_key {
            Some(g) if covered(&g.tokens, &f.tokens) => findings.push(Finding::new(
                ErrorType::Omission,
                format!("{} '{}' lost detail, variant has '{}'", f.key, f.raw, g.raw),
            )),
            Some(g) => {
                conflicted.insert(f.key.as_str());
                findings.push(Finding::new(
                    ErrorType::Modification,
                    format!("{} '{}' became '{}'", f.key, f.raw, g.raw),
                ));
            }
            None => findings.push(Finding::new(
                ErrorType::Omission,
                format!("{} '{}' missing from variant", f.key, f.raw),
            )),
        }
    }

    for g in &v_fields {
        let present = if bag {
            covered(&g.tokens, &o_all)
        } else {
            o.field(&g.key).is_some_and(|f| covered(&g.tokens, &f.tokens))
        };
        if present || conflicted.contains(g.key.as_str()) {
            continue;
        }
        findings.push(Finding::new(
            ErrorType::Hallucination,
            format!("{} '{}' not in Original", g.key, g.raw),
        ));
    }
}

/// Inclusive year span of a date text; an ongoing marker leaves the end open.
fn year_span(text: &str) -> Option<(i32, i32)> {
    let years: Vec<i32> = year_pattern()
        .find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    let start = *years.iter().min()?;
    let ongoing = ONGOING_MARKERS.iter().any(|m| contains_phrase(text, m));
    let end = if ongoing { i32::MAX } else { *years.iter().max()? };
    Some((start, end))
}

fn spans_overlap(a: &str, b: &str) -> bool {
    match (year_span(a), year_span(b)) {
        (Some((a0, a1)), Some((b0, b1))) => a0 <= b1 && b0 <= a1,
        _ => false,
    }
}

fn compare_dates(o: &EntryView, v: &EntryView, policy: &Policy, findings: &mut Vec<Finding>) {
    let shift_allowed = policy.has(ClauseKind::SeniorityShift);
    let od = o.dates.join(" ");
    let vd = v.dates.join(" ");

    match (od.is_empty(), vd.is_empty()) {
        (true, true) => {}
        (false, true) => findings.push(Finding::new(
            ErrorType::Omission,
            format!("dates '{}' missing from variant", o.raw_dates.join(", ")),
        )),
        (true, false) => {
            if !shift_allowed {
                findings.push(Finding::new(
                    ErrorType::Hallucination,
                    format!("dates '{}' not in Original", v.raw_dates.join(", ")),
                ));
            }
        }
        (false, false) => {
            let restated = policy.has(ClauseKind::DateRestatement) && spans_overlap(&od, &vd);
            if od != vd && !restated && !shift_allowed {
                findings.push(Finding::new(
                    ErrorType::Modification,
                    format!(
                        "dates '{}' became '{}'",
                        o.raw_dates.join(", "),
                        v.raw_dates.join(", ")
                    ),
                ));
            }
        }
    }
}

fn compare_locations(o: &EntryView, v: &EntryView, policy: &Policy, findings: &mut Vec<Finding>) {
    if policy.has(ClauseKind::GeographicRelocation) {
        return;
    }
    match (o.locations.is_empty(), v.locations.is_empty()) {
        (true, true) => {}
        (false, true) => findings.push(Finding::new(
            ErrorType::Omission,
            format!("location '{}' missing from variant", o.raw_locations.join(", ")),
        )),
        (true, false) => findings.push(Finding::new(
            ErrorType::Hallucination,
            format!("location '{}' not in Original", v.raw_locations.join(", ")),
        )),
        (false, false) => {
            let same_place = if policy.has(ClauseKind::SamePlaceGeography) {
                covered(&o.locations, &v.locations) || covered(&v.locations, &o.locations)
            } else {
                o.locations == v.locations
            };
            if !same_place {
                findings.push(Finding::new(
                    ErrorType::Modification,
                    format!(
                        "location '{}' became '{}'",
                        o.raw_locations.join(", "),
                        v.raw_locations.join(", ")
                    ),
                ));
            }
        }
    }
}

/// Entries from the other categories of the same document. Only consulted under
/// cross-section migration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Elsewhere<'a> {
    /// Where an Original entry missing from this category may have moved to.
    pub variant: &'a [Entry],
    /// Where an extra variant entry in this category may have come from.
    pub original: &'a [Entry],
}

impl<'a> Elsewhere<'a> {
    pub const NONE: Elsewhere<'static> = Elsewhere {
        variant: &[],
        original: &[],
    };

    pub fn is_empty(&self) -> bool {
        self.variant.is_empty() && self.original.is_empty()
    }
}

/// Compares `variant` against `original` under `policy`.
pub fn compare(original: &[Entry], variant: &[Entry], elsewhere: Elsewhere<'_>, policy: &Policy) -> Comparison {
    let norm = Normalizer::new(policy);
    let build = |entries: &[Entry]| -> Vec<EntryView> {
        entries
            .iter()
            .map(|e| EntryView::build(e, &norm, policy))
            .filter(|v| !v.is_blank())
            .collect()
    };
    let o_views = build(original);
    let v_views = build(variant);

    let pairing = pair_entries(&o_views, &v_views, policy.has(ClauseKind::OrderIrrelevant));
    let mut findings = Vec::new();

    for (i, j) in &pairing.pairs {
        compare_content(&o_views[*i], &v_views[*j], policy, &mut findings);
        compare_dates(&o_views[*i], &v_views[*j], policy, &mut findings);
        compare_locations(&o_views[*i], &v_views[*j], policy, &mut findings);
    }

    let migration = policy.has(ClauseKind::CrossSectionMigration);
    let tokens_of = |entries: &[Entry]| -> Vec<BTreeSet<String>> {
        if migration {
            build(entries).iter().map(EntryView::content_tokens).collect()
        } else {
            Vec::new()
        }
    };
    let moved_out = tokens_of(elsewhere.variant);
    let moved_in = tokens_of(elsewhere.original);
    let found_in = |view: &EntryView, others: &[BTreeSet<String>]| {
        let tokens = view.content_tokens();
        !tokens.is_empty() && others.iter().any(|other| covered(&tokens, other))
    };

    for i in &pairing.unpaired_original {
        let view = &o_views[*i];
        if !found_in(view, &moved_out) {
            findings.push(Finding::new(
                ErrorType::Omission,
                format!("entry '{}' missing from variant", view.label()),
            ));
        }
    }
    for j in &pairing.unpaired_variant {
        let view = &v_views[*j];
        if !found_in(view, &moved_in) {
            findings.push(Finding::new(
                ErrorType::Hallucination,
                format!("entry '{}' not in Original", view.label()),
            ));
        }
    }

    findings.sort_by(|a, b| {
        severity(b.error_type)
            .cmp(&severity(a.error_type))
            .then_with(|| a.detail.cmp(&b.detail))
    });
    Comparison { findings }
}
