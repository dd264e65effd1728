use std::sync::OnceLock;

use regex::Regex;

fn cv_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)CV\s*(\d+)").expect("static regex is valid"))
}

/// Numeric CV identifier: the first run of digits after the `CV` prefix (case-insensitive).
pub fn cv_number(label: &str) -> Option<u64> {
    cv_number_pattern()
        .captures(label)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
}

/// Canonical id for a free-form label: `"CV 042 Age"` -> `"CV42"`, `"cv7.pdf"` -> `"CV7"`.
/// Labels without a CV number fall back to their first whitespace-separated token.
pub fn canonical_cv_id(label: &str) -> String {
    match cv_number(label) {
        Some(n) => format!("CV{n}"),
        None => label
            .split_whitespace()
            .next()
            .unwrap_or(label)
            .to_string(),
    }
}

/// Sort key putting `CV2` before `CV10`; ids without a number sort last.
pub fn cv_sort_key(cv_id: &str) -> (u64, String) {
    (cv_number(cv_id).unwrap_or(u64::MAX), cv_id.to_string())
}
