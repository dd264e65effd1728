use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::models::{Category, Entry, NOT_FOUND};

/// Embedded JSON recovered from an error record is normalized again, but only once.
const MAX_RECOVERY_DEPTH: u8 = 1;

fn embedded_object_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)(\{.*\})").expect("static regex is valid"))
}

/// Normalizes one raw extractor payload into the canonical entry list for `category`.
///
/// Container shapes are tried in priority order:
/// 1. a list is used as-is;
/// 2. an object holding a known wrapper key (`experiences`, `studies`, `education`,
///    `interests`) whose value is a list is unwrapped;
/// 3. an object that looks like a single entry (has the category's diagnostic key)
///    becomes a one-element list;
/// 4. an `{"error": .., "raw_text": ..}` record has its first `{...}` span re-parsed;
/// 5. anything else is an empty list.
///
/// Every field map is then completed with the category schema so a missing key and
/// an explicit `"not found"` produce the same shape.
pub fn normalize_payload(category: Category, payload: &Value) -> Vec<Entry> {
    normalize_with_depth(category, payload, 0)
}

fn normalize_with_depth(category: Category, payload: &Value, depth: u8) -> Vec<Entry> {
    match payload {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| to_entry(category, item))
            .collect(),
        Value::Object(map) => {
            for key in category.wrapper_keys() {
                if let Some(Value::Array(items)) = map.get(*key) {
                    return items
                        .iter()
                        .filter_map(|item| to_entry(category, item))
                        .collect();
                }
            }

            if let Some(key) = category.diagnostic_key() {
                if map.contains_key(key) {
                    return to_entry(category, payload).into_iter().collect();
                }
            }

            if map.contains_key("error") {
                return recover_from_error_record(category, map.get("raw_text"), depth);
            }

            Vec::new()
        }
        _ => Vec::new(),
    }
}

fn recover_from_error_record(category: Category, raw_text: Option<&Value>, depth: u8) -> Vec<Entry> {
    if depth >= MAX_RECOVERY_DEPTH {
        return Vec::new();
    }
    let Some(text) = raw_text.and_then(Value::as_str) else {
        return Vec::new();
    };
    let Some(span) = embedded_object_pattern()
        .captures(text)
        .and_then(|caps| caps.get(1))
    else {
        return Vec::new();
    };

    match serde_json::from_str::<Value>(span.as_str()) {
        Ok(recovered) => normalize_with_depth(category, &recovered, depth + 1),
        Err(e) => {
            debug!(category = %category, error = %e, "embedded JSON in error record is unparseable");
            Vec::new()
        }
    }
}

fn to_entry(category: Category, item: &Value) -> Option<Entry> {
    match item {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(Entry::Text(trimmed.to_string()))
            }
        }
        Value::Bool(_) | Value::Number(_) => Some(Entry::Text(item.to_string())),
        Value::Array(_) => None,
        Value::Object(map) => {
            let mut fields: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), complete_value(v)))
                .collect();
            for key in category.schema_keys() {
                fields
                    .entry((*key).to_string())
                    .or_insert_with(|| Value::String(NOT_FOUND.to_string()));
            }
            Some(Entry::Fields(fields))
        }
    }
}

fn complete_value(value: &Value) -> Value {
    match value {
        Value::Null => Value::String(NOT_FOUND.to_string()),
        Value::String(s) if s.trim().is_empty() => Value::String(NOT_FOUND.to_string()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// The field's text when it carries information.
    fn field(entry: &Entry, key: &str) -> Option<String> {
        entry
            .meaningful_pairs()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    #[test]
    fn test_list_is_used_as_is() {
        let entries = normalize_payload(Category::Interests, &json!(["Chess", " ", null, "Go"]));
        assert_eq!(entries, vec![Entry::text("Chess"), Entry::text("Go")]);
    }

    #[test]
    fn test_wrapper_key_is_unwrapped() {
        let payload = json!({"education": [{"university": "Lyon 2"}]});
        let entries = normalize_payload(Category::Studies, &payload);
        assert_eq!(entries.len(), 1);
        assert_eq!(field(&entries[0], "university").as_deref(), Some("Lyon 2"));
    }

    #[test]
    fn test_single_entry_object_is_wrapped() {
        let payload = json!({"university": "EPFL", "level_of_degree": "Master"});
        let entries = normalize_payload(Category::Studies, &payload);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_error_record_recovers_embedded_json() {
        let payload = json!({
            "error": "JSON Parse Error",
            "raw_text": "Here you go: {\"studies\": [{\"university\": \"INSA\"}]} hope it helps"
        });
        let entries = normalize_payload(Category::Studies, &payload);
        assert_eq!(entries.len(), 1);
        assert_eq!(field(&entries[0], "university").as_deref(), Some("INSA"));
    }

    #[test]
    fn test_error_record_without_json_is_empty() {
        let payload = json!({"error": "Timeout"});
        assert!(normalize_payload(Category::Experiences, &payload).is_empty());
        let payload = json!({"error": "JSON Parse Error", "raw_text": "{broken"});
        assert!(normalize_payload(Category::Experiences, &payload).is_empty());
    }

    #[test]
    fn test_unknown_shape_is_empty() {
        assert!(normalize_payload(Category::Studies, &json!({"foo": 1})).is_empty());
        assert!(normalize_payload(Category::Studies, &json!(42)).is_empty());
    }

    #[test]
    fn test_not_found_sentinel_and_missing_key_normalize_identically() {
        let explicit = json!([{"company": "Google", "job_title": "Engineer",
            "description": "not found", "location": "not found", "dates": "2020"}]);
        let missing = json!([{"company": "Google", "job_title": "Engineer", "dates": "2020"}]);
        let with_null = json!([{"company": "Google", "job_title": "Engineer",
            "description": null, "location": "", "dates": "2020"}]);
        let a = normalize_payload(Category::Experiences, &explicit);
        assert_eq!(a, normalize_payload(Category::Experiences, &missing));
        assert_eq!(a, normalize_payload(Category::Experiences, &with_null));
    }

    #[test]
    fn test_extra_keys_are_preserved() {
        let entries = normalize_payload(Category::Studies, &json!([{"university": "Lyon", "city": "Lyon"}]));
        assert_eq!(field(&entries[0], "city").as_deref(), Some("Lyon"));
        assert_eq!(field(&entries[0], "field"), None);
    }
}
