//! Normalization Pass — post-validation cleanup.
//!
//! Idempotent string trimming, order-preserving dedup of list fields, and
//! harmonization of country/language tokens to a controlled vocabulary where
//! the mapping is unambiguous. Ambiguous tokens pass through unchanged; the
//! pass never guesses. The orchestrator re-validates the result and recovers
//! if normalization ever broke a valid profile.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use serde_json::Value;

/// Synonym → controlled vocabulary for `location.country`. Lowercased keys;
/// every canonical spelling maps to itself so the pass is idempotent.
const COUNTRY_SYNONYMS: &[(&str, &str)] = &[
    ("america", "United States"),
    ("deutschland", "Germany"),
    ("england", "United Kingdom"),
    ("france", "France"),
    ("germany", "Germany"),
    ("great britain", "United Kingdom"),
    ("holland", "Netherlands"),
    ("nederland", "Netherlands"),
    ("netherlands", "Netherlands"),
    ("schweiz", "Switzerland"),
    ("suisse", "Switzerland"),
    ("switzerland", "Switzerland"),
    ("the netherlands", "Netherlands"),
    ("uk", "United Kingdom"),
    ("united kingdom", "United Kingdom"),
    ("united states", "United States"),
    ("united states of america", "United States"),
    ("us", "United States"),
    ("usa", "United States"),
];

/// Synonym → controlled vocabulary for `requirements.languages` items.
const LANGUAGE_SYNONYMS: &[(&str, &str)] = &[
    ("de", "German"),
    ("deutsch", "German"),
    ("dutch", "Dutch"),
    ("en", "English"),
    ("english", "English"),
    ("es", "Spanish"),
    ("espanol", "Spanish"),
    ("español", "Spanish"),
    ("fr", "French"),
    ("french", "French"),
    ("german", "German"),
    ("nl", "Dutch"),
    ("spanish", "Spanish"),
];

fn country_map() -> &'static HashMap<&'static str, &'static str> {
    static MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    MAP.get_or_init(|| COUNTRY_SYNONYMS.iter().copied().collect())
}

fn language_map() -> &'static HashMap<&'static str, &'static str> {
    static MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    MAP.get_or_init(|| LANGUAGE_SYNONYMS.iter().copied().collect())
}

/// Applies the normalization pass to a validated field map. Pure; the
/// orchestrator decides what to do if the result no longer validates.
pub fn apply(fields: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    fields
        .iter()
        .map(|(path, value)| (path.clone(), normalize_value(path, value)))
        .collect()
}

fn normalize_value(path: &str, value: &Value) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            let harmonized = harmonize(path, trimmed);
            Value::String(harmonized.to_string())
        }
        Value::Array(items) => Value::Array(dedup_items(path, items)),
        _ => value.clone(),
    }
}

/// Order-preserving dedup, first occurrence wins. String items are compared
/// case-insensitively after trimming; non-string items compare exactly.
fn dedup_items(path: &str, items: &[Value]) -> Vec<Value> {
    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::new();
    for item in items {
        let normalized = match item {
            Value::String(s) => {
                let trimmed = s.trim();
                let harmonized = harmonize_item(path, trimmed);
                Value::String(harmonized.to_string())
            }
            other => other.clone(),
        };
        let key = match &normalized {
            Value::String(s) => s.to_lowercase(),
            other => other.to_string(),
        };
        if !seen.contains(&key) {
            seen.push(key);
            out.push(normalized);
        }
    }
    out
}

/// Harmonizes a scalar string field to controlled vocabulary when the path
/// carries one and the token maps unambiguously.
fn harmonize<'a>(path: &str, value: &'a str) -> &'a str {
    if path == "location.country" {
        if let Some(canonical) = country_map().get(value.to_lowercase().as_str()).copied() {
            return canonical;
        }
    }
    value
}

/// Harmonizes a list item (language names).
fn harmonize_item<'a>(path: &str, value: &'a str) -> &'a str {
    if path == "requirements.languages" {
        if let Some(canonical) = language_map().get(value.to_lowercase().as_str()).copied() {
            return canonical;
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_strings_are_trimmed() {
        let out = apply(&fields(&[("company.name", json!("  Acme  "))]));
        assert_eq!(out["company.name"], json!("Acme"));
    }

    #[test]
    fn test_list_dedup_preserves_first_occurrence() {
        let out = apply(&fields(&[(
            "requirements.skills",
            json!(["Rust", "rust ", "Tokio", "Rust"]),
        )]));
        assert_eq!(out["requirements.skills"], json!(["Rust", "Tokio"]));
    }

    #[test]
    fn test_country_harmonization_unambiguous() {
        let out = apply(&fields(&[("location.country", json!("deutschland"))]));
        assert_eq!(out["location.country"], json!("Germany"));
    }

    #[test]
    fn test_country_harmonization_leaves_unknown_tokens() {
        let out = apply(&fields(&[("location.country", json!("Freedonia"))]));
        assert_eq!(out["location.country"], json!("Freedonia"));
    }

    #[test]
    fn test_language_items_harmonized() {
        let out = apply(&fields(&[(
            "requirements.languages",
            json!(["en", "German", "klingon"]),
        )]));
        assert_eq!(
            out["requirements.languages"],
            json!(["English", "German", "klingon"])
        );
    }

    #[test]
    fn test_harmonization_then_dedup() {
        // "en" and "English" harmonize to the same token; dedup collapses them.
        let out = apply(&fields(&[(
            "requirements.languages",
            json!(["en", "English"]),
        )]));
        assert_eq!(out["requirements.languages"], json!(["English"]));
    }

    #[test]
    fn test_apply_is_idempotent() {
        let input = fields(&[
            ("company.name", json!("  Acme ")),
            ("location.country", json!("usa")),
            ("requirements.languages", json!(["en", "DE", "en"])),
            ("requirements.skills", json!(["Rust", "Rust", " Tokio"])),
            ("compensation.salary_min", json!(50000)),
        ]);
        let once = apply(&input);
        let twice = apply(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_non_string_scalars_untouched() {
        let out = apply(&fields(&[
            ("position.remote", json!(true)),
            ("compensation.salary_min", json!(50000)),
        ]));
        assert_eq!(out["position.remote"], json!(true));
        assert_eq!(out["compensation.salary_min"], json!(50000));
    }
}
