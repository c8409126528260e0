//! Canonicalization — best-effort mapping of a raw payload onto canonical
//! dot-paths. Pure, never fails, and defers all correctness judgments to the
//! validator: unresolvable keys are dropped, non-convertible values pass
//! through unchanged.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

use super::{aliases, spec_for, FieldKind};

/// Flattens `raw` into a canonical dot-path map, resolving aliases
/// case-insensitively and coercing unambiguously convertible scalars to
/// their declared type. Idempotent: re-canonicalizing the output (as a flat
/// object) yields the same map.
pub fn canonicalize(raw: &Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    if let Value::Object(map) = raw {
        walk("", map, &mut out);
    }
    out
}

/// Renders a canonical map back to a flat JSON object, dot-paths as keys.
/// Used for repair prompts and for round-tripping in tests.
pub fn flat_to_value(fields: &BTreeMap<String, Value>) -> Value {
    let mut map = Map::new();
    for (path, value) in fields {
        map.insert(path.clone(), value.clone());
    }
    Value::Object(map)
}

fn walk(prefix: &str, map: &Map<String, Value>, out: &mut BTreeMap<String, Value>) {
    for (key, value) in map {
        let dotted = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(inner) => walk(&dotted, inner, out),
            _ => {
                if let Some(canonical) = aliases::resolve(&dotted) {
                    // Keys are visited in the map's sorted order; the first
                    // key that resolves to a canonical path wins.
                    out.entry(canonical.to_string())
                        .or_insert_with(|| coerce(canonical, value));
                }
            }
        }
    }
}

/// Coerces a scalar toward the declared kind when the conversion is
/// unambiguous; anything else passes through for the validator to judge.
fn coerce(path: &str, value: &Value) -> Value {
    let Some(spec) = spec_for(path) else {
        return value.clone();
    };
    match (spec.kind, value) {
        (FieldKind::Integer, Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(n) => Value::Number(Number::from(n)),
            Err(_) => value.clone(),
        },
        // JSON writers routinely emit 50000.0 for integers; a lossless
        // conversion is unambiguous. Fractional floats are left for the
        // validator to reject.
        (FieldKind::Integer, Value::Number(n)) => match n.as_f64() {
            Some(f) if !n.is_i64() && !n.is_u64() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Value::Number(Number::from(f as i64))
            }
            _ => value.clone(),
        },
        (FieldKind::Float, Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(f) => Number::from_f64(f).map(Value::Number).unwrap_or_else(|| value.clone()),
            Err(_) => value.clone(),
        },
        (FieldKind::Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => value.clone(),
        },
        (FieldKind::Enum(options), Value::String(s)) => {
            let trimmed = s.trim();
            options
                .iter()
                .find(|o| o.eq_ignore_ascii_case(trimmed))
                .map(|o| Value::String(o.to_string()))
                .unwrap_or_else(|| value.clone())
        }
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scenario_legacy_keys_and_string_coercion() {
        let raw = json!({"Company_Name": "Acme", "salary_min": "50000"});
        let out = canonicalize(&raw);
        assert_eq!(out.get("company.name"), Some(&json!("Acme")));
        assert_eq!(out.get("compensation.salary_min"), Some(&json!(50000)));
    }

    #[test]
    fn test_nested_objects_flatten_to_dot_paths() {
        let raw = json!({"company": {"name": "Acme", "website": "https://acme.test"}});
        let out = canonicalize(&raw);
        assert_eq!(out.get("company.name"), Some(&json!("Acme")));
        assert_eq!(out.get("company.website"), Some(&json!("https://acme.test")));
    }

    #[test]
    fn test_unresolvable_keys_dropped_silently() {
        let raw = json!({"company_name": "Acme", "favourite_color": "mauve"});
        let out = canonicalize(&raw);
        assert_eq!(out.len(), 1);
        assert!(out.contains_key("company.name"));
    }

    #[test]
    fn test_differently_cased_spellings_canonicalize_identically() {
        let a = canonicalize(&json!({"Company.Name": "Acme"}));
        let b = canonicalize(&json!({"company.name": "Acme"}));
        assert_eq!(a, b);
    }

    #[test]
    fn test_boolean_and_enum_coercion() {
        let raw = json!({"remote": "true", "seniority": "Senior", "currency": "usd"});
        let out = canonicalize(&raw);
        assert_eq!(out.get("position.remote"), Some(&json!(true)));
        assert_eq!(out.get("position.seniority"), Some(&json!("senior")));
        assert_eq!(out.get("compensation.currency"), Some(&json!("USD")));
    }

    #[test]
    fn test_integer_valued_float_coerces_fractional_does_not() {
        let raw = json!({"salary_min": 50000.0, "salary_max": 90000.5});
        let out = canonicalize(&raw);
        assert_eq!(out.get("compensation.salary_min"), Some(&json!(50000)));
        assert_eq!(out.get("compensation.salary_max"), Some(&json!(90000.5)));
    }

    #[test]
    fn test_non_convertible_values_pass_through() {
        let raw = json!({"salary_min": "about 50k", "remote": "maybe"});
        let out = canonicalize(&raw);
        assert_eq!(out.get("compensation.salary_min"), Some(&json!("about 50k")));
        assert_eq!(out.get("position.remote"), Some(&json!("maybe")));
    }

    #[test]
    fn test_first_resolved_key_wins_on_alias_collision() {
        // Map keys iterate in sorted order, so "company" is seen before
        // "employer" and its value sticks.
        let raw = json!({"company": "Acme", "employer": "Globex"});
        let out = canonicalize(&raw);
        assert_eq!(out.get("company.name"), Some(&json!("Acme")));
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        let raw = json!({
            "Company_Name": "Acme",
            "salary_min": "50000",
            "remote": "true",
            "skills": ["Rust", "Tokio"],
            "company": {"industry": "Fintech"}
        });
        let once = canonicalize(&raw);
        let twice = canonicalize(&flat_to_value(&once));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_non_object_input_yields_empty_map() {
        assert!(canonicalize(&json!("just text")).is_empty());
        assert!(canonicalize(&json!(null)).is_empty());
        assert!(canonicalize(&json!([1, 2])).is_empty());
    }
}
