//! Schema Validator — the only way a payload becomes a `Profile`.
//!
//! Validation is total and deterministic: the same candidate always yields
//! the same errors in the same order (stable sort by dot-path, then error
//! kind), so repair prompts are reproducible.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::models::profile::Profile;

use super::{kind_name, spec_for, FieldKind, ObjectFieldKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingRequired,
    TypeError,
    EnumViolation,
    UnknownField,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::MissingRequired => "missing_required",
            ErrorKind::TypeError => "type_error",
            ErrorKind::EnumViolation => "enum_violation",
            ErrorKind::UnknownField => "unknown_field",
        }
    }
}

/// One (dot-path, error-kind, message) triple from a validation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    pub path: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Ordered validation errors from one pass. Empty set ⇔ valid Profile, so
/// this type only ever crosses a boundary non-empty (as the `Err` arm).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationErrorSet(Vec<ValidationError>);

impl ValidationErrorSet {
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders the error list as the bullet block embedded in repair prompts.
    pub fn to_prompt_block(&self) -> String {
        self.0
            .iter()
            .map(|e| format!("- {} ({}): {}", e.path, e.kind.label(), e.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for ValidationErrorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .0
            .iter()
            .map(|e| format!("{} [{}]: {}", e.path, e.kind.label(), e.message))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{rendered}")
    }
}

/// Validates a canonical candidate map against the schema. On success the
/// candidate is promoted to a `Profile`; on failure every violation is
/// reported (not just the first), stably ordered.
pub fn validate(candidate: &BTreeMap<String, Value>) -> Result<Profile, ValidationErrorSet> {
    let mut errors = Vec::new();

    for spec in super::required_specs() {
        if !candidate.contains_key(spec.path) {
            errors.push(ValidationError {
                path: spec.path.to_string(),
                kind: ErrorKind::MissingRequired,
                message: format!("required field of type {} is missing", kind_name(spec.kind)),
            });
        }
    }

    for (path, value) in candidate {
        match spec_for(path) {
            None => errors.push(ValidationError {
                path: path.clone(),
                kind: ErrorKind::UnknownField,
                message: "path is not part of the canonical schema".to_string(),
            }),
            Some(spec) => check_value(path, spec.kind, value, &mut errors),
        }
    }

    errors.sort_by(|a, b| a.path.cmp(&b.path).then(a.kind.cmp(&b.kind)));

    if errors.is_empty() {
        Ok(Profile::from_validated(candidate.clone()))
    } else {
        Err(ValidationErrorSet(errors))
    }
}

fn check_value(path: &str, kind: FieldKind, value: &Value, errors: &mut Vec<ValidationError>) {
    match kind {
        FieldKind::String => {
            if !value.is_string() {
                push_type_error(path, "string", value, errors);
            }
        }
        FieldKind::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => {}
            Value::Number(_) => errors.push(ValidationError {
                path: path.to_string(),
                kind: ErrorKind::TypeError,
                message: "float supplied where integer is declared".to_string(),
            }),
            _ => push_type_error(path, "integer", value, errors),
        },
        FieldKind::Float => {
            if !value.is_number() {
                push_type_error(path, "number", value, errors);
            }
        }
        FieldKind::Boolean => {
            if !value.is_boolean() {
                push_type_error(path, "boolean", value, errors);
            }
        }
        FieldKind::Enum(options) => match value {
            Value::String(s) => {
                if !options.contains(&s.as_str()) {
                    errors.push(ValidationError {
                        path: path.to_string(),
                        kind: ErrorKind::EnumViolation,
                        message: format!("'{}' is not one of: {}", s, options.join(", ")),
                    });
                }
            }
            _ => push_type_error(path, "enum string", value, errors),
        },
        FieldKind::ListOfString => match value {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if !item.is_string() {
                        push_type_error(&format!("{path}[{i}]"), "string", item, errors);
                    }
                }
            }
            _ => push_type_error(path, "array of strings", value, errors),
        },
        FieldKind::ListOfObject(fields) => match value {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    check_object_item(&format!("{path}[{i}]"), fields, item, errors);
                }
            }
            _ => push_type_error(path, "array of objects", value, errors),
        },
    }
}

/// Nested objects are strict: every declared key must be present with the
/// right type, and unknown sibling keys are an error. This is deliberately
/// harsher than top-level alias resolution, which is silently permissive.
fn check_object_item(
    item_path: &str,
    fields: &[super::ObjectField],
    item: &Value,
    errors: &mut Vec<ValidationError>,
) {
    let Value::Object(map) = item else {
        push_type_error(item_path, "object", item, errors);
        return;
    };

    for field in fields {
        match map.get(field.name) {
            None => errors.push(ValidationError {
                path: format!("{item_path}.{}", field.name),
                kind: ErrorKind::MissingRequired,
                message: "object item is missing a declared key".to_string(),
            }),
            Some(v) => {
                let ok = match field.kind {
                    ObjectFieldKind::String => v.is_string(),
                    ObjectFieldKind::Integer => v.is_i64() || v.is_u64(),
                    ObjectFieldKind::Float => v.is_number(),
                    ObjectFieldKind::Boolean => v.is_boolean(),
                };
                if !ok {
                    let expected = match field.kind {
                        ObjectFieldKind::String => "string",
                        ObjectFieldKind::Integer => "integer",
                        ObjectFieldKind::Float => "number",
                        ObjectFieldKind::Boolean => "boolean",
                    };
                    push_type_error(&format!("{item_path}.{}", field.name), expected, v, errors);
                }
            }
        }
    }

    for key in map.keys() {
        if !fields.iter().any(|f| f.name == key) {
            errors.push(ValidationError {
                path: format!("{item_path}.{key}"),
                kind: ErrorKind::UnknownField,
                message: "unknown key inside a nested object".to_string(),
            });
        }
    }
}

fn push_type_error(path: &str, expected: &str, got: &Value, errors: &mut Vec<ValidationError>) {
    let got_name = match got {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    errors.push(ValidationError {
        path: path.to_string(),
        kind: ErrorKind::TypeError,
        message: format!("expected {expected}, got {got_name}"),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_candidate() -> BTreeMap<String, Value> {
        let mut m = BTreeMap::new();
        m.insert("company.name".to_string(), json!("Acme"));
        m.insert("position.title".to_string(), json!("Engineer"));
        m.insert("position.seniority".to_string(), json!("senior"));
        m.insert("position.employment_type".to_string(), json!("full_time"));
        m.insert("requirements.skills".to_string(), json!(["Rust"]));
        m
    }

    #[test]
    fn test_minimal_valid_candidate_becomes_profile() {
        let profile = validate(&minimal_candidate()).unwrap();
        assert_eq!(profile.get("company.name"), Some(&json!("Acme")));
    }

    #[test]
    fn test_missing_required_fields_reported() {
        let errors = validate(&BTreeMap::new()).unwrap_err();
        let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"company.name"));
        assert!(paths.contains(&"position.title"));
        assert!(paths.contains(&"requirements.skills"));
        assert!(errors.iter().all(|e| e.kind == ErrorKind::MissingRequired));
    }

    #[test]
    fn test_scenario_wrong_type_for_company_name() {
        // Spec scenario: {"company.name": 123} → type_error at company.name
        let mut candidate = minimal_candidate();
        candidate.insert("company.name".to_string(), json!(123));
        let errors = validate(&candidate).unwrap_err();
        let first = errors.iter().next().unwrap();
        assert_eq!(first.path, "company.name");
        assert_eq!(first.kind, ErrorKind::TypeError);
    }

    #[test]
    fn test_float_where_integer_declared_is_type_error() {
        let mut candidate = minimal_candidate();
        candidate.insert("compensation.salary_min".to_string(), json!(50000.5));
        let errors = validate(&candidate).unwrap_err();
        let err = errors.iter().next().unwrap();
        assert_eq!(err.path, "compensation.salary_min");
        assert!(err.message.contains("float supplied where integer"));
    }

    #[test]
    fn test_integer_accepted_where_float_declared() {
        let mut candidate = minimal_candidate();
        candidate.insert("compensation.equity_pct".to_string(), json!(1));
        assert!(validate(&candidate).is_ok());
    }

    #[test]
    fn test_enum_violation_distinct_from_type_error() {
        let mut candidate = minimal_candidate();
        candidate.insert("position.seniority".to_string(), json!("wizard"));
        let errors = validate(&candidate).unwrap_err();
        assert_eq!(errors.iter().next().unwrap().kind, ErrorKind::EnumViolation);

        let mut candidate = minimal_candidate();
        candidate.insert("position.seniority".to_string(), json!(3));
        let errors = validate(&candidate).unwrap_err();
        assert_eq!(errors.iter().next().unwrap().kind, ErrorKind::TypeError);
    }

    #[test]
    fn test_list_items_validated_individually() {
        let mut candidate = minimal_candidate();
        candidate.insert("requirements.skills".to_string(), json!(["Rust", 7]));
        let errors = validate(&candidate).unwrap_err();
        let err = errors.iter().next().unwrap();
        assert_eq!(err.path, "requirements.skills[1]");
        assert_eq!(err.kind, ErrorKind::TypeError);
    }

    #[test]
    fn test_nested_object_unknown_key_rejected() {
        let mut candidate = minimal_candidate();
        candidate.insert(
            "extras".to_string(),
            json!([{"label": "visa", "value": "sponsored", "note": "extra"}]),
        );
        let errors = validate(&candidate).unwrap_err();
        let err = errors.iter().next().unwrap();
        assert_eq!(err.path, "extras[0].note");
        assert_eq!(err.kind, ErrorKind::UnknownField);
    }

    #[test]
    fn test_nested_object_missing_declared_key() {
        let mut candidate = minimal_candidate();
        candidate.insert("extras".to_string(), json!([{"label": "visa"}]));
        let errors = validate(&candidate).unwrap_err();
        let err = errors.iter().next().unwrap();
        assert_eq!(err.path, "extras[0].value");
        assert_eq!(err.kind, ErrorKind::MissingRequired);
    }

    #[test]
    fn test_unknown_top_level_path_is_error() {
        // Canonicalization drops these, but the validator stays strict for
        // candidates built by other producers.
        let mut candidate = minimal_candidate();
        candidate.insert("company.mascot".to_string(), json!("ferris"));
        let errors = validate(&candidate).unwrap_err();
        assert_eq!(errors.iter().next().unwrap().kind, ErrorKind::UnknownField);
    }

    #[test]
    fn test_error_ordering_is_deterministic() {
        let mut candidate = BTreeMap::new();
        candidate.insert("position.seniority".to_string(), json!("wizard"));
        candidate.insert("company.name".to_string(), json!(123));
        let a = validate(&candidate).unwrap_err();
        let b = validate(&candidate).unwrap_err();
        assert_eq!(a, b);
        // Sorted by path: company.name before position.* and the missing
        // required entries interleave in path order.
        let paths: Vec<&str> = a.iter().map(|e| e.path.as_str()).collect();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
    }

    #[test]
    fn test_prompt_block_lists_path_kind_and_message() {
        let mut candidate = minimal_candidate();
        candidate.insert("company.name".to_string(), json!(123));
        let errors = validate(&candidate).unwrap_err();
        let block = errors.to_prompt_block();
        assert!(block.contains("- company.name (type_error)"));
    }
}
