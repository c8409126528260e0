//! Canonical schema — the authoritative shape every Profile must satisfy.
//!
//! The schema is a static table of `FieldSpec`s keyed by canonical dot-path.
//! It is read-only shared state: concurrent runs need no locking. The same
//! table drives canonicalization, validation, the JSON schema sent on
//! structured calls, and the shape description embedded in conversational
//! prompts, so the four can never drift apart.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

pub mod aliases;
pub mod canonicalize;
pub mod validate;

/// Declared semantic type of a canonical leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    /// Integers and floats are distinct: a float where an integer is
    /// declared is a type error, never an implicit floor.
    Integer,
    Float,
    Boolean,
    Enum(&'static [&'static str]),
    ListOfString,
    ListOfObject(&'static [ObjectField]),
}

/// Scalar leaf inside a list-of-object item. Unknown sibling keys in an
/// item are a validation error (`additionalProperties` disallowed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectField {
    pub name: &'static str,
    pub kind: ObjectFieldKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectFieldKind {
    String,
    Integer,
    Float,
    Boolean,
}

/// Declared default for a required field, applied only by the backfill
/// stage when no producer supplied a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    Str(&'static str),
    EmptyList,
}

impl DefaultValue {
    pub fn to_value(self) -> Value {
        match self {
            DefaultValue::Str(s) => Value::String(s.to_string()),
            DefaultValue::EmptyList => Value::Array(vec![]),
        }
    }
}

/// One canonical leaf of the Profile schema.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub path: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<DefaultValue>,
}

pub const SENIORITY: &[&str] = &["junior", "mid", "senior", "lead", "unspecified"];
pub const EMPLOYMENT_TYPE: &[&str] = &[
    "full_time",
    "part_time",
    "contract",
    "internship",
    "unspecified",
];
pub const CURRENCY: &[&str] = &["USD", "EUR", "GBP", "CHF", "other"];
pub const PERIOD: &[&str] = &["yearly", "monthly", "daily", "hourly"];

const EXTRA_FIELDS: &[ObjectField] = &[
    ObjectField {
        name: "label",
        kind: ObjectFieldKind::String,
    },
    ObjectField {
        name: "value",
        kind: ObjectFieldKind::String,
    },
];

/// The canonical schema table. Sorted by path for readability; lookup goes
/// through `spec_for`.
pub const SCHEMA: &[FieldSpec] = &[
    FieldSpec {
        path: "benefits",
        kind: FieldKind::ListOfString,
        required: false,
        default: None,
    },
    FieldSpec {
        path: "company.industry",
        kind: FieldKind::String,
        required: false,
        default: None,
    },
    FieldSpec {
        path: "company.name",
        kind: FieldKind::String,
        required: true,
        default: Some(DefaultValue::Str("Unknown company")),
    },
    FieldSpec {
        path: "company.website",
        kind: FieldKind::String,
        required: false,
        default: None,
    },
    FieldSpec {
        path: "compensation.currency",
        kind: FieldKind::Enum(CURRENCY),
        required: false,
        default: None,
    },
    FieldSpec {
        path: "compensation.equity_pct",
        kind: FieldKind::Float,
        required: false,
        default: None,
    },
    FieldSpec {
        path: "compensation.period",
        kind: FieldKind::Enum(PERIOD),
        required: false,
        default: None,
    },
    FieldSpec {
        path: "compensation.salary_max",
        kind: FieldKind::Integer,
        required: false,
        default: None,
    },
    FieldSpec {
        path: "compensation.salary_min",
        kind: FieldKind::Integer,
        required: false,
        default: None,
    },
    FieldSpec {
        path: "contact.email",
        kind: FieldKind::String,
        required: false,
        default: None,
    },
    FieldSpec {
        path: "contact.phone",
        kind: FieldKind::String,
        required: false,
        default: None,
    },
    FieldSpec {
        path: "description.summary",
        kind: FieldKind::String,
        required: false,
        default: None,
    },
    FieldSpec {
        path: "extras",
        kind: FieldKind::ListOfObject(EXTRA_FIELDS),
        required: false,
        default: None,
    },
    FieldSpec {
        path: "location.city",
        kind: FieldKind::String,
        required: false,
        default: None,
    },
    FieldSpec {
        path: "location.country",
        kind: FieldKind::String,
        required: false,
        default: None,
    },
    FieldSpec {
        path: "position.employment_type",
        kind: FieldKind::Enum(EMPLOYMENT_TYPE),
        required: true,
        default: Some(DefaultValue::Str("unspecified")),
    },
    FieldSpec {
        path: "position.remote",
        kind: FieldKind::Boolean,
        required: false,
        default: None,
    },
    FieldSpec {
        path: "position.seniority",
        kind: FieldKind::Enum(SENIORITY),
        required: true,
        default: Some(DefaultValue::Str("unspecified")),
    },
    FieldSpec {
        path: "position.title",
        kind: FieldKind::String,
        required: true,
        default: Some(DefaultValue::Str("Unspecified role")),
    },
    FieldSpec {
        path: "requirements.education",
        kind: FieldKind::String,
        required: false,
        default: None,
    },
    FieldSpec {
        path: "requirements.experience_years",
        kind: FieldKind::Integer,
        required: false,
        default: None,
    },
    FieldSpec {
        path: "requirements.languages",
        kind: FieldKind::ListOfString,
        required: false,
        default: None,
    },
    FieldSpec {
        path: "requirements.skills",
        kind: FieldKind::ListOfString,
        required: true,
        default: Some(DefaultValue::EmptyList),
    },
    FieldSpec {
        path: "responsibilities",
        kind: FieldKind::ListOfString,
        required: false,
        default: None,
    },
];

/// Looks up the field spec for a canonical dot-path.
pub fn spec_for(path: &str) -> Option<&'static FieldSpec> {
    SCHEMA.iter().find(|s| s.path == path)
}

/// Specs for all required fields, in path order.
pub fn required_specs() -> impl Iterator<Item = &'static FieldSpec> {
    SCHEMA.iter().filter(|s| s.required)
}

pub fn kind_name(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::String => "string",
        FieldKind::Integer => "integer",
        FieldKind::Float => "float",
        FieldKind::Boolean => "boolean",
        FieldKind::Enum(_) => "enum",
        FieldKind::ListOfString => "list of strings",
        FieldKind::ListOfObject(_) => "list of objects",
    }
}

// ────────────────────────────────────────────────────────────────────────────
// JSON Schema rendering (for structured calls)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct SchemaNode {
    children: BTreeMap<String, SchemaNode>,
    leaf: Option<&'static FieldSpec>,
}

/// Renders the canonical schema as a JSON Schema object, nested by dot-path
/// segments, with `additionalProperties: false` at every level. This is the
/// `input_schema` sent on structured calls.
pub fn json_schema() -> Value {
    let mut root = SchemaNode::default();
    for spec in SCHEMA {
        let mut node = &mut root;
        for segment in spec.path.split('.') {
            node = node.children.entry(segment.to_string()).or_default();
        }
        node.leaf = Some(spec);
    }
    render_object(&root)
}

fn render_object(node: &SchemaNode) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for (name, child) in &node.children {
        let schema = match child.leaf {
            Some(spec) => {
                if spec.required {
                    required.push(Value::String(name.clone()));
                }
                leaf_schema(spec.kind)
            }
            None => {
                if subtree_has_required(child) {
                    required.push(Value::String(name.clone()));
                }
                render_object(child)
            }
        };
        properties.insert(name.clone(), schema);
    }
    json!({
        "type": "object",
        "properties": Value::Object(properties),
        "required": required,
        "additionalProperties": false,
    })
}

fn subtree_has_required(node: &SchemaNode) -> bool {
    node.children
        .values()
        .any(|c| c.leaf.map(|s| s.required).unwrap_or(false) || subtree_has_required(c))
}

fn leaf_schema(kind: FieldKind) -> Value {
    match kind {
        FieldKind::String => json!({"type": "string"}),
        FieldKind::Integer => json!({"type": "integer"}),
        FieldKind::Float => json!({"type": "number"}),
        FieldKind::Boolean => json!({"type": "boolean"}),
        FieldKind::Enum(options) => json!({"type": "string", "enum": options}),
        FieldKind::ListOfString => json!({"type": "array", "items": {"type": "string"}}),
        FieldKind::ListOfObject(fields) => {
            let mut properties = Map::new();
            let mut required = Vec::new();
            for field in fields {
                let ty = match field.kind {
                    ObjectFieldKind::String => "string",
                    ObjectFieldKind::Integer => "integer",
                    ObjectFieldKind::Float => "number",
                    ObjectFieldKind::Boolean => "boolean",
                };
                properties.insert(field.name.to_string(), json!({"type": ty}));
                required.push(Value::String(field.name.to_string()));
            }
            json!({
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": Value::Object(properties),
                    "required": required,
                    "additionalProperties": false,
                },
            })
        }
    }
}

/// Human-readable shape description embedded in conversational prompts.
pub fn describe_shape() -> String {
    let mut out = String::new();
    for spec in SCHEMA {
        let requirement = if spec.required { ", required" } else { "" };
        let detail = match spec.kind {
            FieldKind::Enum(options) => format!(" one of: {}", options.join(", ")),
            FieldKind::ListOfObject(fields) => {
                let names: Vec<&str> = fields.iter().map(|f| f.name).collect();
                format!(" items with keys: {}", names.join(", "))
            }
            _ => String::new(),
        };
        out.push_str(&format!(
            "- {} ({}{}){}\n",
            spec.path,
            kind_name(spec.kind),
            requirement,
            detail
        ));
    }
    out
}
