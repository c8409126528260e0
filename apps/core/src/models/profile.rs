//! Core data types shared across the pipeline: the validated `Profile`,
//! its provenance side-channel `Metadata`, the per-run attempt log, and the
//! per-call `Options` / `PromptContext` inputs.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Profile
// ────────────────────────────────────────────────────────────────────────────

/// A schema-valid extraction result, keyed by canonical dot-path
/// (e.g. `company.name`, `compensation.salary_min`).
///
/// INVARIANT: a `Profile` can only be constructed by the schema validator
/// (or by pipeline stages that re-validate their output), so holding one is
/// proof the payload passed validation. There is no partially-valid state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Profile {
    fields: BTreeMap<String, Value>,
}

impl Profile {
    /// Wraps an already-validated field map. Crate-private on purpose:
    /// callers outside the validator never mint Profiles directly.
    pub(crate) fn from_validated(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.fields.get(path)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Canonical dot-paths present in this profile, in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Provenance metadata
// ────────────────────────────────────────────────────────────────────────────

/// Confidence tier attached to each profile field, from strongest to weakest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    RuleStrong,
    AiAssisted,
    Default,
}

/// Which stage actually produced a field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    Rule,
    Model,
    Heuristic,
}

/// Per-field provenance record. Lives in `Metadata`, never inside the
/// `Profile` payload, and must never influence validation outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfidence {
    pub tier: ConfidenceTier,
    pub source: ValueSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Side-channel metadata returned alongside every `Profile`.
#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    pub run_id: Uuid,
    /// One entry per leaf dot-path in the final profile.
    pub fields: BTreeMap<String, FieldConfidence>,
    /// Per-run attempt log, surfaced for diagnostics. Not persisted with
    /// the profile.
    pub attempt_log: Vec<AttemptRecord>,
}

// ────────────────────────────────────────────────────────────────────────────
// Attempt log
// ────────────────────────────────────────────────────────────────────────────

/// Pipeline stage names as they appear in the attempt log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    StructuredAttempt,
    ConversationalAttempt,
    RepairAttempt,
    HeuristicBackfill,
    Normalize,
    /// Recovery repair issued only when normalization invalidates a
    /// previously valid profile. Kept distinct from `RepairAttempt` so the
    /// one-repair-per-run bound stays checkable.
    NormalizeRepair,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Structured,
    Conversational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
}

/// One entry per stage attempt within a single orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_kind: Option<TransportKind>,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub at: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn success(stage: Stage, model_id: Option<&str>, kind: Option<TransportKind>) -> Self {
        Self {
            stage,
            model_id: model_id.map(str::to_string),
            transport_kind: kind,
            outcome: AttemptOutcome::Success,
            error_kind: None,
            at: Utc::now(),
        }
    }

    pub fn failure(
        stage: Stage,
        model_id: Option<&str>,
        kind: Option<TransportKind>,
        error_kind: &str,
    ) -> Self {
        Self {
            stage,
            model_id: model_id.map(str::to_string),
            transport_kind: kind,
            outcome: AttemptOutcome::Failure,
            error_kind: Some(error_kind.to_string()),
            at: Utc::now(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Per-call options and prompt context
// ────────────────────────────────────────────────────────────────────────────

/// Per-run options. Immutable for the duration of a run; concurrent runs
/// each get their own copy, so there is no shared mutable routing state.
#[derive(Debug, Clone)]
pub struct Options {
    /// Overrides the configured model-fallback chain when set.
    pub model_chain: Option<Vec<String>>,
    /// When false, validation failures skip straight to backfill.
    pub repair_enabled: bool,
    /// Overrides the configured total transport-attempt budget when set.
    pub max_total_attempts: Option<u32>,
    /// Overall run deadline. In-flight calls past the deadline are abandoned.
    pub deadline: Option<Duration>,
    /// Locale hint supplied by the ingestion collaborator, if any.
    pub locale_hint: Option<String>,
    /// Optional taxonomy context block injected into extraction prompts.
    pub taxonomy_context: Option<String>,
    /// Optional retrieval-augmentation context block.
    pub retrieval_context: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            model_chain: None,
            repair_enabled: true,
            max_total_attempts: None,
            deadline: None,
            locale_hint: None,
            taxonomy_context: None,
            retrieval_context: None,
        }
    }
}

/// Everything the prompt builders need to render an extraction request.
/// Absent optional blocks are simply omitted from the rendered prompt.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub text: String,
    pub locale_hint: Option<String>,
    pub taxonomy_context: Option<String>,
    pub retrieval_context: Option<String>,
}

impl PromptContext {
    pub fn new(text: &str, options: &Options) -> Self {
        Self {
            text: text.to_string(),
            locale_hint: options.locale_hint.clone(),
            taxonomy_context: options.taxonomy_context.clone(),
            retrieval_context: options.retrieval_context.clone(),
        }
    }
}
