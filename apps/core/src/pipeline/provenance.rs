//! Provenance Tracker — per-field confidence tiers and sources.
//!
//! Maps each leaf dot-path in the final profile to a `FieldConfidence`
//! based on which stage actually produced the value. Advisory metadata for
//! downstream consumers and UI gating; never consulted by validation.

use std::collections::BTreeMap;

use crate::models::profile::{ConfidenceTier, FieldConfidence, Profile, ValueSource};

/// Which stage supplied a field's value, recorded by the orchestrator as
/// payloads are accepted. Survives repair and normalization: those stages
/// rewrite values, not their origin, unless a later stage actually supplies
/// a materially different value for the path.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOrigin {
    /// Model output that survived validation (possibly repaired).
    Model,
    /// Produced by a backfill extraction rule.
    Rule {
        rule_id: Option<String>,
        score: Option<f64>,
    },
    /// Left at the schema default because no stage supplied a value.
    Default,
}

/// Builds the per-field confidence map for a final profile. Paths without a
/// recorded origin are treated as schema defaults, the lowest tier.
pub fn annotate(
    profile: &Profile,
    origins: &BTreeMap<String, FieldOrigin>,
) -> BTreeMap<String, FieldConfidence> {
    profile
        .paths()
        .map(|path| {
            let confidence = match origins.get(path) {
                Some(FieldOrigin::Model) => FieldConfidence {
                    tier: ConfidenceTier::AiAssisted,
                    source: ValueSource::Model,
                    rule_id: None,
                    score: None,
                },
                Some(FieldOrigin::Rule { rule_id, score }) => FieldConfidence {
                    tier: ConfidenceTier::RuleStrong,
                    source: ValueSource::Rule,
                    rule_id: rule_id.clone(),
                    score: *score,
                },
                Some(FieldOrigin::Default) | None => FieldConfidence {
                    tier: ConfidenceTier::Default,
                    source: ValueSource::Heuristic,
                    rule_id: None,
                    score: None,
                },
            };
            (path.to_string(), confidence)
        })
        .collect()
}
