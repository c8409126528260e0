//! Error taxonomies for the extraction pipeline.
//!
//! `TransportError` classifies stage-local failures; the orchestrator
//! consumes these as transition signals and never lets them cross the public
//! boundary. `PipelineFailure` is the small, explicit enum a caller can see.

use thiserror::Error;

use crate::models::profile::AttemptRecord;
use crate::schema::validate::ValidationErrorSet;

/// Classified failure of a single transport or repair call.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The provider refused the schema itself. Never retried against the
    /// same transport style; the orchestrator skips straight to the
    /// conversational fallback.
    #[error("provider rejected the output schema: {0}")]
    SchemaRejected(String),

    /// Response ended without usable content (no tool output, or the model
    /// stopped at its token limit). Retried once against the same model.
    #[error("response was empty or truncated")]
    EmptyOrTruncated,

    /// Network, timeout, rate-limit, or server-side failure. Retried across
    /// the model-fallback chain, bounded by the attempt budget.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Conversational output was not parseable JSON. Retried once with a
    /// stricter JSON-only instruction, then treated as exhausted.
    #[error("output was not valid JSON: {0}")]
    Parse(String),
}

impl TransportError {
    /// Stable string used in attempt-log records.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::SchemaRejected(_) => "schema_rejected",
            TransportError::EmptyOrTruncated => "empty_or_truncated",
            TransportError::Transport(_) => "transport_error",
            TransportError::Parse(_) => "parse_error",
        }
    }
}

/// Terminal, caller-visible failure of an orchestration run. Everything else
/// is absorbed by the state machine; the caller never sees a raw transport
/// exception or a partially-validated payload.
#[derive(Debug, Error)]
pub enum PipelineFailure {
    /// Every transport attempt failed and no backfill extractor was wired in.
    #[error("all transport attempts exhausted ({} attempts)", attempt_log.len())]
    AllTransportsExhausted { attempt_log: Vec<AttemptRecord> },

    /// The rule-based extractor could not produce even a minimal valid
    /// profile. This is a hard error, not silently swallowed.
    #[error("rule-based backfill failed validation: {errors}")]
    BackfillFailed {
        attempt_log: Vec<AttemptRecord>,
        errors: ValidationErrorSet,
    },

    /// The run-level deadline expired before any stage produced a profile.
    #[error("run deadline exceeded after {} attempts", attempt_log.len())]
    DeadlineExceeded { attempt_log: Vec<AttemptRecord> },
}

impl PipelineFailure {
    pub fn attempt_log(&self) -> &[AttemptRecord] {
        match self {
            PipelineFailure::AllTransportsExhausted { attempt_log }
            | PipelineFailure::DeadlineExceeded { attempt_log } => attempt_log,
            PipelineFailure::BackfillFailed { attempt_log, .. } => attempt_log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_kinds_are_stable() {
        assert_eq!(
            TransportError::SchemaRejected("bad".into()).kind(),
            "schema_rejected"
        );
        assert_eq!(TransportError::EmptyOrTruncated.kind(), "empty_or_truncated");
        assert_eq!(
            TransportError::Transport("timeout".into()).kind(),
            "transport_error"
        );
        assert_eq!(TransportError::Parse("x".into()).kind(), "parse_error");
    }

    #[test]
    fn test_pipeline_failure_exposes_attempt_log() {
        let failure = PipelineFailure::AllTransportsExhausted {
            attempt_log: vec![],
        };
        assert!(failure.attempt_log().is_empty());
    }
}
