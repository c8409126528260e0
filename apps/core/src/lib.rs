//! jobscope — turns free-form job advertisements into schema-valid,
//! provenance-tagged profiles by orchestrating an unreliable LLM provider
//! behind bounded retries, multi-tier fallback, and single-shot repair.
//!
//! Public surface: build a [`Pipeline`] around a [`Transport`] (usually
//! [`LlmClient`]) plus an optional rule-based backfill extractor, then call
//! [`Pipeline::extract_profile`]. The result is always either a validated
//! [`Profile`] paired with its provenance [`Metadata`], or a typed
//! [`PipelineFailure`] carrying the attempt log.

pub mod config;
pub mod errors;
pub mod llm_client;
pub mod models;
pub mod pipeline;
pub mod schema;

pub use config::Config;
pub use errors::{PipelineFailure, TransportError};
pub use llm_client::{LlmClient, Transport};
pub use models::profile::{
    AttemptOutcome, AttemptRecord, ConfidenceTier, FieldConfidence, Metadata, Options, Profile,
    Stage, TransportKind, ValueSource,
};
pub use pipeline::backfill::{RegexExtractor, RuleExtractor};
pub use pipeline::{Pipeline, PipelineConfig};
pub use schema::validate::{ValidationError, ValidationErrorSet};
