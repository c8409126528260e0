// Extraction pipeline: orchestration, repair, backfill, normalization,
// provenance. All LLM calls go through llm_client's Transport seam — no
// direct provider calls here.

pub mod backfill;
pub mod normalize;
pub mod orchestrator;
pub mod provenance;
pub mod repair;

pub use orchestrator::{Pipeline, PipelineConfig};
