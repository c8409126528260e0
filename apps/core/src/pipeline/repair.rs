//! Repair Agent — the single corrective follow-up call.
//!
//! Issues exactly one conversational call embedding the invalid payload and
//! the ordered validation errors. The returned payload is untrusted and
//! re-enters canonicalization + validation from scratch; the orchestrator
//! never repairs a payload twice.

use serde_json::Value;
use tracing::info;

use crate::errors::TransportError;
use crate::llm_client::prompts::{build_repair_prompt, REPAIR_SYSTEM};
use crate::llm_client::{parse_json_output, Transport};
use crate::schema::validate::ValidationErrorSet;

/// One repair call against `model`. Parse failures of the repair output are
/// reported as `Parse` and consumed by the orchestrator as exhaustion; there
/// is no stricter-retry here, the budget is exactly one call.
pub async fn repair(
    transport: &dyn Transport,
    model: &str,
    invalid_payload: &Value,
    errors: &ValidationErrorSet,
) -> Result<Value, TransportError> {
    info!(model, error_count = errors.len(), "issuing repair call");
    let prompt = build_repair_prompt(invalid_payload, errors);
    let text = transport
        .call_conversational(model, &prompt, REPAIR_SYSTEM)
        .await?;
    parse_json_output(&text)
}
