// Prompt constants and builders for the extraction, conversational-fallback,
// and repair calls. All templates use `{placeholder}` replacement; context
// blocks that are absent are omitted entirely rather than rendered empty.

use serde_json::Value;

use crate::models::profile::PromptContext;
use crate::schema;
use crate::schema::validate::ValidationErrorSet;

/// Name of the single tool offered on structured calls. The provider is
/// forced to invoke it, so its `input_schema` constrains the output shape.
pub const PROFILE_TOOL_NAME: &str = "record_job_profile";

pub const PROFILE_TOOL_DESCRIPTION: &str = "Record the structured profile extracted from a job \
    advertisement. Every field you emit must be supported by the advertisement text; omit \
    optional fields the text does not support rather than guessing.";

pub const EXTRACTION_SYSTEM: &str = "You are a precise information-extraction assistant. You \
    read job advertisements and extract only facts stated in the text. You never invent \
    companies, salaries, or requirements that are not present.";

/// System prompt for conversational calls. The model must emit JSON, but the
/// shape is described in prose rather than enforced by a schema.
pub const CONVERSATIONAL_SYSTEM: &str = "You are a precise information-extraction assistant. \
    Respond with a single JSON object matching the shape described in the prompt. Extract only \
    facts stated in the advertisement text.";

/// Stricter system prompt used for the one retry after a parse failure.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

pub const REPAIR_SYSTEM: &str = "You fix structured data so it conforms to a schema. Respond \
    with the corrected JSON object only. Change only what the listed validation errors require; \
    keep every other field exactly as given.";

const STRUCTURED_PROMPT_TEMPLATE: &str = "\
Extract a structured profile from the job advertisement below.
{context_blocks}
JOB ADVERTISEMENT:
{ad_text}";

const CONVERSATIONAL_PROMPT_TEMPLATE: &str = "\
Extract a structured profile from the job advertisement below and return it as a single JSON \
object. Use these keys (dot-separated keys may be emitted flat or as nested objects):

{shape}
Omit optional keys the advertisement does not support. Do not add keys that are not listed.
{context_blocks}
JOB ADVERTISEMENT:
{ad_text}";

const REPAIR_PROMPT_TEMPLATE: &str = "\
The JSON object below failed schema validation. Fix it so every error is resolved, and return
the full corrected object.

INVALID OBJECT:
{payload_json}

VALIDATION ERRORS:
{validation_errors}

Return the corrected JSON object and nothing else.";

/// Prompt for the structured (tool-use) call. The schema travels separately
/// as the tool's `input_schema`, so the prompt carries only text and context.
pub fn build_structured_prompt(ctx: &PromptContext) -> String {
    STRUCTURED_PROMPT_TEMPLATE
        .replace("{context_blocks}", &render_context_blocks(ctx))
        .replace("{ad_text}", &ctx.text)
}

/// Prompt for the conversational call: the target shape is described inline.
pub fn build_conversational_prompt(ctx: &PromptContext) -> String {
    CONVERSATIONAL_PROMPT_TEMPLATE
        .replace("{shape}", &schema::describe_shape())
        .replace("{context_blocks}", &render_context_blocks(ctx))
        .replace("{ad_text}", &ctx.text)
}

/// Prompt for the single repair call, embedding the invalid payload and the
/// ordered validation error list so the model can target its fixes.
pub fn build_repair_prompt(payload: &Value, errors: &ValidationErrorSet) -> String {
    let payload_json =
        serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
    REPAIR_PROMPT_TEMPLATE
        .replace("{payload_json}", &payload_json)
        .replace("{validation_errors}", &errors.to_prompt_block())
}

fn render_context_blocks(ctx: &PromptContext) -> String {
    let mut blocks = String::new();
    if let Some(locale) = &ctx.locale_hint {
        blocks.push_str(&format!("\nThe advertisement locale is: {locale}\n"));
    }
    if let Some(taxonomy) = &ctx.taxonomy_context {
        blocks.push_str(&format!("\nTAXONOMY CONTEXT:\n{taxonomy}\n"));
    }
    if let Some(retrieval) = &ctx.retrieval_context {
        blocks.push_str(&format!("\nRELATED CONTEXT:\n{retrieval}\n"));
    }
    blocks
}
