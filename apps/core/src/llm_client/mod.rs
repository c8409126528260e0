//! LLM Client — the single point of entry for all remote model calls.
//!
//! ARCHITECTURAL RULE: no other module talks to the provider API directly.
//! The orchestrator depends on the `Transport` trait, not on `LlmClient`,
//! so tests drive the whole pipeline through a scripted mock.
//!
//! Two call styles against the Anthropic Messages API:
//! - structured: a single forced tool whose `input_schema` is the canonical
//!   JSON schema, so the provider constrains the output shape;
//! - conversational: a plain message whose prompt describes the shape, with
//!   the raw text returned for downstream JSON parsing.
//!
//! The client is single-shot per call. Retry, model rotation, and deadlines
//! are orchestrator policy, because each fallback decision depends on the
//! error classification of the previous attempt.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::TransportError;

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Transport seam between the orchestrator and the remote provider.
/// `model` is the provider model identifier from the fallback chain.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Structured call: the provider is constrained by `schema` and must
    /// return schema-shaped JSON. The result is still untrusted and goes
    /// through canonicalization + validation.
    async fn call_structured(
        &self,
        model: &str,
        prompt: &str,
        schema: &Value,
    ) -> Result<Value, TransportError>;

    /// Conversational call: no schema is sent; the prompt instructs the
    /// model to emit JSON. Returns raw text for the caller to parse.
    async fn call_conversational(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
    ) -> Result<String, TransportError>;
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ApiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolSpec<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ToolSpec<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
    input: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl ApiResponse {
    fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }

    fn tool_input(&self) -> Option<&Value> {
        self.content
            .iter()
            .find(|b| b.block_type == "tool_use")
            .and_then(|b| b.input.as_ref())
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// HTTP client for the provider API. Cheap to clone; a per-call timeout is
/// baked into the underlying `reqwest` client.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
}

impl LlmClient {
    pub fn new(api_key: String, call_timeout_secs: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(call_timeout_secs))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    async fn send(&self, request: &ApiRequest<'_>) -> Result<ApiResponse, TransportError> {
        let schema_sent = request.tools.is_some();

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Transport("request timed out".to_string())
                } else {
                    TransportError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);

            // A 400 naming the tool schema means the provider refuses the
            // schema itself, which no amount of retrying will fix.
            if status.as_u16() == 400
                && schema_sent
                && (message.contains("tool") || message.contains("schema"))
            {
                warn!("provider rejected the output schema: {message}");
                return Err(TransportError::SchemaRejected(message));
            }

            warn!("provider returned {status}: {message}");
            return Err(TransportError::Transport(format!("{status}: {message}")));
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Transport(format!("malformed API response: {e}")))?;

        debug!(
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "LLM call succeeded"
        );

        Ok(parsed)
    }
}

#[async_trait]
impl Transport for LlmClient {
    async fn call_structured(
        &self,
        model: &str,
        prompt: &str,
        schema: &Value,
    ) -> Result<Value, TransportError> {
        let request = ApiRequest {
            model,
            max_tokens: MAX_TOKENS,
            system: prompts::EXTRACTION_SYSTEM,
            messages: vec![ApiMessage {
                role: "user",
                content: prompt,
            }],
            tools: Some(vec![ToolSpec {
                name: prompts::PROFILE_TOOL_NAME,
                description: prompts::PROFILE_TOOL_DESCRIPTION,
                input_schema: schema,
            }]),
            tool_choice: Some(json!({"type": "tool", "name": prompts::PROFILE_TOOL_NAME})),
        };

        let response = self.send(&request).await?;

        match response.tool_input() {
            Some(input) => Ok(input.clone()),
            // No tool invocation in the response: either the model stopped
            // at its token limit or emitted prose. Both count as truncated.
            None => {
                warn!(
                    model,
                    stop_reason = response.stop_reason.as_deref().unwrap_or("unknown"),
                    "structured call returned no tool output"
                );
                Err(TransportError::EmptyOrTruncated)
            }
        }
    }

    async fn call_conversational(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
    ) -> Result<String, TransportError> {
        let request = ApiRequest {
            model,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![ApiMessage {
                role: "user",
                content: prompt,
            }],
            tools: None,
            tool_choice: None,
        };

        let response = self.send(&request).await?;

        match response.text() {
            Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
            _ => Err(TransportError::EmptyOrTruncated),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Output parsing helpers
// ────────────────────────────────────────────────────────────────────────────

/// Parses conversational output into JSON. Strips markdown fences first,
/// then falls back to the outermost `{…}` span for models that wrap the
/// object in prose. Anything else is a `Parse` error.
pub fn parse_json_output(text: &str) -> Result<Value, TransportError> {
    let stripped = strip_json_fences(text);
    if let Ok(value) = serde_json::from_str::<Value>(stripped) {
        return Ok(value);
    }
    if let (Some(start), Some(end)) = (stripped.find('{'), stripped.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&stripped[start..=end]) {
                return Ok(value);
            }
        }
    }
    Err(TransportError::Parse(
        text.chars().take(120).collect::<String>(),
    ))
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}
