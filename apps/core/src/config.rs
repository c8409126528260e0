use anyhow::{Context, Result};

use crate::pipeline::PipelineConfig;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub model_chain: Vec<String>,
    pub call_timeout_secs: u64,
    pub max_total_attempts: u32,
    pub force_conversational: bool,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let model_chain = std::env::var("JOBSCOPE_MODEL_CHAIN")
            .unwrap_or_else(|_| "claude-sonnet-4-5,claude-haiku-4-5".to_string())
            .split(',')
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect::<Vec<_>>();
        anyhow::ensure!(
            !model_chain.is_empty(),
            "JOBSCOPE_MODEL_CHAIN must name at least one model"
        );

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            model_chain,
            call_timeout_secs: std::env::var("JOBSCOPE_CALL_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse::<u64>()
                .context("JOBSCOPE_CALL_TIMEOUT_SECS must be a number of seconds")?,
            max_total_attempts: std::env::var("JOBSCOPE_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "4".to_string())
                .parse::<u32>()
                .context("JOBSCOPE_MAX_ATTEMPTS must be a positive integer")?,
            force_conversational: std::env::var("JOBSCOPE_FORCE_CONVERSATIONAL")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            model_chain: self.model_chain.clone(),
            max_total_attempts: self.max_total_attempts,
            force_conversational: self.force_conversational,
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
