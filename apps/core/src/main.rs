//! Thin CLI surface: reads job-ad text from a file argument or stdin, runs
//! the extraction pipeline, prints the (profile, metadata) pair as JSON.

use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use jobscope::{Config, LlmClient, Options, Pipeline, RegexExtractor};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("jobscope v{}", env!("CARGO_PKG_VERSION"));

    let text = read_input().context("Failed to read job-ad text")?;
    anyhow::ensure!(!text.trim().is_empty(), "No input text provided");

    let llm = LlmClient::new(config.anthropic_api_key.clone(), config.call_timeout_secs);
    let pipeline = Pipeline::new(Arc::new(llm))
        .with_extractor(Arc::new(RegexExtractor))
        .with_config(config.pipeline_config());

    match pipeline.extract_profile(&text, &Options::default()).await {
        Ok((profile, metadata)) => {
            let output = json!({
                "profile": profile,
                "metadata": metadata,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(failure) => {
            error!("extraction failed: {failure}");
            let output = json!({
                "error": failure.to_string(),
                "attempt_log": failure.attempt_log(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            std::process::exit(1);
        }
    }
}

/// First CLI argument is a path to the ad text; with no argument, stdin is
/// read to EOF.
fn read_input() -> Result<String> {
    match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read file '{path}'")),
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}
