//! Orchestrator — the extraction state machine.
//!
//! Stage order: structured attempts across the model-fallback chain →
//! conversational fallback across the same chain → at most one repair →
//! heuristic backfill → normalization. Attempts are strictly sequential;
//! each fallback decision depends on the classified error of the previous
//! attempt, so there is no speculative parallel dispatch.
//!
//! Every run terminates in either a valid (possibly minimal) `Profile` or a
//! typed `PipelineFailure`. Stage-local errors never cross this boundary.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{PipelineFailure, TransportError};
use crate::llm_client::{parse_json_output, prompts, Transport};
use crate::models::profile::{
    AttemptRecord, Metadata, Options, Profile, PromptContext, Stage, TransportKind,
};
use crate::pipeline::backfill::{complete_with_defaults, RuleExtractor};
use crate::pipeline::provenance::FieldOrigin;
use crate::pipeline::{normalize, provenance, repair};
use crate::schema;
use crate::schema::canonicalize::{canonicalize, flat_to_value};
use crate::schema::validate::validate;

/// Static pipeline configuration, loaded once at startup. Per-run overrides
/// travel in `Options`; nothing here is mutated after construction, so
/// concurrent runs share it freely.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Ordered model-fallback chain, primary first.
    pub model_chain: Vec<String>,
    /// Total transport-attempt budget per run (structured + conversational,
    /// including single-model retries). Repair has its own budget of one.
    pub max_total_attempts: u32,
    /// Skips structured attempts entirely, for environments where the
    /// provider does not support tool-constrained output.
    pub force_conversational: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_chain: vec![
                "claude-sonnet-4-5".to_string(),
                "claude-haiku-4-5".to_string(),
            ],
            max_total_attempts: 4,
            force_conversational: false,
        }
    }
}

/// The extraction pipeline. Cheap to clone and safe to share across tasks:
/// each call to `extract_profile` owns its own attempt log, fallback cursor,
/// and repair budget.
#[derive(Clone)]
pub struct Pipeline {
    transport: Arc<dyn Transport>,
    extractor: Option<Arc<dyn RuleExtractor>>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            extractor: None,
            config: PipelineConfig::default(),
        }
    }

    /// Wires in the rule-based backfill collaborator. Without one, transport
    /// exhaustion is terminal (`AllTransportsExhausted`).
    pub fn with_extractor(mut self, extractor: Arc<dyn RuleExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs one extraction. Always returns either a schema-valid profile
    /// with its provenance metadata, or a typed failure carrying the attempt
    /// log — never a raw transport error, never partially-validated data.
    pub async fn extract_profile(
        &self,
        text: &str,
        options: &Options,
    ) -> Result<(Profile, Metadata), PipelineFailure> {
        let run_id = Uuid::new_v4();
        let chain = options
            .model_chain
            .clone()
            .unwrap_or_else(|| self.config.model_chain.clone());
        let max_attempts = options
            .max_total_attempts
            .unwrap_or(self.config.max_total_attempts);
        let deadline = options.deadline.map(|d| Instant::now() + d);

        info!(%run_id, models = ?chain, max_attempts, "starting extraction run");

        let mut run = Run {
            transport: self.transport.as_ref(),
            extractor: self.extractor.as_deref(),
            ctx: PromptContext::new(text, options),
            chain,
            max_attempts,
            attempts_used: 0,
            repair_enabled: options.repair_enabled,
            force_conversational: self.config.force_conversational,
            deadline,
            log: Vec::new(),
        };

        let transported = match run.structured_phase().await {
            Some(hit) => Some(hit),
            None => run.conversational_phase().await,
        };

        let (profile, mut origins, active_model) = match transported {
            Some((payload, model)) => match run.validate_with_repair(&payload, &model).await {
                Some((profile, origins)) => (profile, origins, Some(model)),
                None => {
                    let (profile, origins) = run.backfill_stage(text)?;
                    (profile, origins, None)
                }
            },
            None => {
                let (profile, origins) = run.backfill_stage(text)?;
                (profile, origins, None)
            }
        };

        let profile = run
            .normalize_stage(profile, active_model.as_deref(), &mut origins)
            .await;
        let fields = provenance::annotate(&profile, &origins);

        info!(%run_id, field_count = profile.len(), attempts = run.attempts_used, "extraction run complete");

        Ok((
            profile,
            Metadata {
                run_id,
                fields,
                attempt_log: run.log,
            },
        ))
    }
}

/// Per-run state: attempt log, budget counters, and the fallback cursor.
/// Owned by a single task for the duration of the run.
struct Run<'a> {
    transport: &'a dyn Transport,
    extractor: Option<&'a dyn RuleExtractor>,
    ctx: PromptContext,
    chain: Vec<String>,
    max_attempts: u32,
    attempts_used: u32,
    repair_enabled: bool,
    force_conversational: bool,
    deadline: Option<Instant>,
    log: Vec<AttemptRecord>,
}

/// Races a stage call against the run deadline. On expiry the in-flight
/// future is dropped (not awaited to completion) and the orchestrator moves
/// on as if a transport error occurred.
async fn with_deadline<T>(
    deadline: Option<Instant>,
    fut: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    match deadline {
        Some(at) => match tokio::time::timeout_at(at, fut).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Transport("run deadline exceeded".to_string())),
        },
        None => fut.await,
    }
}

impl Run<'_> {
    fn expired(&self) -> bool {
        self.deadline.map(|at| Instant::now() >= at).unwrap_or(false)
    }

    fn budget_left(&self) -> bool {
        self.attempts_used < self.max_attempts && !self.expired()
    }

    /// Structured attempts, rotating through the fallback chain in order.
    /// `SchemaRejected` abandons the structured style entirely; a truncated
    /// response gets one re-issue against the same model.
    async fn structured_phase(&mut self) -> Option<(Value, String)> {
        if self.force_conversational {
            return None;
        }
        let schema_value = schema::json_schema();
        let prompt = prompts::build_structured_prompt(&self.ctx);

        let chain = self.chain.clone();
        'chain: for model in chain {
            let mut retried_truncation = false;
            loop {
                if !self.budget_left() {
                    break 'chain;
                }
                self.attempts_used += 1;
                let result = with_deadline(
                    self.deadline,
                    self.transport.call_structured(&model, &prompt, &schema_value),
                )
                .await;
                match result {
                    Ok(payload) => {
                        self.log.push(AttemptRecord::success(
                            Stage::StructuredAttempt,
                            Some(&model),
                            Some(TransportKind::Structured),
                        ));
                        info!(%model, "structured attempt produced a payload");
                        return Some((payload, model));
                    }
                    Err(err) => {
                        warn!(%model, error = %err, "structured attempt failed");
                        self.log.push(AttemptRecord::failure(
                            Stage::StructuredAttempt,
                            Some(&model),
                            Some(TransportKind::Structured),
                            err.kind(),
                        ));
                        match err {
                            TransportError::SchemaRejected(_) => break 'chain,
                            TransportError::EmptyOrTruncated if !retried_truncation => {
                                retried_truncation = true;
                            }
                            _ => break,
                        }
                    }
                }
            }
        }
        None
    }

    /// Conversational fallback over the same chain. A parse failure gets one
    /// stricter JSON-only retry against the same model, then the cursor
    /// advances.
    async fn conversational_phase(&mut self) -> Option<(Value, String)> {
        let prompt = prompts::build_conversational_prompt(&self.ctx);

        let chain = self.chain.clone();
        for model in chain {
            let mut strict = false;
            loop {
                if !self.budget_left() {
                    return None;
                }
                self.attempts_used += 1;
                let system = if strict {
                    prompts::JSON_ONLY_SYSTEM
                } else {
                    prompts::CONVERSATIONAL_SYSTEM
                };
                let result = with_deadline(
                    self.deadline,
                    self.transport.call_conversational(&model, &prompt, system),
                )
                .await
                .and_then(|text| parse_json_output(&text));
                match result {
                    Ok(payload) => {
                        self.log.push(AttemptRecord::success(
                            Stage::ConversationalAttempt,
                            Some(&model),
                            Some(TransportKind::Conversational),
                        ));
                        info!(%model, "conversational attempt produced a payload");
                        return Some((payload, model));
                    }
                    Err(err) => {
                        warn!(%model, error = %err, "conversational attempt failed");
                        self.log.push(AttemptRecord::failure(
                            Stage::ConversationalAttempt,
                            Some(&model),
                            Some(TransportKind::Conversational),
                            err.kind(),
                        ));
                        match err {
                            TransportError::Parse(_) if !strict => strict = true,
                            _ => break,
                        }
                    }
                }
            }
        }
        None
    }

    /// Canonicalize + validate, with at most one repair on failure. The
    /// repaired payload re-enters canonicalization and validation from
    /// scratch and is never repaired twice.
    async fn validate_with_repair(
        &mut self,
        payload: &Value,
        model: &str,
    ) -> Option<(Profile, BTreeMap<String, FieldOrigin>)> {
        let candidate = canonicalize(payload);
        let errors = match validate(&candidate) {
            Ok(profile) => {
                let origins = model_origins(&profile);
                return Some((profile, origins));
            }
            Err(errors) => errors,
        };

        warn!(error_count = errors.len(), "payload failed validation: {errors}");
        if !self.repair_enabled {
            return None;
        }

        // Repair sees the canonical flat object so error paths line up with
        // the keys it must fix.
        let flat = flat_to_value(&candidate);
        let repaired = with_deadline(
            self.deadline,
            repair::repair(self.transport, model, &flat, &errors),
        )
        .await;

        match repaired {
            Ok(repaired_payload) => {
                let candidate = canonicalize(&repaired_payload);
                match validate(&candidate) {
                    Ok(profile) => {
                        self.log.push(AttemptRecord::success(
                            Stage::RepairAttempt,
                            Some(model),
                            Some(TransportKind::Conversational),
                        ));
                        info!(model, "repair produced a valid profile");
                        let origins = model_origins(&profile);
                        Some((profile, origins))
                    }
                    Err(still_invalid) => {
                        warn!("repaired payload still invalid: {still_invalid}");
                        self.log.push(AttemptRecord::failure(
                            Stage::RepairAttempt,
                            Some(model),
                            Some(TransportKind::Conversational),
                            "validation_failure",
                        ));
                        None
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "repair call failed");
                self.log.push(AttemptRecord::failure(
                    Stage::RepairAttempt,
                    Some(model),
                    Some(TransportKind::Conversational),
                    err.kind(),
                ));
                None
            }
        }
    }

    /// Rule-based backfill: canonicalize the extractor output, fill missing
    /// required fields from schema defaults, validate. Guarantees a minimal
    /// valid profile or a terminal `BackfillFailed`.
    fn backfill_stage(
        &mut self,
        text: &str,
    ) -> Result<(Profile, BTreeMap<String, FieldOrigin>), PipelineFailure> {
        let Some(extractor) = self.extractor else {
            let attempt_log = std::mem::take(&mut self.log);
            return Err(if self.expired() {
                PipelineFailure::DeadlineExceeded { attempt_log }
            } else {
                PipelineFailure::AllTransportsExhausted { attempt_log }
            });
        };

        let extraction = extractor.extract(text);
        let mut candidate = canonicalize(&extraction.raw);
        let defaulted = complete_with_defaults(&mut candidate);

        match validate(&candidate) {
            Ok(profile) => {
                self.log.push(AttemptRecord::success(
                    Stage::HeuristicBackfill,
                    None,
                    None,
                ));
                info!(
                    extracted = extraction.hits.len(),
                    defaulted = defaulted.len(),
                    "backfill produced a minimal profile"
                );

                let mut origins: BTreeMap<String, FieldOrigin> = candidate
                    .keys()
                    .map(|path| {
                        (
                            path.clone(),
                            FieldOrigin::Rule {
                                rule_id: None,
                                score: None,
                            },
                        )
                    })
                    .collect();
                for hit in &extraction.hits {
                    origins.insert(
                        hit.path.to_string(),
                        FieldOrigin::Rule {
                            rule_id: Some(hit.rule_id.to_string()),
                            score: Some(hit.score),
                        },
                    );
                }
                for path in defaulted {
                    origins.insert(path.to_string(), FieldOrigin::Default);
                }
                Ok((profile, origins))
            }
            Err(errors) => {
                warn!("backfill output failed validation: {errors}");
                self.log.push(AttemptRecord::failure(
                    Stage::HeuristicBackfill,
                    None,
                    None,
                    "validation_failure",
                ));
                let attempt_log = std::mem::take(&mut self.log);
                Err(PipelineFailure::BackfillFailed {
                    attempt_log,
                    errors,
                })
            }
        }
    }

    /// Normalization with recovery: if the pass invalidates the profile, one
    /// `NormalizeRepair` call is attempted (when a transport model produced
    /// the profile); otherwise the pre-normalization profile is kept. A
    /// valid profile is never downgraded to an invalid one.
    async fn normalize_stage(
        &mut self,
        profile: Profile,
        model: Option<&str>,
        origins: &mut BTreeMap<String, FieldOrigin>,
    ) -> Profile {
        let normalized = normalize::apply(profile.fields());
        self.reconcile_normalized(profile, normalized, model, origins)
            .await
    }

    /// Accepts, repairs, or rejects a normalized candidate against the
    /// pre-normalization profile. Split out from `normalize_stage` so the
    /// recovery path can be driven with candidates the shipped normalization
    /// rules would not produce.
    async fn reconcile_normalized(
        &mut self,
        profile: Profile,
        normalized: BTreeMap<String, Value>,
        model: Option<&str>,
        origins: &mut BTreeMap<String, FieldOrigin>,
    ) -> Profile {
        if normalized == *profile.fields() {
            self.log
                .push(AttemptRecord::success(Stage::Normalize, None, None));
            return profile;
        }

        match validate(&normalized) {
            Ok(clean) => {
                self.log
                    .push(AttemptRecord::success(Stage::Normalize, None, None));
                clean
            }
            Err(errors) => {
                warn!("normalization invalidated the profile: {errors}");
                self.log.push(AttemptRecord::failure(
                    Stage::Normalize,
                    None,
                    None,
                    "validation_failure",
                ));

                let (Some(model), true) = (model, self.repair_enabled) else {
                    return profile;
                };

                let flat = flat_to_value(&normalized);
                let recovered = with_deadline(
                    self.deadline,
                    repair::repair(self.transport, model, &flat, &errors),
                )
                .await;

                match recovered {
                    Ok(repaired_payload) => {
                        let candidate = canonicalize(&repaired_payload);
                        match validate(&candidate) {
                            Ok(clean) => {
                                // Paths the repair call introduced or rewrote
                                // carry model provenance from here on.
                                for (path, value) in clean.fields() {
                                    if profile.fields().get(path) != Some(value) {
                                        origins.insert(path.clone(), FieldOrigin::Model);
                                    }
                                }
                                self.log.push(AttemptRecord::success(
                                    Stage::NormalizeRepair,
                                    Some(model),
                                    Some(TransportKind::Conversational),
                                ));
                                clean
                            }
                            Err(_) => {
                                self.log.push(AttemptRecord::failure(
                                    Stage::NormalizeRepair,
                                    Some(model),
                                    Some(TransportKind::Conversational),
                                    "validation_failure",
                                ));
                                profile
                            }
                        }
                    }
                    Err(err) => {
                        self.log.push(AttemptRecord::failure(
                            Stage::NormalizeRepair,
                            Some(model),
                            Some(TransportKind::Conversational),
                            err.kind(),
                        ));
                        profile
                    }
                }
            }
        }
    }
}

fn model_origins(profile: &Profile) -> BTreeMap<String, FieldOrigin> {
    profile
        .paths()
        .map(|path| (path.to_string(), FieldOrigin::Model))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::models::profile::AttemptOutcome;

    /// Serves queued conversational replies; structured calls are rejected.
    struct CannedTransport {
        replies: Mutex<Vec<Result<String, TransportError>>>,
    }

    impl CannedTransport {
        fn new(replies: Vec<Result<String, TransportError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
            }
        }
    }

    #[async_trait]
    impl Transport for CannedTransport {
        async fn call_structured(
            &self,
            _model: &str,
            _prompt: &str,
            _schema: &Value,
        ) -> Result<Value, TransportError> {
            Err(TransportError::Transport("structured not scripted".to_string()))
        }

        async fn call_conversational(
            &self,
            _model: &str,
            _prompt: &str,
            _system: &str,
        ) -> Result<String, TransportError> {
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(TransportError::Transport("no reply queued".to_string())))
        }
    }

    fn run_for(transport: &dyn Transport) -> Run<'_> {
        Run {
            transport,
            extractor: None,
            ctx: PromptContext::new("Senior Rust engineer at Acme", &Options::default()),
            chain: vec!["model-a".to_string()],
            max_attempts: 4,
            attempts_used: 0,
            repair_enabled: true,
            force_conversational: false,
            deadline: None,
            log: Vec::new(),
        }
    }

    fn valid_fields() -> BTreeMap<String, Value> {
        let mut m = BTreeMap::new();
        m.insert("company.name".to_string(), json!("Acme"));
        m.insert("position.title".to_string(), json!("Engineer"));
        m.insert("position.seniority".to_string(), json!("senior"));
        m.insert("position.employment_type".to_string(), json!("full_time"));
        m.insert("requirements.skills".to_string(), json!(["Rust"]));
        m
    }

    fn rule_origins(profile: &Profile) -> BTreeMap<String, FieldOrigin> {
        profile
            .paths()
            .map(|p| {
                (
                    p.to_string(),
                    FieldOrigin::Rule {
                        rule_id: None,
                        score: None,
                    },
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_invalidating_normalization_triggers_one_recovery_repair() {
        let reply = json!({
            "company.name": "Acme",
            "position.title": "Engineer",
            "position.seniority": "senior",
            "position.employment_type": "full_time",
            "requirements.skills": ["Rust"],
            "location.country": "Germany"
        })
        .to_string();
        let transport = CannedTransport::new(vec![Ok(reply)]);
        let mut run = run_for(&transport);

        let profile = validate(&valid_fields()).unwrap();
        let mut origins = rule_origins(&profile);
        let mut broken = valid_fields();
        broken.remove("company.name");

        let out = run
            .reconcile_normalized(profile, broken, Some("model-a"), &mut origins)
            .await;

        assert_eq!(out.get("company.name"), Some(&json!("Acme")));
        assert_eq!(out.get("location.country"), Some(&json!("Germany")));
        let stages: Vec<_> = run.log.iter().map(|r| (r.stage, r.outcome)).collect();
        assert_eq!(
            stages,
            vec![
                (Stage::Normalize, AttemptOutcome::Failure),
                (Stage::NormalizeRepair, AttemptOutcome::Success),
            ]
        );
        // The path the repair introduced is model-sourced; paths whose value
        // is unchanged keep their prior origin.
        assert_eq!(origins.get("location.country"), Some(&FieldOrigin::Model));
        assert_eq!(
            origins.get("position.title"),
            Some(&FieldOrigin::Rule {
                rule_id: None,
                score: None
            })
        );
    }

    #[tokio::test]
    async fn test_failed_recovery_repair_keeps_pre_normalization_profile() {
        let transport =
            CannedTransport::new(vec![Err(TransportError::Transport("boom".to_string()))]);
        let mut run = run_for(&transport);

        let profile = validate(&valid_fields()).unwrap();
        let before = profile.fields().clone();
        let mut origins = rule_origins(&profile);
        let mut broken = valid_fields();
        broken.remove("company.name");

        let out = run
            .reconcile_normalized(profile, broken, Some("model-a"), &mut origins)
            .await;

        assert_eq!(*out.fields(), before);
        let record = run.log.last().unwrap();
        assert_eq!(record.stage, Stage::NormalizeRepair);
        assert_eq!(record.outcome, AttemptOutcome::Failure);
        assert_eq!(record.error_kind.as_deref(), Some("transport_error"));
        assert_eq!(origins, rule_origins(&out));
    }

    #[tokio::test]
    async fn test_invalid_recovery_repair_output_keeps_pre_normalization_profile() {
        // Repair replies with JSON that is still missing a required field.
        let reply = json!({"position.title": "Engineer"}).to_string();
        let transport = CannedTransport::new(vec![Ok(reply)]);
        let mut run = run_for(&transport);

        let profile = validate(&valid_fields()).unwrap();
        let before = profile.fields().clone();
        let mut origins = rule_origins(&profile);
        let mut broken = valid_fields();
        broken.remove("company.name");

        let out = run
            .reconcile_normalized(profile, broken, Some("model-a"), &mut origins)
            .await;

        assert_eq!(*out.fields(), before);
        let record = run.log.last().unwrap();
        assert_eq!(record.stage, Stage::NormalizeRepair);
        assert_eq!(record.error_kind.as_deref(), Some("validation_failure"));
    }

    #[tokio::test]
    async fn test_normalize_recovery_skipped_without_model() {
        let transport = CannedTransport::new(vec![]);
        let mut run = run_for(&transport);

        let profile = validate(&valid_fields()).unwrap();
        let before = profile.fields().clone();
        let mut origins = rule_origins(&profile);
        let mut broken = valid_fields();
        broken.remove("company.name");

        let out = run
            .reconcile_normalized(profile, broken, None, &mut origins)
            .await;

        assert_eq!(*out.fields(), before);
        assert_eq!(run.log.len(), 1);
        assert_eq!(run.log[0].stage, Stage::Normalize);
        assert_eq!(run.log[0].outcome, AttemptOutcome::Failure);
    }

    #[test]
    fn test_default_config_has_two_model_chain() {
        let config = PipelineConfig::default();
        assert_eq!(config.model_chain.len(), 2);
        assert_eq!(config.model_chain[0], "claude-sonnet-4-5");
        assert_eq!(config.max_total_attempts, 4);
        assert!(!config.force_conversational);
    }

    #[tokio::test]
    async fn test_with_deadline_passes_through_without_deadline() {
        let result = with_deadline(None, async { Ok::<_, TransportError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_deadline_abandons_slow_calls() {
        let deadline = Some(Instant::now() + std::time::Duration::from_millis(10));
        let result = with_deadline(deadline, async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok::<_, TransportError>(42)
        })
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), "transport_error");
    }
}
