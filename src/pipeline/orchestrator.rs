//! Pipeline state machine

use super::models::{AskResponse, PipelineStage, TranslateResponse};
use crate::error::PipelineError;
use crate::executor::{ExecutionLimits, QueryExecutor};
use crate::llm::CompletionProvider;
use crate::neo4j::{GraphDriver, QueryParams};
use crate::schema::{SchemaIntrospector, SchemaSnapshot};
use crate::summarize::Summarizer;
use crate::translate::{CandidateQuery, QueryTranslator, TranslationRequest};
use crate::validate::{validate, ValidationPolicy};
use crate::PipelineConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

/// Translator calls allowed per question: the first attempt plus one
/// corrective retry after a validation rejection.
pub const MAX_TRANSLATION_ATTEMPTS: u32 = 2;

/// Next unit of work in the translate/validate loop.
enum Step {
    Translate(TranslationRequest),
    Validate(TranslationRequest, CandidateQuery),
}

impl Step {
    fn stage(&self) -> PipelineStage {
        match self {
            Step::Translate(_) => PipelineStage::Translating,
            Step::Validate(..) => PipelineStage::Validating,
        }
    }
}

pub struct Pipeline {
    introspector: Arc<SchemaIntrospector>,
    translator: QueryTranslator,
    policy: ValidationPolicy,
    executor: QueryExecutor,
    limits: ExecutionLimits,
    summarizer: Summarizer,
}

impl Pipeline {
    pub fn new(
        driver: Arc<dyn GraphDriver>,
        llm: Arc<dyn CompletionProvider>,
        config: &PipelineConfig,
        llm_timeout: Duration,
    ) -> Self {
        Self {
            introspector: Arc::new(SchemaIntrospector::new(
                driver.clone(),
                config.schema_cache_ttl(),
                config.query_timeout(),
            )),
            translator: QueryTranslator::new(llm.clone(), llm_timeout, config.allow_writes),
            policy: ValidationPolicy {
                allow_writes: config.allow_writes,
            },
            executor: QueryExecutor::new(driver),
            limits: ExecutionLimits::from_config(config),
            summarizer: Summarizer::new(llm, llm_timeout, config.preview_rows, config.preview_chars),
        }
    }

    pub fn introspector(&self) -> &SchemaIntrospector {
        &self.introspector
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Answer a natural-language question.
    pub async fn ask(&self, question: &str) -> Result<AskResponse, PipelineError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("ask", %request_id);
        let mut attempts = 0;
        let outcome: Result<AskResponse, PipelineError> = async {
            let question = non_empty(question)?;
            let snapshot = self.load_schema().await?;
            let candidate = self
                .translate_validated(question, &snapshot, &mut attempts)
                .await?;

            debug!(stage = %PipelineStage::Executing, "Stage");
            let result = self
                .executor
                .execute(&candidate.cypher, &QueryParams::new(), &self.limits)
                .await?;

            debug!(stage = %PipelineStage::Summarizing, "Stage");
            let summary = match self.summarizer.summarize(question, &result).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(error = %e, "Summarization failed, using templated summary");
                    Summarizer::fallback(&result)
                }
            };

            Ok(AskResponse {
                request_id,
                summary: summary.text,
                cypher: candidate.cypher,
                columns: summary.result.columns,
                rows: summary.result.rows,
                truncated: summary.result.truncated,
                degraded: summary.degraded,
                schema_stale: snapshot.stale,
                attempts,
            })
        }
        .instrument(span.clone())
        .await;

        span.in_scope(|| finish(&outcome, attempts));
        outcome
    }

    /// Produce the validated Cypher for a question without executing it.
    pub async fn translate_only(&self, question: &str) -> Result<TranslateResponse, PipelineError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("translate", %request_id);
        let mut attempts = 0;
        let outcome: Result<TranslateResponse, PipelineError> = async {
            let question = non_empty(question)?;
            let snapshot = self.load_schema().await?;
            let candidate = self
                .translate_validated(question, &snapshot, &mut attempts)
                .await?;
            Ok(TranslateResponse {
                request_id,
                cypher: candidate.cypher,
                intent: candidate.intent,
                schema_stale: snapshot.stale,
                attempts,
            })
        }
        .instrument(span.clone())
        .await;

        span.in_scope(|| finish(&outcome, attempts));
        outcome
    }

    async fn load_schema(&self) -> Result<SchemaSnapshot, PipelineError> {
        debug!(stage = %PipelineStage::LoadingSchema, "Stage");
        let snapshot = self.introspector.get_schema(false).await?;
        if snapshot.stale {
            warn!("Translating against a stale schema snapshot");
        }
        Ok(snapshot)
    }

    /// Translate and validate, re-translating once with the rejection
    /// reason when the first candidate is refused.
    async fn translate_validated(
        &self,
        question: &str,
        snapshot: &SchemaSnapshot,
        attempts: &mut u32,
    ) -> Result<CandidateQuery, PipelineError> {
        let mut step = Step::Translate(TranslationRequest::new(question, snapshot.schema.clone()));
        loop {
            debug!(stage = %step.stage(), attempt = *attempts, "Stage");
            step = match step {
                Step::Translate(request) => {
                    *attempts += 1;
                    let candidate = self.translator.translate(&request).await?;
                    Step::Validate(request, candidate)
                }
                Step::Validate(request, candidate) => {
                    let verdict = validate(&candidate, &self.policy);
                    if verdict.accepted {
                        return Ok(candidate);
                    }
                    let reason = verdict
                        .reason
                        .unwrap_or_else(|| "rejected without reason".to_string());
                    if *attempts >= MAX_TRANSLATION_ATTEMPTS {
                        return Err(PipelineError::ValidationRejected(reason));
                    }
                    debug!(reason = %reason, cypher = %candidate.cypher, "Candidate rejected, retrying translation");
                    Step::Translate(request.with_prior_error(reason, candidate.cypher))
                }
            };
        }
    }
}

fn non_empty(question: &str) -> Result<&str, PipelineError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(PipelineError::TranslationFailed("question is empty".to_string()));
    }
    Ok(question)
}

fn finish<T>(outcome: &Result<T, PipelineError>, attempts: u32) {
    match outcome {
        Ok(_) => debug!(stage = %PipelineStage::Done, attempts, "Request finished"),
        Err(e) => warn!(
            stage = %PipelineStage::Failed(e.kind()),
            attempts,
            error = %e,
            "Request failed"
        ),
    }
}
