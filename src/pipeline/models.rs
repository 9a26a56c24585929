//! Pipeline stages and responses

use crate::cypher::QueryIntent;
use crate::error::ErrorKind;
use crate::neo4j::Record;
use serde::Serialize;
use uuid::Uuid;

/// Where a request is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    LoadingSchema,
    Translating,
    Validating,
    Executing,
    Summarizing,
    Done,
    Failed(ErrorKind),
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::LoadingSchema => f.write_str("loading_schema"),
            PipelineStage::Translating => f.write_str("translating"),
            PipelineStage::Validating => f.write_str("validating"),
            PipelineStage::Executing => f.write_str("executing"),
            PipelineStage::Summarizing => f.write_str("summarizing"),
            PipelineStage::Done => f.write_str("done"),
            PipelineStage::Failed(kind) => write!(f, "failed({kind})"),
        }
    }
}

/// Answer to one question.
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub request_id: Uuid,
    pub summary: String,
    pub cypher: String,
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
    pub truncated: bool,
    /// The summary is the templated fallback, not a model answer.
    pub degraded: bool,
    /// The schema used for translation came from a failed refresh.
    pub schema_stale: bool,
    /// Translator invocations spent on this question (1 or 2).
    pub attempts: u32,
}

/// Generated query without execution.
#[derive(Debug, Clone, Serialize)]
pub struct TranslateResponse {
    pub request_id: Uuid,
    pub cypher: String,
    pub intent: QueryIntent,
    pub schema_stale: bool,
    pub attempts: u32,
}
