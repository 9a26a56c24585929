//! Pipeline error taxonomy
//!
//! Every stage of the question pipeline fails with a [`PipelineError`].
//! The variant determines the [`ErrorKind`] surfaced to callers, and the
//! executor uses [`PipelineError::is_retryable`] to decide which failures
//! are retried with backoff.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable, serializable classification of a pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SchemaUnavailable,
    TranslationFailed,
    ValidationRejected,
    ExecutionTimeout,
    ExecutionRejected,
    ConnectionUnavailable,
    SummarizationFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SchemaUnavailable => "schema_unavailable",
            ErrorKind::TranslationFailed => "translation_failed",
            ErrorKind::ValidationRejected => "validation_rejected",
            ErrorKind::ExecutionTimeout => "execution_timeout",
            ErrorKind::ExecutionRejected => "execution_rejected",
            ErrorKind::ConnectionUnavailable => "connection_unavailable",
            ErrorKind::SummarizationFailed => "summarization_failed",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a pipeline stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("graph schema unavailable: {0}")]
    SchemaUnavailable(String),

    #[error("could not translate question into Cypher: {0}")]
    TranslationFailed(String),

    #[error("generated query rejected: {0}")]
    ValidationRejected(String),

    #[error("query exceeded the {timeout_ms} ms statement timeout")]
    ExecutionTimeout { timeout_ms: u64 },

    #[error("database rejected the query: {0}")]
    ExecutionRejected(String),

    #[error("database connection unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("could not summarize the result: {0}")]
    SummarizationFailed(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::SchemaUnavailable(_) => ErrorKind::SchemaUnavailable,
            PipelineError::TranslationFailed(_) => ErrorKind::TranslationFailed,
            PipelineError::ValidationRejected(_) => ErrorKind::ValidationRejected,
            PipelineError::ExecutionTimeout { .. } => ErrorKind::ExecutionTimeout,
            PipelineError::ExecutionRejected(_) => ErrorKind::ExecutionRejected,
            PipelineError::ConnectionUnavailable(_) => ErrorKind::ConnectionUnavailable,
            PipelineError::SummarizationFailed(_) => ErrorKind::SummarizationFailed,
        }
    }

    /// Only connection failures are retried, and only inside the executor.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::ConnectionUnavailable(_))
    }

    /// Structured `{kind, message}` form returned to callers.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Structured failure returned by the inbound `ask` surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            PipelineError::SchemaUnavailable("x".into()).kind(),
            ErrorKind::SchemaUnavailable
        );
        assert_eq!(
            PipelineError::ExecutionTimeout { timeout_ms: 10 }.kind(),
            ErrorKind::ExecutionTimeout
        );
        assert_eq!(
            PipelineError::ConnectionUnavailable("pool".into()).kind(),
            ErrorKind::ConnectionUnavailable
        );
    }

    #[test]
    fn test_only_connection_errors_are_retryable() {
        assert!(PipelineError::ConnectionUnavailable("down".into()).is_retryable());
        assert!(!PipelineError::ExecutionRejected("syntax".into()).is_retryable());
        assert!(!PipelineError::ExecutionTimeout { timeout_ms: 1 }.is_retryable());
        assert!(!PipelineError::ValidationRejected("policy".into()).is_retryable());
    }

    #[test]
    fn test_error_response_serializes_snake_case_kind() {
        let resp = PipelineError::ValidationRejected("policy: writes".into()).to_response();
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["kind"], "validation_rejected");
        assert!(json["message"].as_str().unwrap().contains("policy: writes"));
    }

    #[test]
    fn test_kind_display_matches_serde() {
        for kind in [
            ErrorKind::SchemaUnavailable,
            ErrorKind::TranslationFailed,
            ErrorKind::ValidationRejected,
            ErrorKind::ExecutionTimeout,
            ErrorKind::ExecutionRejected,
            ErrorKind::ConnectionUnavailable,
            ErrorKind::SummarizationFailed,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }
}
