//! QueryTranslator: one completion call per candidate query

use crate::cypher::{classify_intent, leading_keyword, tokenize, QueryIntent, LEADING_KEYWORDS};
use crate::error::PipelineError;
use crate::llm::CompletionProvider;
use crate::schema::SchemaDescription;
use crate::translate::extract::extract_cypher;
use crate::translate::prompt::translation_messages;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Input to one translation attempt.
#[derive(Debug, Clone)]
pub struct TranslationRequest {
    pub question: String,
    pub schema: Arc<SchemaDescription>,
    /// Reason the previous candidate was rejected, on the retry attempt.
    pub prior_error: Option<String>,
    pub rejected_cypher: Option<String>,
}

impl TranslationRequest {
    pub fn new(question: impl Into<String>, schema: Arc<SchemaDescription>) -> Self {
        Self {
            question: question.into(),
            schema,
            prior_error: None,
            rejected_cypher: None,
        }
    }

    pub fn with_prior_error(mut self, reason: impl Into<String>, cypher: impl Into<String>) -> Self {
        self.prior_error = Some(reason.into());
        self.rejected_cypher = Some(cypher.into());
        self
    }
}

/// A Cypher statement proposed by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateQuery {
    pub cypher: String,
    pub intent: QueryIntent,
}

impl CandidateQuery {
    /// Wrap a statement, deriving its intent from the text.
    pub fn new(cypher: impl Into<String>) -> Self {
        let cypher = cypher.into();
        let intent = classify_intent(&cypher);
        Self { cypher, intent }
    }
}

pub struct QueryTranslator {
    llm: Arc<dyn CompletionProvider>,
    timeout: Duration,
    allow_writes: bool,
}

impl QueryTranslator {
    pub fn new(llm: Arc<dyn CompletionProvider>, timeout: Duration, allow_writes: bool) -> Self {
        Self {
            llm,
            timeout,
            allow_writes,
        }
    }

    /// Ask the model for a Cypher statement answering the question.
    ///
    /// Fails with `TranslationFailed` on timeout, provider error, or a reply
    /// that does not contain a statement starting with a clause keyword.
    pub async fn translate(
        &self,
        request: &TranslationRequest,
    ) -> Result<CandidateQuery, PipelineError> {
        let messages = translation_messages(request, self.allow_writes);

        let reply = tokio::time::timeout(self.timeout, self.llm.complete(&messages))
            .await
            .map_err(|_| {
                PipelineError::TranslationFailed(format!(
                    "model did not answer within {} ms",
                    self.timeout.as_millis()
                ))
            })?
            .map_err(|e| PipelineError::TranslationFailed(format!("model call failed: {e:#}")))?;

        let cypher = extract_cypher(&reply).ok_or_else(|| {
            PipelineError::TranslationFailed("model returned an empty reply".to_string())
        })?;

        let starts_with_clause = tokenize(&cypher)
            .ok()
            .and_then(|tokens| leading_keyword(&tokens))
            .map(|kw| LEADING_KEYWORDS.contains(&kw.as_str()))
            // unterminated literals are left for the validator to report
            .unwrap_or_else(|| looks_like_clause(&cypher));
        if !starts_with_clause {
            return Err(PipelineError::TranslationFailed(format!(
                "reply is not a Cypher statement: {}",
                truncate(&cypher, 120)
            )));
        }

        let candidate = CandidateQuery::new(cypher);
        debug!(
            model = self.llm.model_name(),
            intent = %candidate.intent,
            cypher = %candidate.cypher,
            retry = request.prior_error.is_some(),
            "Translated question"
        );
        Ok(candidate)
    }
}

fn looks_like_clause(text: &str) -> bool {
    text.split_whitespace()
        .next()
        .map(|w| LEADING_KEYWORDS.contains(&w.to_ascii_uppercase().as_str()))
        .unwrap_or(false)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatRole, MockCompletionProvider};
    use std::collections::BTreeMap;

    fn schema() -> Arc<SchemaDescription> {
        Arc::new(SchemaDescription::build(BTreeMap::new(), BTreeMap::new(), vec![]))
    }

    fn translator(llm: MockCompletionProvider) -> (Arc<MockCompletionProvider>, QueryTranslator) {
        let llm = Arc::new(llm);
        let t = QueryTranslator::new(llm.clone(), Duration::from_millis(200), false);
        (llm, t)
    }

    #[tokio::test]
    async fn test_translate_read_query() {
        let (llm, t) = translator(
            MockCompletionProvider::new().with_text("```cypher\nMATCH (n:Person) RETURN count(n) AS count;\n```"),
        );
        let candidate = t
            .translate(&TranslationRequest::new("How many Person nodes are there?", schema()))
            .await
            .unwrap();
        assert_eq!(candidate.cypher, "MATCH (n:Person) RETURN count(n) AS count");
        assert_eq!(candidate.intent, QueryIntent::Read);

        let prompts = llm.prompts().await;
        assert_eq!(prompts[0][0].role, ChatRole::System);
        assert!(prompts[0][1].content.contains("How many Person nodes"));
    }

    #[tokio::test]
    async fn test_translate_labels_write_intent() {
        let (_, t) = translator(MockCompletionProvider::new().with_text("MATCH (n) DETACH DELETE n"));
        let candidate = t
            .translate(&TranslationRequest::new("Delete all nodes", schema()))
            .await
            .unwrap();
        assert_eq!(candidate.intent, QueryIntent::Write);
    }

    #[tokio::test]
    async fn test_translate_timeout() {
        let (_, t) = translator(
            MockCompletionProvider::new().with_delayed(Duration::from_secs(5), "RETURN 1"),
        );
        let err = t
            .translate(&TranslationRequest::new("q", schema()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::TranslationFailed(ref m) if m.contains("within")));
    }

    #[tokio::test]
    async fn test_translate_provider_error_and_empty_reply() {
        let (_, t) = translator(MockCompletionProvider::new().with_error("503 upstream").with_text("  "));
        let req = TranslationRequest::new("q", schema());
        let err = t.translate(&req).await.unwrap_err();
        assert!(matches!(err, PipelineError::TranslationFailed(ref m) if m.contains("503")));
        let err = t.translate(&req).await.unwrap_err();
        assert!(matches!(err, PipelineError::TranslationFailed(ref m) if m.contains("empty")));
    }

    #[tokio::test]
    async fn test_translate_rejects_prose() {
        let (_, t) = translator(MockCompletionProvider::new().with_text("Sorry, I cannot help with that."));
        let err = t
            .translate(&TranslationRequest::new("q", schema()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::TranslationFailed(ref m) if m.contains("not a Cypher")));
    }

    #[tokio::test]
    async fn test_unterminated_literal_is_still_a_candidate() {
        let (_, t) = translator(MockCompletionProvider::new().with_text("MATCH (n) WHERE n.name = 'x RETURN n"));
        let candidate = t
            .translate(&TranslationRequest::new("q", schema()))
            .await
            .unwrap();
        assert_eq!(candidate.intent, QueryIntent::Write, "unlexable text is classified WRITE");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
    }
}
