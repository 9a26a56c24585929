//! Mock completion provider for tests
//!
//! Replays a script of replies in order, so translator, summarizer and
//! pipeline behaviour can be tested without a model:
//! - text replies, errors, and delayed replies (for timeout tests)
//! - every prompt received is recorded for assertions

use super::traits::{ChatMessage, CompletionProvider};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;

/// One scripted step of a [`MockCompletionProvider`].
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Error(String),
    Delayed(Duration, String),
}

/// Deterministic, scripted completion provider.
///
/// Replies are consumed front to back. Once the script is exhausted the
/// fallback reply is used if one was set, otherwise the call fails.
///
/// # Example
///
/// ```rust
/// use neo4j_chat::llm::{ChatMessage, CompletionProvider, MockCompletionProvider};
///
/// # tokio_test::block_on(async {
/// let provider = MockCompletionProvider::new()
///     .with_text("MATCH (p:Person) RETURN count(p) AS count");
/// let reply = provider.complete(&[ChatMessage::user("how many?")]).await.unwrap();
/// assert!(reply.starts_with("MATCH"));
/// assert_eq!(provider.call_count().await, 1);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MockCompletionProvider {
    script: Mutex<VecDeque<MockReply>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockCompletionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_reply(MockReply::Text(text.into()))
    }

    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.with_reply(MockReply::Error(message.into()))
    }

    pub fn with_delayed(self, delay: Duration, text: impl Into<String>) -> Self {
        self.with_reply(MockReply::Delayed(delay, text.into()))
    }

    /// Reply used for every call after the script runs out.
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    fn with_reply(mut self, reply: MockReply) -> Self {
        self.script.get_mut().push_back(reply);
        self
    }

    /// Number of `complete` calls received so far.
    pub async fn call_count(&self) -> usize {
        self.prompts.lock().await.len()
    }

    /// All prompts received, in call order.
    pub async fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl CompletionProvider for MockCompletionProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.prompts.lock().await.push(messages.to_vec());

        let next = self.script.lock().await.pop_front();
        match next {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Error(message)) => Err(anyhow::anyhow!(message)),
            Some(MockReply::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            None => match &self.fallback {
                Some(text) => Ok(text.clone()),
                None => anyhow::bail!("mock completion script exhausted"),
            },
        }
    }

    fn model_name(&self) -> &str {
        "mock-completion"
    }
}
