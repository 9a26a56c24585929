//! CompletionProvider trait definition
//!
//! Same shape as the other collaborator traits in this crate:
//! async trait + Send + Sync for `Arc<dyn CompletionProvider>` usage.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message of a completion prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Abstract interface for a text-completion language model.
///
/// No structured-output guarantee is assumed: callers receive the raw
/// assistant text and are responsible for extracting what they need.
/// Timeouts are imposed by the caller, not by implementations.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Send the messages and return the assistant reply text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// The model identifier, for logging.
    fn model_name(&self) -> &str;
}
