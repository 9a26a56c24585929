//! Language-model completion module
//!
//! The translator and summarizer both talk to a language model through
//! the same narrow interface. Architecture follows the project pattern
//! (trait + impl + mock):
//! - `CompletionProvider` trait: async chat-completion interface
//! - `HttpCompletionProvider`: any OpenAI-compatible `/v1/chat/completions` API
//!   (Ollama, OpenAI, LiteLLM, vLLM, etc.)
//! - `MockCompletionProvider`: scripted replies for deterministic tests

pub mod mock;
pub mod provider;
pub mod traits;

pub use mock::MockCompletionProvider;
pub use provider::HttpCompletionProvider;
pub use traits::{ChatMessage, ChatRole, CompletionProvider};
