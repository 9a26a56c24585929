//! HTTP completion provider implementation
//!
//! Implements `CompletionProvider` using any OpenAI-compatible
//! `/v1/chat/completions` endpoint.
//!
//! Supported providers:
//! - **Ollama** (default): `http://localhost:11434/v1/chat/completions`
//! - **OpenAI**: `https://api.openai.com/v1/chat/completions`
//! - **LiteLLM / vLLM / any OpenAI-compatible**: just set the URL

use super::traits::{ChatMessage, CompletionProvider};
use crate::LlmConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// HTTP-based completion provider using the OpenAI chat completions format.
///
/// Cheaply cloneable (shares the reqwest client internally). The request
/// timeout configured here is a transport safety net; the pipeline imposes
/// its own per-call deadline on top.
#[derive(Clone)]
pub struct HttpCompletionProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible error response
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl HttpCompletionProvider {
    /// Create a provider with explicit configuration.
    ///
    /// * `url` - the chat completions endpoint
    /// * `model` - model name sent with every request
    /// * `api_key` - optional bearer token (OpenAI, hosted gateways)
    /// * `timeout` - transport-level request timeout
    pub fn new(
        url: String,
        model: String,
        api_key: Option<String>,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url,
            model,
            api_key,
            temperature: 0.0,
        })
    }

    /// Create a provider from the `llm` configuration section.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::new(
            config.url.clone(),
            config.model.clone(),
            config.api_key.clone(),
            // Transport timeout sits just above the pipeline deadline so the
            // caller's timeout is the one that fires.
            config.timeout() + std::time::Duration::from_secs(5),
        )
    }

    /// Override the sampling temperature (default 0.0 for reproducible Cypher).
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl CompletionProvider for HttpCompletionProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            stream: false,
        };

        let mut req = self.client.post(&self.url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .with_context(|| format!("Failed to connect to completion API at {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<ErrorResponse>(&body) {
                if let Some(detail) = err.error {
                    anyhow::bail!(
                        "Completion API error ({}): {}",
                        status.as_u16(),
                        detail.message
                    );
                }
            }
            anyhow::bail!("Completion API returned {}: {}", status.as_u16(), body);
        }

        let resp: CompletionResponse = response
            .json()
            .await
            .context("Failed to parse completion API response")?;

        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("Completion API returned no choices")?;

        tracing::trace!(model = %self.model, chars = content.len(), "completion received");
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
