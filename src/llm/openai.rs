//! OpenAI-compatible chat-completions client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use super::{ChatMessage, ChatModel, ModelError, ToolDefinition};
use crate::config::ModelConfig;

/// Attempts per request, including the first.
const MAX_ATTEMPTS: u32 = 3;

pub(crate) struct OpenAiChatModel {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "<[ToolDefinition]>::is_empty")]
    tools: &'a [ToolDefinition],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

impl OpenAiChatModel {
    /// Builds a client, reading the API key from `config.api_key_env`.
    pub fn from_config(config: &ModelConfig) -> Result<Self, ModelError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ModelError::MissingApiKey(config.api_key_env.clone()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<ChatMessage, ModelError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Malformed(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| ModelError::Malformed("response had no choices".to_string()))
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    /// Retries transient failures with delays of 2s and 4s.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatMessage, ModelError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            tools,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let request = &request;
        with_retries(move || self.send(request)).await
    }
}

/// Calls `send` until it succeeds, fails permanently, or `MAX_ATTEMPTS` is
/// reached. Transient failures wait `2^attempt` seconds before the next call.
async fn with_retries<F, Fut>(mut send: F) -> Result<ChatMessage, ModelError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ChatMessage, ModelError>>,
{
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            let delay_secs = 1u64 << attempt;
            debug!(
                "Chat completion retry attempt {} after {}s delay",
                attempt + 1,
                delay_secs
            );
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
        }

        match send().await {
            Ok(message) => return Ok(message),
            Err(e) if e.is_transient() && attempt + 1 < MAX_ATTEMPTS => {
                debug!("Chat completion failed: {}", e);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
