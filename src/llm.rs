//! Chat-completion provider abstraction.
//!
//! - **[`DisabledProvider`]**: returns errors; used when no LLM is configured.
//! - **[`OpenAiProvider`]**: calls an OpenAI-compatible `chat/completions`
//!   endpoint with timeout, bounded retry, and backoff.
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry
//! - other HTTP 4xx → fail immediately
//! - network errors → retry
//! - backoff: 1s, 2s, 4s, 8s, ... (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::models::Message;

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    /// Send a conversation and return the assistant's reply text.
    async fn complete(&self, messages: &[Message]) -> Result<String>;
}

pub struct DisabledProvider;

#[async_trait]
impl ChatProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _messages: &[Message]) -> Result<String> {
        bail!("LLM provider is disabled; set [llm] provider in the config")
    }
}

/// Provider for the OpenAI chat completions API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiProvider {
    model: String,
    base_url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, "retrying chat completion");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_chat_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(%status, "chat completion failed, will retry");
                        last_err = Some(anyhow::anyhow!(
                            "chat API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    bail!("chat API error {}: {}", status, body_text);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "chat completion request failed");
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("chat completion failed after retries")))
    }
}

/// Extract `choices[0].message.content` from a chat completions response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices[0].message.content"))
}

pub fn create_provider(config: &LlmConfig) -> Result<Box<dyn ChatProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAiProvider::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_choice() {
        let json = serde_json::json!({
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": "ふむ、面白い。" } }
            ]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "ふむ、面白い。");
    }

    #[test]
    fn rejects_response_without_choices() {
        let json = serde_json::json!({ "error": { "message": "bad" } });
        assert!(parse_chat_response(&json).is_err());
    }

    #[tokio::test]
    async fn disabled_provider_errors() {
        let provider = create_provider(&LlmConfig::default()).unwrap();
        assert_eq!(provider.model_name(), "disabled");
        assert!(provider.complete(&[Message::user("hi")]).await.is_err());
    }

    #[test]
    fn messages_serialize_with_lowercase_roles() {
        let value = serde_json::to_value([Message::system("s"), Message::user("u")]).unwrap();
        assert_eq!(value[0]["role"], "system");
        assert_eq!(value[1]["role"], "user");
    }
}
