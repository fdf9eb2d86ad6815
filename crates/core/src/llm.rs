use crate::error::LlmError;
use crate::traits::LanguageModel;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

pub const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-3-sonnet-20240229";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct ClaudeProvider {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl ClaudeProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Zero falls back to the default budget.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = if max_tokens == 0 {
            DEFAULT_MAX_TOKENS
        } else {
            max_tokens
        };
        self
    }
}

pub fn parse_completion(response: &Value) -> Result<String, LlmError> {
    response
        .pointer("/content/0/text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| LlmError::Parse("missing content[0].text".to_string()))
}

#[async_trait]
impl LanguageModel for ClaudeProvider {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, LlmError> {
        if self.api_key.trim().is_empty() {
            return Err(LlmError::NotConfigured("ANTHROPIC_API_KEY is empty".to_string()));
        }

        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": temperature,
            "max_tokens": self.max_tokens,
        });

        debug!(model = %self.model, max_tokens = self.max_tokens, "claude request");

        let response = self
            .client
            .post(ANTHROPIC_MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: Value = response.json().await?;
        parse_completion(&parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_text_comes_from_first_content_block() {
        let response = json!({
            "id": "msg_1",
            "content": [{ "type": "text", "text": "The sky is blue." }],
            "stop_reason": "end_turn"
        });
        assert_eq!(
            parse_completion(&response).ok().as_deref(),
            Some("The sky is blue.")
        );
    }

    #[test]
    fn missing_content_is_a_parse_error() {
        let response = json!({ "content": [] });
        assert!(matches!(parse_completion(&response), Err(LlmError::Parse(_))));
    }

    #[tokio::test]
    async fn empty_api_key_is_not_configured() {
        let provider = ClaudeProvider::new("", DEFAULT_CLAUDE_MODEL);
        let result = provider.complete("hi", 0.0).await;
        assert!(matches!(result, Err(LlmError::NotConfigured(_))));
    }

    #[test]
    fn max_tokens_override_keeps_a_positive_budget() {
        let provider = ClaudeProvider::new("key", DEFAULT_CLAUDE_MODEL).with_max_tokens(256);
        assert_eq!(provider.max_tokens, 256);

        let provider = ClaudeProvider::new("key", DEFAULT_CLAUDE_MODEL).with_max_tokens(0);
        assert_eq!(provider.max_tokens, DEFAULT_MAX_TOKENS);
    }
}
