//! Chat-completion capability.
//!
//! The [`ChatModel`] trait is the only thing the insight extractor and the
//! conversation engine know about language models. Two HTTP providers are
//! included: [`OpenAIChat`] (`POST /v1/chat/completions`) and
//! [`OllamaChat`] (`POST /api/chat`, non-streaming).

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::http;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o"`).
    fn model_name(&self) -> &str;

    /// Non-streaming chat completion; returns the assistant message text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Single-prompt convenience wrapper around [`ChatModel::complete`].
pub async fn complete_prompt(model: &dyn ChatModel, prompt: &str) -> Result<String> {
    model.complete(&[ChatMessage::user(prompt)]).await
}

// ============ OpenAI ============

pub struct OpenAIChat {
    config: LlmConfig,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIChat {
    /// # Errors
    ///
    /// Returns an error if `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            config: config.clone(),
            api_key,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "messages": messages,
        });
        let json = http::post_json_with_retry(
            &self.client,
            "https://api.openai.com/v1/chat/completions",
            Some(&self.api_key),
            &body,
            self.config.max_retries,
            "OpenAI",
        )
        .await?;
        parse_openai_completion(&json)
    }
}

fn parse_openai_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

// ============ Ollama ============

pub struct OllamaChat {
    config: LlmConfig,
    url: String,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        Ok(Self {
            config: config.clone(),
            url,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "stream": false,
            "options": { "temperature": self.config.temperature },
        });
        let json = http::post_json_with_retry(
            &self.client,
            &format!("{}/api/chat", self.url),
            None,
            &body,
            self.config.max_retries,
            "Ollama",
        )
        .await?;
        json.get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing message.content"))
    }
}

/// Create the [`ChatModel`] named by `config.provider`.
pub fn create_chat_model(config: &LlmConfig) -> Result<Box<dyn ChatModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAIChat::new(config)?)),
        "ollama" => Ok(Box::new(OllamaChat::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_openai_completion() {
        let json = json!({
            "choices": [{"message": {"role": "assistant", "content": "- one\n- two"}}]
        });
        assert_eq!(parse_openai_completion(&json).unwrap(), "- one\n- two");
    }

    #[test]
    fn rejects_empty_choices() {
        assert!(parse_openai_completion(&json!({"choices": []})).is_err());
    }

    #[test]
    fn messages_serialize_with_roles() {
        let v = serde_json::to_value(ChatMessage::system("frame")).unwrap();
        assert_eq!(v, json!({"role": "system", "content": "frame"}));
    }
}
