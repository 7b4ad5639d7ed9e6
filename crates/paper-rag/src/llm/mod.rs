//! LLM Module - chat completion against hosted language models
//! The pipeline only ever sees the `LLMProvider` trait; `ExternalProvider`
//! is the HTTP implementation.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod external;

pub use external::{ExternalProvider, ProviderError};

use crate::types::{Message, Role};

/// External API providers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ApiProvider {
    Google,
    OpenAI,
    Anthropic,
    Ollama,
    Custom { endpoint: String },
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    pub provider: ApiProvider,
    pub model: String,
    /// Read from the environment; never written back to config files.
    #[serde(default, skip_serializing)]
    pub api_key: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    /// Attempts after the first one when the provider rate-limits us.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: ApiProvider::Google,
            model: "gemini-2.0-flash".to_string(),
            api_key: String::new(),
            max_tokens: 4096,
            temperature: 0.3,
            top_p: 0.95,
            max_retries: 10,
            retry_backoff_ms: 2000,
            request_timeout_secs: 120,
            connect_timeout_secs: 15,
        }
    }
}

impl LLMConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Upper bound on one chat call including every rate-limit retry.
    pub fn call_deadline(&self) -> Duration {
        let attempts = self.max_retries + 1;
        Duration::from_secs(self.request_timeout_secs) * attempts + self.retry_backoff() * self.max_retries
    }
}

/// Generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    /// Ask the provider for a JSON object instead of free text.
    pub json_output: bool,
}

impl GenerationConfig {
    pub fn json(mut self) -> Self {
        self.json_output = true;
        self
    }
}

impl From<&LLMConfig> for GenerationConfig {
    fn from(config: &LLMConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            json_output: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A chat message with role and content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        match message.role {
            Role::User => Self::user(message.content.clone()),
            Role::Assistant => Self::assistant(message.content.clone()),
        }
    }
}

/// Provider information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub model: String,
    pub supports_json_output: bool,
}

/// Core trait for LLM providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Chat completion over an ordered message list.
    async fn chat(&self, messages: &[ChatMessage], config: &GenerationConfig) -> Result<String>;

    /// Get provider info
    fn info(&self) -> ProviderInfo;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_not_serialized() {
        let config = LLMConfig {
            api_key: "secret".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));

        let back: LLMConfig = serde_json::from_str(&json).unwrap();
        assert!(back.api_key.is_empty());
        assert_eq!(back.provider, ApiProvider::Google);
    }

    #[test]
    fn test_conversation_message_conversion() {
        let user = Message::user("what is the dataset size?");
        let assistant = Message::assistant("12k pairs");
        assert_eq!(ChatMessage::from(&user), ChatMessage::user("what is the dataset size?"));
        assert_eq!(ChatMessage::from(&assistant).role, ChatRole::Assistant);
    }
}
