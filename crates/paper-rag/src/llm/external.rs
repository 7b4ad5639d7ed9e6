//! External API providers for LLM
//! Supports Google Gemini, OpenAI-compatible endpoints, and Anthropic

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use super::{ApiProvider, ChatMessage, ChatRole, GenerationConfig, LLMConfig, LLMProvider, ProviderInfo};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited (HTTP {status}): {body}")]
    RateLimited { status: u16, body: String },

    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// External API provider
pub struct ExternalProvider {
    provider: ApiProvider,
    api_key: String,
    model: String,
    max_retries: u32,
    retry_backoff: Duration,
    client: Client,
}

impl ExternalProvider {
    /// Create new external provider
    pub fn new(config: &LLMConfig) -> Result<Self> {
        let keyless = matches!(config.provider, ApiProvider::Ollama | ApiProvider::Custom { .. });
        if config.api_key.is_empty() && !keyless {
            return Err(anyhow!("No API key configured for {:?}", config.provider));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()?;

        Ok(Self {
            provider: config.provider.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
            client,
        })
    }

    fn get_endpoint(&self) -> String {
        match &self.provider {
            ApiProvider::Google => format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                self.model
            ),
            ApiProvider::OpenAI => "https://api.openai.com/v1/chat/completions".to_string(),
            ApiProvider::Anthropic => "https://api.anthropic.com/v1/messages".to_string(),
            ApiProvider::Ollama => "http://localhost:11434/v1/chat/completions".to_string(),
            ApiProvider::Custom { endpoint } => endpoint.clone(),
        }
    }

    async fn chat_once(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
    ) -> Result<String, ProviderError> {
        match &self.provider {
            ApiProvider::Google => self.google_chat(messages, config).await,
            ApiProvider::Anthropic => self.anthropic_chat(messages, config).await,
            ApiProvider::OpenAI | ApiProvider::Ollama | ApiProvider::Custom { .. } => {
                self.openai_compatible_chat(messages, config).await
            }
        }
    }

    async fn google_chat(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
    ) -> Result<String, ProviderError> {
        let endpoint = self.get_endpoint();
        let response = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&google_request(messages, config))
            .send()
            .await?;

        let result: GoogleResponse = parse_json_response(check_status(response).await?, &endpoint).await?;
        result
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| ProviderError::Decode("no candidates from Google Gemini".to_string()))
    }

    async fn openai_compatible_chat(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
    ) -> Result<String, ProviderError> {
        let endpoint = self.get_endpoint();
        let mut request = self
            .client
            .post(&endpoint)
            .json(&openai_request(&self.model, messages, config));
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }
        let response = request.send().await?;

        let result: OpenAIResponse = parse_json_response(check_status(response).await?, &endpoint).await?;
        result
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| ProviderError::Decode("OpenAI returned empty choices array".to_string()))
    }

    async fn anthropic_chat(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
    ) -> Result<String, ProviderError> {
        let endpoint = self.get_endpoint();
        let response = self
            .client
            .post(&endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&anthropic_request(&self.model, messages, config))
            .send()
            .await?;

        let result: AnthropicResponse = parse_json_response(check_status(response).await?, &endpoint).await?;
        result
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| ProviderError::Decode("Anthropic returned empty content array".to_string()))
    }
}

#[async_trait]
impl LLMProvider for ExternalProvider {
    async fn chat(&self, messages: &[ChatMessage], config: &GenerationConfig) -> Result<String> {
        let text = retry_rate_limited(self.max_retries, self.retry_backoff, || {
            self.chat_once(messages, config)
        })
        .await?;
        Ok(text)
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: format!("{:?}", self.provider),
            model: self.model.clone(),
            supports_json_output: !matches!(self.provider, ApiProvider::Anthropic),
        }
    }
}

/// Re-run `op` while it reports rate limiting, sleeping a fixed `backoff`
/// between attempts. Any other error is returned immediately.
pub(crate) async fn retry_rate_limited<T, F, Fut>(
    max_retries: u32,
    backoff: Duration,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(e) if e.is_rate_limited() && attempt < max_retries => {
                attempt += 1;
                tracing::warn!(attempt = attempt, max_retries = max_retries, error = %e, "LLM rate limited, backing off");
                tokio::time::sleep(backoff).await;
            }
            other => return other,
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::TOO_MANY_REQUESTS || body.contains("RESOURCE_EXHAUSTED") {
        Err(ProviderError::RateLimited { status: status.as_u16(), body })
    } else {
        Err(ProviderError::Api { status: status.as_u16(), body })
    }
}

/// Parse a response body as JSON, returning a clear error if the server returned HTML.
async fn parse_json_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    endpoint: &str,
) -> Result<T, ProviderError> {
    let status = response.status();
    let body = response.text().await?;
    let trimmed = body.trim_start();
    if trimmed.starts_with('<') {
        let preview: String = trimmed.chars().take(200).collect();
        return Err(ProviderError::Decode(format!(
            "{} returned HTML instead of JSON (HTTP {}): {}",
            endpoint, status, preview
        )));
    }
    serde_json::from_str::<T>(&body).map_err(|e| {
        let preview: String = body.chars().take(300).collect();
        ProviderError::Decode(format!("{} (HTTP {}): {}. Body: {}", endpoint, status, e, preview))
    })
}

fn system_text(messages: &[ChatMessage]) -> Option<String> {
    let parts: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == ChatRole::System)
        .map(|m| m.content.as_str())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

fn google_request(messages: &[ChatMessage], config: &GenerationConfig) -> Value {
    let contents: Vec<Value> = messages
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .map(|m| {
            let role = if m.role == ChatRole::Assistant { "model" } else { "user" };
            json!({ "role": role, "parts": [{ "text": m.content }] })
        })
        .collect();

    let mut generation_config = json!({
        "temperature": config.temperature,
        "topP": config.top_p,
        "maxOutputTokens": config.max_tokens,
    });
    if config.json_output {
        generation_config["responseMimeType"] = json!("application/json");
    }

    let mut request = json!({
        "contents": contents,
        "generationConfig": generation_config,
    });
    if let Some(system) = system_text(messages) {
        request["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    request
}

fn openai_request(model: &str, messages: &[ChatMessage], config: &GenerationConfig) -> Value {
    let mut request = json!({
        "model": model,
        "messages": messages,
        "max_tokens": config.max_tokens,
        "temperature": config.temperature,
        "top_p": config.top_p,
        "stream": false
    });
    if config.json_output {
        request["response_format"] = json!({ "type": "json_object" });
    }
    request
}

fn anthropic_request(model: &str, messages: &[ChatMessage], config: &GenerationConfig) -> Value {
    let turns: Vec<&ChatMessage> = messages.iter().filter(|m| m.role != ChatRole::System).collect();
    let mut request = json!({
        "model": model,
        "messages": turns,
        "max_tokens": config.max_tokens,
        "temperature": config.temperature,
        "top_p": config.top_p,
    });
    if let Some(system) = system_text(messages) {
        request["system"] = json!(system);
    }
    request
}

/// Response structures
#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIMessage {
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: String,
}

#[derive(Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
}

#[derive(Deserialize)]
struct GoogleCandidate {
    content: GoogleContent,
}

#[derive(Deserialize)]
struct GoogleContent {
    parts: Vec<GooglePart>,
}

#[derive(Deserialize)]
struct GooglePart {
    text: String,
}
