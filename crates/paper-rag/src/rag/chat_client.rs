use std::sync::Arc;
use std::time::Duration;

use crate::error::{call_collaborator, Collaborator, PipelineResult};
use crate::llm::{ChatMessage, GenerationConfig, LLMConfig, LLMProvider};

/// Language-model handle shared by the turn stages: one provider, one
/// generation config, one deadline.
#[derive(Clone)]
pub struct ChatClient {
    llm: Arc<dyn LLMProvider>,
    generation: GenerationConfig,
    deadline: Duration,
    json_output: bool,
}

impl ChatClient {
    pub fn new(llm: Arc<dyn LLMProvider>, config: &LLMConfig) -> Self {
        let info = llm.info();
        tracing::info!(
            provider = %info.name,
            model = %info.model,
            json_output = info.supports_json_output,
            "Language model ready"
        );
        Self {
            llm,
            generation: GenerationConfig::from(config),
            deadline: config.call_deadline(),
            json_output: info.supports_json_output,
        }
    }

    pub async fn complete(&self, messages: &[ChatMessage]) -> PipelineResult<String> {
        self.call(messages, &self.generation).await
    }

    /// Completion constrained to a JSON object where the provider supports
    /// it; otherwise a plain completion and the prompt carries the format.
    pub async fn complete_json(&self, messages: &[ChatMessage]) -> PipelineResult<String> {
        if !self.json_output {
            return self.complete(messages).await;
        }
        let generation = self.generation.clone().json();
        self.call(messages, &generation).await
    }

    pub async fn prompt(&self, prompt: String) -> PipelineResult<String> {
        self.complete(&[ChatMessage::user(prompt)]).await
    }

    async fn call(&self, messages: &[ChatMessage], generation: &GenerationConfig) -> PipelineResult<String> {
        call_collaborator(
            Collaborator::LanguageModel,
            self.deadline,
            self.llm.chat(messages, generation),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{chat_client, ScriptedLlm};

    #[tokio::test]
    async fn test_json_mode_follows_provider_support() {
        let llm = ScriptedLlm::new();
        let client = chat_client(llm.clone());
        client.complete_json(&[ChatMessage::user("classify")]).await.unwrap();
        client.complete(&[ChatMessage::user("plain")]).await.unwrap();
        assert_eq!(llm.json_requests(), vec![true, false]);

        let llm = ScriptedLlm::new().without_json_output();
        let client = chat_client(llm.clone());
        client.complete_json(&[ChatMessage::user("classify")]).await.unwrap();
        assert_eq!(llm.json_requests(), vec![false]);
    }
}
