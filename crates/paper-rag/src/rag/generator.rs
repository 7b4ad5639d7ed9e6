use std::sync::LazyLock;

use super::chat_client::ChatClient;
use super::prompts;
use crate::error::PipelineResult;
use crate::llm::ChatMessage;
use crate::types::ConversationState;

static CODE_FENCE_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"```markdown|```").expect("code fence regex is valid"));

/// System grounding followed by the whole message history.
pub fn build_messages(state: &ConversationState, language: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(state.messages.len() + 1);
    messages.push(ChatMessage::system(prompts::generation_prompt(
        &state.summary,
        &state.retrieved_documents,
        language,
    )));
    messages.extend(state.messages.iter().map(ChatMessage::from));
    messages
}

/// Drop the fence markers models wrap Markdown answers in.
pub fn strip_code_fences(text: &str) -> String {
    CODE_FENCE_RE.replace_all(text, "").trim().to_string()
}

pub async fn generate(client: &ChatClient, state: &ConversationState, language: &str) -> PipelineResult<String> {
    let raw = client.complete(&build_messages(state, language)).await?;
    Ok(strip_code_fences(&raw))
}
