//! Rolling summary with eviction of summarized messages.
//!
//! Once the history grows past `max_messages`, every message except the most
//! recent `retained` ones is folded into `summary` and dropped from the
//! history. An existing summary is extended rather than rebuilt.

use super::chat_client::ChatClient;
use super::prompts;
use crate::error::{PipelineError, PipelineResult};
use crate::llm::ChatMessage;
use crate::types::ConversationState;

pub fn should_summarize(message_count: usize, max_messages: usize) -> bool {
    message_count > max_messages
}

/// Summarized messages followed by the summarize/extend instruction.
pub fn summary_request(state: &ConversationState, retained: usize) -> Vec<ChatMessage> {
    let split = state.messages.len().saturating_sub(retained);
    let mut request: Vec<ChatMessage> = state.messages[..split].iter().map(ChatMessage::from).collect();
    let existing = state.has_summary().then_some(state.summary.as_str());
    request.push(ChatMessage::user(prompts::summary_instruction(existing)));
    request
}

pub async fn summarize(client: &ChatClient, state: &mut ConversationState, retained: usize) -> PipelineResult<()> {
    let count = state.messages.len();
    if count <= retained {
        return Err(PipelineError::EvictionInconsistency { remaining: count });
    }

    let summary = client.complete(&summary_request(state, retained)).await?;
    state.summary = summary.trim().to_string();
    state.messages.drain(..count - retained);

    tracing::info!(evicted = count - retained, kept = state.messages.len(), "Summarized conversation");
    Ok(())
}
