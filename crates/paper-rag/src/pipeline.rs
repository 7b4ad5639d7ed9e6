//! Conversation turn state machine.
//!
//! A turn runs `Route -> {Rewrite | Decompose | skip} -> Retrieve -> Generate
//! -> [Summarize] -> Done` against a working copy of the session state. The
//! copy replaces the committed state only when the turn reaches `Done`.

use serde::Serialize;
use std::sync::Arc;

use crate::config::RagConfig;
use crate::embeddings::EmbeddingModel;
use crate::error::{PipelineError, PipelineResult};
use crate::llm::LLMProvider;
use crate::rag::{self, ChatClient, MultiQueryRetriever};
use crate::reranking::Reranker;
use crate::session::SessionStore;
use crate::storage::PassageStore;
use crate::types::{ConversationState, Message, RouteDecision};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Route,
    Rewrite,
    Decompose,
    Retrieve,
    Generate,
    Summarize,
    Done,
}

/// Transition function of the turn. `decision` is only consulted when
/// leaving `Route`, `summarize` only when leaving `Generate`.
pub fn next_stage(stage: Stage, decision: RouteDecision, summarize: bool) -> Stage {
    match stage {
        Stage::Route => match decision {
            RouteDecision::Skip => Stage::Generate,
            RouteDecision::Rewrite => Stage::Rewrite,
            RouteDecision::Decompose => Stage::Decompose,
        },
        Stage::Rewrite | Stage::Decompose => Stage::Retrieve,
        Stage::Retrieve => Stage::Generate,
        Stage::Generate if summarize => Stage::Summarize,
        Stage::Generate | Stage::Summarize | Stage::Done => Stage::Done,
    }
}

/// What a completed turn produced.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub answer: String,
    pub route: RouteDecision,
    /// Retrieval queries used this turn; empty when retrieval was skipped.
    pub queries: Vec<String>,
    /// Passages the answer was grounded on.
    pub passages: Vec<String>,
    pub summarized: bool,
}

pub struct ConversationPipeline {
    config: RagConfig,
    client: ChatClient,
    retriever: MultiQueryRetriever,
    sessions: Arc<SessionStore>,
}

impl ConversationPipeline {
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingModel>,
        store: Arc<dyn PassageStore>,
        reranker: Arc<dyn Reranker>,
        llm: Arc<dyn LLMProvider>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        let client = ChatClient::new(llm, &config.llm);
        let retriever = MultiQueryRetriever::new(&config, embedder, store, reranker);
        Self {
            config,
            client,
            retriever,
            sessions,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Run one turn for `session_id`. Turns within a session are serialized;
    /// a failed or dropped turn leaves the committed state untouched.
    pub async fn process_turn(&self, session_id: &str, user_message: &str) -> PipelineResult<TurnOutcome> {
        if user_message.trim().is_empty() {
            return Err(PipelineError::InvalidInput("user message is empty".to_string()));
        }

        let handle = self.sessions.checkout(session_id);
        let mut committed = handle.lock().await;
        let mut working = committed.clone();

        match self.run_turn(&mut working, user_message).await {
            Ok(outcome) => {
                *committed = working;
                tracing::info!(
                    session = %session_id,
                    route = ?outcome.route,
                    queries = outcome.queries.len(),
                    passages = outcome.passages.len(),
                    summarized = outcome.summarized,
                    "Turn complete"
                );
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(session = %session_id, error = %e, "Turn failed, state not committed");
                Err(e)
            }
        }
    }

    /// Drive the state machine over a caller-owned state.
    pub async fn run_turn(&self, state: &mut ConversationState, user_message: &str) -> PipelineResult<TurnOutcome> {
        let conversation = &self.config.conversation;
        let query = user_message.trim().to_string();
        state.messages.push(Message::user(query.clone()));

        let mut stage = Stage::Route;
        let mut decision = RouteDecision::Rewrite;
        let mut retrieved = false;
        let mut summarized = false;
        let mut answer = String::new();

        while stage != Stage::Done {
            tracing::debug!(stage = ?stage, "Entering stage");
            let mut summarize_next = false;
            match stage {
                Stage::Route => {
                    let class = rag::classify(&self.client, &query, &state.summary, &state.messages).await?;
                    decision = rag::route(class, state.messages.len(), conversation.context_history_threshold);
                    tracing::info!(class = class.label(), route = ?decision, "Routed query");
                }
                Stage::Rewrite => {
                    state.rewritten_queries = rag::rewrite(
                        &self.client,
                        &query,
                        &state.summary,
                        &state.messages,
                        conversation.max_rewrites,
                    )
                    .await?;
                    tracing::info!(queries = ?state.rewritten_queries, "Rewrote query");
                }
                Stage::Decompose => {
                    state.rewritten_queries =
                        rag::decompose(&self.client, &query, &state.summary, &state.messages).await?;
                    tracing::info!(queries = ?state.rewritten_queries, "Decomposed query");
                }
                Stage::Retrieve => {
                    state.retrieved_documents = self.retriever.retrieve(&state.rewritten_queries).await?;
                    retrieved = true;
                }
                Stage::Generate => {
                    answer = rag::generate(&self.client, state, &conversation.answer_language).await?;
                    state.messages.push(Message::assistant(answer.clone()));
                    summarize_next = rag::should_summarize(state.messages.len(), conversation.max_messages);
                }
                Stage::Summarize => {
                    rag::summarize(&self.client, state, conversation.retained_messages).await?;
                    summarized = true;
                }
                Stage::Done => {}
            }
            stage = next_stage(stage, decision, summarize_next);
        }

        Ok(TurnOutcome {
            answer,
            route: decision,
            queries: if retrieved { state.rewritten_queries.clone() } else { Vec::new() },
            passages: state.retrieved_documents.clone(),
            summarized,
        })
    }
}
