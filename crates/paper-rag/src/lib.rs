pub mod config;
pub mod embeddings;
pub mod error;
pub mod indexing;
pub mod llm;
pub mod pipeline;
pub mod processing;
pub mod rag;
pub mod reranking;
pub mod search;
pub mod session;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export primary types for convenience
pub use config::RagConfig;
pub use error::{Collaborator, PipelineError, PipelineResult};
pub use indexing::DocumentIndexer;
pub use pipeline::{ConversationPipeline, Stage, TurnOutcome};
pub use session::SessionStore;
pub use types::{ConversationState, Message, QueryClass, Role, RouteDecision};

// Re-export LLM types
pub use llm::{ApiProvider, ChatMessage, GenerationConfig, LLMConfig, LLMProvider, ProviderInfo};

pub use anyhow::{Error, Result};
