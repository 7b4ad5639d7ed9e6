//! Turn stages: classify and route, rewrite or decompose, retrieve, answer,
//! summarize.

pub mod chat_client;
pub mod generator;
pub mod prompts;
pub mod query_router;
pub mod query_transformer;
pub mod retriever;
pub mod summarizer;

pub use chat_client::ChatClient;
pub use generator::{generate, strip_code_fences};
pub use query_router::{classify, parse_classification, route};
pub use query_transformer::{decompose, parse_query_lines, rewrite};
pub use retriever::{unique_documents, MultiQueryRetriever};
pub use summarizer::{should_summarize, summarize};
