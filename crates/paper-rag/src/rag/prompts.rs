//! Prompt templates for every language-model stage of a turn.

use crate::types::{Message, Role};

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

const CLASSIFICATION_PROMPT: &str = r#"You are a helpful assistant tasked with classifying user queries into three classes: no-retrieve, simple, complex.

The meaning of each class:
  - no-retrieve: Classify the query as no-retrieve only if it can be answered using previously provided contexts. If no prior context is available, do not assign this class.
  - simple: The query is straightforward and focuses on a single topic or intent. It does not require decomposition, but may be rewritten or rephrased slightly to enhance the retrieval of the most relevant documents.
  - complex: The query includes multiple, nested, or interdependent questions or requirements. It should be broken down into simpler, independent sub-queries and rewritten to improve the retrieval of relevant documents for each part.

Given:
  - The original user query.
  - The summary of the previous conversation.
  - The recent user messages.

Your task is to:
Analyze the context of the conversation and properly classify the user query into an appropriate class mentioned above.

Output format:
Return a JSON object containing the key "class" following the format: {"class": "<class_name>"}.

Examples:
Input: Các đóng góp chính là gì?
Output: {"class": "simple"}

Input: Những mô hình nào được sử dụng trong việc đánh giá chất lượng của bộ dữ liệu và độ chính xác của từng mô hình như thế nào?
Output: {"class": "complex"}

Input: Quy trình lấy mẫu như thế nào, cho ví dụ?
Output: {"class": "complex"}"#;

// ---------------------------------------------------------------------------
// Query transformation
// ---------------------------------------------------------------------------

const QUERY_RULES: &str = r#"  - Use formal, academic language and terminologies commonly found in research papers.
  - Maintain the original meaning and intent of the user query without fabricating new information.
  - Include the phrase "in this paper" if it does not exist in the original query.
  - Be short and concise.
  - Avoid using conversational or emotional phrasing such as "Could you", "Can you", or similar question forms; instead, use a clear and formal tone."#;

const REWRITE_PROMPT: &str = r#"You are a helpful assistant tasked with reformulating user queries to improve retrieval in a RAG system.

Given:
  - The original user query.
  - The summary of the previous conversation.
  - The recent user messages.

Your task is to:
  - Generate three distinct reformulated versions of the given user query that are optimized to improve retrieval from a vector database containing research paper documents.
  - Use the conversation summary and recent messages to determine if the user query refers to or builds upon prior discussion. If so, rewrite the query with the necessary context to make it self-contained and unambiguous.

Each rewritten query MUST:"#;

const DECOMPOSE_PROMPT: &str = r#"You are a helpful assistant tasked with breaking down complex queries into simpler sub-queries to improve retrieval in a RAG system.

Given:
  - The original user query.
  - The summary of the previous conversation.
  - The recent user messages.

Your task is to:
  - Break down the given user query into simpler sub-queries and rewrite them to improve retrieval from a vector database containing research paper documents.
  - Use the conversation summary and recent messages to determine if the user query refers to or builds upon prior discussion. If so, rewrite the sub-queries with the necessary context to make them self-contained and unambiguous.

Each rewritten sub-query MUST:
  - Focus on a single topic or intent."#;

const LINE_OUTPUT_FORMAT: &str = "Output format:\nProvide one query per line, with no numbering and no extra text.";

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

const GENERATION_PROMPT: &str = r#"You are a helpful assistant helping answer questions based on given information.

Given:
  - The summary of the previous conversation.
  - The recent user messages.
  - The documents relevant to the user query.

Your task is to:
  - Analyze the context of the conversation and select documents that provide direct, relevant, and sufficient information to generate a complete and accurate response to the user's last question.
  - If none of the documents meaningfully address the query, first check whether it could be answered using the previous conversation below. If not, clearly state that no relevant documents are available and avoid attempting to answer the question.

Your answer MUST:
  - Be in {language} only. DO NOT translate complex words to another language.
  - Avoid using first-person pronouns, or expressing personal opinions.

Output format:
Structure your answer using Markdown format.
  - Use numbered sections (1., 2., 3., ...) when listing key parts.
  - Use bold (`**`) for section titles or key terms.
  - Use bullet points for supporting details or subpoints.
  - Separate each section with a blank line.
  - Use indentation to represent nested or hierarchical content levels.
  - Make sure your response is clean, well-formatted, and easy to read in Markdown."#;

const DOCUMENT_LABEL: &str = "Document:";

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Render conversation messages as `role: content` lines.
pub fn render_messages(messages: &[Message]) -> String {
    if messages.is_empty() {
        return "(none)".to_string();
    }
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            format!("{}: {}", role, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_summary(summary: &str) -> &str {
    if summary.trim().is_empty() {
        "(none)"
    } else {
        summary
    }
}

fn with_context(instructions: &str, query: &str, summary: &str, messages: &[Message]) -> String {
    format!(
        "{}\n\nConversation summary: {}\nRecent messages:\n{}\nOriginal query: {}",
        instructions,
        render_summary(summary),
        render_messages(messages),
        query
    )
}

pub fn classification_prompt(query: &str, summary: &str, messages: &[Message]) -> String {
    with_context(CLASSIFICATION_PROMPT, query, summary, messages)
}

pub fn rewrite_prompt(query: &str, summary: &str, messages: &[Message]) -> String {
    let instructions = format!("{}\n{}\n\n{}", REWRITE_PROMPT, QUERY_RULES, LINE_OUTPUT_FORMAT);
    with_context(&instructions, query, summary, messages)
}

pub fn decompose_prompt(query: &str, summary: &str, messages: &[Message]) -> String {
    let instructions = format!("{}\n{}\n\n{}", DECOMPOSE_PROMPT, QUERY_RULES, LINE_OUTPUT_FORMAT);
    with_context(&instructions, query, summary, messages)
}

/// System prompt grounding the answer in the summary and retrieved passages.
pub fn generation_prompt(summary: &str, documents: &[String], language: &str) -> String {
    let documents_text = if documents.is_empty() {
        "(no documents retrieved)".to_string()
    } else {
        documents
            .iter()
            .map(|d| format!("{}\n{}", DOCUMENT_LABEL, d))
            .collect::<Vec<_>>()
            .join("\n\n")
    };
    format!(
        "{}\n\nConversation summary: {}\nRelevant documents:\n{}",
        GENERATION_PROMPT.replace("{language}", language),
        render_summary(summary),
        documents_text
    )
}

/// Final user turn of the summarization request: create a summary, or
/// extend `existing` when there is one.
pub fn summary_instruction(existing: Option<&str>) -> String {
    match existing {
        None => "Create a summary of the conversation above:".to_string(),
        Some(summary) => format!(
            "This is the summary of the conversation to date: {}\nExtend the summary by taking into account the new messages above:",
            summary
        ),
    }
}
