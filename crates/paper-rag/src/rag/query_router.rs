//! Query classification and the routing table that turns a verdict into the
//! next stage of the turn.

use serde::Deserialize;

use super::chat_client::ChatClient;
use super::prompts;
use crate::error::{PipelineError, PipelineResult};
use crate::llm::ChatMessage;
use crate::types::{Message, QueryClass, RouteDecision};

#[derive(Deserialize)]
struct ClassificationResponse {
    class: String,
}

/// Routing table. A "no-retrieve" verdict only skips retrieval once the
/// conversation holds at least `context_threshold` messages.
pub fn route(class: QueryClass, message_count: usize, context_threshold: usize) -> RouteDecision {
    match class {
        QueryClass::AnswerableFromContext if message_count >= context_threshold => RouteDecision::Skip,
        QueryClass::AnswerableFromContext | QueryClass::Simple => RouteDecision::Rewrite,
        QueryClass::Complex => RouteDecision::Decompose,
    }
}

/// Parse the classifier's `{"class": ...}` reply. Markdown fences are
/// tolerated; any other shape or label is a malformed classification.
pub fn parse_classification(raw: &str) -> PipelineResult<QueryClass> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let json_str = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => cleaned,
    };

    serde_json::from_str::<ClassificationResponse>(json_str)
        .ok()
        .and_then(|response| QueryClass::from_label(&response.class))
        .ok_or_else(|| PipelineError::MalformedClassification(raw.trim().to_string()))
}

pub async fn classify(
    client: &ChatClient,
    query: &str,
    summary: &str,
    messages: &[Message],
) -> PipelineResult<QueryClass> {
    let prompt = prompts::classification_prompt(query, summary, messages);
    let raw = client.complete_json(&[ChatMessage::user(prompt)]).await?;
    let class = parse_classification(&raw)?;
    tracing::debug!(class = class.label(), "Classified query");
    Ok(class)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_table() {
        assert_eq!(route(QueryClass::AnswerableFromContext, 1, 3), RouteDecision::Rewrite);
        assert_eq!(route(QueryClass::AnswerableFromContext, 2, 3), RouteDecision::Rewrite);
        assert_eq!(route(QueryClass::AnswerableFromContext, 3, 3), RouteDecision::Skip);
        assert_eq!(route(QueryClass::AnswerableFromContext, 9, 3), RouteDecision::Skip);
        for count in [0, 1, 3, 50] {
            assert_eq!(route(QueryClass::Simple, count, 3), RouteDecision::Rewrite);
            assert_eq!(route(QueryClass::Complex, count, 3), RouteDecision::Decompose);
        }
    }

    #[test]
    fn test_routing_is_deterministic() {
        for _ in 0..10 {
            assert_eq!(route(QueryClass::Complex, 4, 3), RouteDecision::Decompose);
        }
    }

    #[test]
    fn test_parse_classification() {
        assert_eq!(parse_classification(r#"{"class": "simple"}"#).unwrap(), QueryClass::Simple);
        assert_eq!(
            parse_classification("```json\n{\"class\": \"Complex\"}\n```").unwrap(),
            QueryClass::Complex
        );
        assert_eq!(
            parse_classification(r#"Output: {"class":"no-retrieve"}"#).unwrap(),
            QueryClass::AnswerableFromContext
        );
    }

    #[test]
    fn test_parse_classification_rejects_unknown() {
        assert!(matches!(
            parse_classification(r#"{"class": "retrieve"}"#),
            Err(PipelineError::MalformedClassification(_))
        ));
        assert!(parse_classification("simple").is_err());
        assert!(parse_classification(r#"{"label": "simple"}"#).is_err());
    }
}
