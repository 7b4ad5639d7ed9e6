//! Multi-query rewriting and decomposition.

use std::sync::LazyLock;

use super::chat_client::ChatClient;
use super::prompts;
use crate::error::PipelineResult;
use crate::processing::clean_text;
use crate::types::Message;

static LIST_MARKER_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^\s*(?:\d+[.)]|[-*•])\s+").expect("list marker regex is valid")
});

/// One query per non-empty line, list markers stripped, whitespace cleaned.
pub fn parse_query_lines(raw: &str) -> Vec<String> {
    raw.trim()
        .split('\n')
        .map(|line| clean_text(&LIST_MARKER_RE.replace(line, "")))
        .filter(|line| !line.is_empty())
        .collect()
}

fn with_fallback(mut queries: Vec<String>, query: &str) -> Vec<String> {
    if queries.is_empty() {
        tracing::warn!("Query transformation produced no queries, using the original");
        queries.push(clean_text(query));
    }
    queries
}

/// Up to `max_rewrites` formal, self-contained reformulations of `query`.
pub async fn rewrite(
    client: &ChatClient,
    query: &str,
    summary: &str,
    messages: &[Message],
    max_rewrites: usize,
) -> PipelineResult<Vec<String>> {
    let raw = client.prompt(prompts::rewrite_prompt(query, summary, messages)).await?;
    let mut queries = parse_query_lines(&raw);
    queries.truncate(max_rewrites);
    Ok(with_fallback(queries, query))
}

/// Independent single-intent sub-queries of a compound `query`.
pub async fn decompose(
    client: &ChatClient,
    query: &str,
    summary: &str,
    messages: &[Message],
) -> PipelineResult<Vec<String>> {
    let raw = client.prompt(prompts::decompose_prompt(query, summary, messages)).await?;
    Ok(with_fallback(parse_query_lines(&raw), query))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{chat_client, ScriptedLlm};

    #[test]
    fn test_parse_query_lines() {
        let raw = "\n1. What   dataset is used in this paper?\n\n- How is the dataset annotated in this paper?\n  \nWhat metrics are reported in this paper?\n";
        assert_eq!(
            parse_query_lines(raw),
            vec![
                "What dataset is used in this paper?",
                "How is the dataset annotated in this paper?",
                "What metrics are reported in this paper?",
            ]
        );
    }

    #[test]
    fn test_parse_keeps_numbers_inside_queries() {
        assert_eq!(
            parse_query_lines("Which 3 baselines are compared in this paper?"),
            vec!["Which 3 baselines are compared in this paper?"]
        );
    }

    #[tokio::test]
    async fn test_rewrite_truncates_to_limit() {
        let llm = ScriptedLlm::new().with_rewrites(&["q1 in this paper", "q2 in this paper", "q3 in this paper", "q4 in this paper"]);
        let client = chat_client(llm);
        let queries = rewrite(&client, "what is q?", "", &[], 3).await.unwrap();
        assert_eq!(queries.len(), 3);
        assert_eq!(queries[0], "q1 in this paper");
    }

    #[tokio::test]
    async fn test_empty_decomposition_falls_back() {
        let llm = ScriptedLlm::new().with_decomposition(&[]);
        let client = chat_client(llm);
        let queries = decompose(&client, "  compare   A and B ", "", &[]).await.unwrap();
        assert_eq!(queries, vec!["compare A and B"]);
    }
}
