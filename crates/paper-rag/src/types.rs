use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ============================================================================
// Conversation
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn record in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Per-session conversation state carried across turns.
///
/// `rewritten_queries` and `retrieved_documents` are overwritten by every
/// turn that retrieves. A turn routed past retrieval answers from the
/// documents left by the previous one. `summary` stays empty until the
/// first eviction and is replaced, never appended, on each summarization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationState {
    pub messages: Vec<Message>,
    pub rewritten_queries: Vec<String>,
    pub retrieved_documents: Vec<String>,
    pub summary: String,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_summary(&self) -> bool {
        !self.summary.trim().is_empty()
    }
}

// ============================================================================
// Routing
// ============================================================================

/// Classifier verdict for an incoming query. Never persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QueryClass {
    /// Answerable from the summary and recent messages alone.
    #[serde(rename = "no-retrieve")]
    AnswerableFromContext,
    #[serde(rename = "simple")]
    Simple,
    #[serde(rename = "complex")]
    Complex,
}

impl QueryClass {
    /// Label used on the wire with the classification prompt.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AnswerableFromContext => "no-retrieve",
            Self::Simple => "simple",
            Self::Complex => "complex",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "no-retrieve" => Some(Self::AnswerableFromContext),
            "simple" => Some(Self::Simple),
            "complex" => Some(Self::Complex),
            _ => None,
        }
    }
}

/// Transition chosen by the router for the current turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouteDecision {
    Skip,
    Rewrite,
    Decompose,
}

// ============================================================================
// Retrieval
// ============================================================================

/// Sparse lexical weights keyed by token id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn from_map(weights: HashMap<u32, f32>) -> Self {
        let mut pairs: Vec<(u32, f32)> = weights.into_iter().filter(|(_, w)| *w > 0.0).collect();
        pairs.sort_by_key(|(idx, _)| *idx);
        Self {
            indices: pairs.iter().map(|(i, _)| *i).collect(),
            values: pairs.iter().map(|(_, w)| *w).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Inner product with another sparse vector.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let lookup: HashMap<u32, f32> = other
            .indices
            .iter()
            .copied()
            .zip(other.values.iter().copied())
            .collect();
        self.indices
            .iter()
            .zip(&self.values)
            .filter_map(|(idx, w)| lookup.get(idx).map(|o| w * o))
            .sum()
    }

    /// Drop the `drop_ratio` fraction of smallest-magnitude weights.
    pub fn pruned(&self, drop_ratio: f32) -> Self {
        if self.is_empty() || drop_ratio <= 0.0 {
            return self.clone();
        }
        let drop = ((self.len() as f32) * drop_ratio).floor() as usize;
        if drop == 0 {
            return self.clone();
        }

        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|a, b| {
            self.values[*a]
                .abs()
                .partial_cmp(&self.values[*b].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut keep: Vec<usize> = order[drop..].to_vec();
        keep.sort_unstable();

        Self {
            indices: keep.iter().map(|&i| self.indices[i]).collect(),
            values: keep.iter().map(|&i| self.values[i]).collect(),
        }
    }
}

/// Dense + sparse embedding of one text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HybridEmbedding {
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
}

/// A passage ready for insertion into a passage store.
#[derive(Debug, Clone)]
pub struct NewPassage {
    pub text: String,
    pub embedding: HybridEmbedding,
}

/// Stored passage. Identity is assigned by the store; records are never
/// updated once inserted.
#[derive(Debug, Clone)]
pub struct PassageRecord {
    pub id: String,
    pub text: String,
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
}

/// Reranker output entry.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedPassage {
    pub text: String,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sparse(pairs: &[(u32, f32)]) -> SparseVector {
        SparseVector {
            indices: pairs.iter().map(|(i, _)| *i).collect(),
            values: pairs.iter().map(|(_, v)| *v).collect(),
        }
    }

    #[test]
    fn test_sparse_dot_only_counts_shared_terms() {
        let a = sparse(&[(1, 0.5), (4, 2.0), (9, 1.0)]);
        let b = sparse(&[(4, 0.25), (9, 3.0), (12, 7.0)]);
        assert!((a.dot(&b) - 3.5).abs() < 1e-6);
        assert_eq!(a.dot(&SparseVector::default()), 0.0);
    }

    #[test]
    fn test_pruning_drops_smallest_weights() {
        let v = sparse(&[(1, 0.1), (2, 0.9), (3, 0.3), (4, 0.05), (5, 0.7)]);
        let pruned = v.pruned(0.2);
        assert_eq!(pruned.indices, vec![1, 2, 3, 5]);
        assert_eq!(pruned.values, vec![0.1, 0.9, 0.3, 0.7]);
    }

    #[test]
    fn test_pruning_small_vectors_untouched() {
        let v = sparse(&[(1, 0.1), (2, 0.9)]);
        assert_eq!(v.pruned(0.2), v);
        assert_eq!(v.pruned(0.0), v);
    }

    #[test]
    fn test_from_map_sorted_and_positive() {
        let mut weights = HashMap::new();
        weights.insert(7, 0.4);
        weights.insert(2, 0.0);
        weights.insert(3, 0.8);
        let v = SparseVector::from_map(weights);
        assert_eq!(v.indices, vec![3, 7]);
        assert_eq!(v.values, vec![0.8, 0.4]);
    }

    #[test]
    fn test_query_class_labels() {
        assert_eq!(QueryClass::from_label("No-Retrieve"), Some(QueryClass::AnswerableFromContext));
        assert_eq!(QueryClass::from_label(" complex "), Some(QueryClass::Complex));
        assert_eq!(QueryClass::from_label("retrieve"), None);
        assert_eq!(QueryClass::Simple.label(), "simple");
    }

    #[test]
    fn test_has_summary_ignores_whitespace() {
        let mut state = ConversationState::new();
        assert!(!state.has_summary());
        state.summary = "  \n".to_string();
        assert!(!state.has_summary());
        state.summary = "discussed the dataset".to_string();
        assert!(state.has_summary());
    }
}
