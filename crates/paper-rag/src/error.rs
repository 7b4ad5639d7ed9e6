use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// External service a pipeline stage depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    Embedding,
    Search,
    Rerank,
    LanguageModel,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Embedding => "embedding",
            Self::Search => "search",
            Self::Rerank => "rerank",
            Self::LanguageModel => "language model",
        };
        f.write_str(name)
    }
}

/// Turn-level failures. A turn that returns any of these never commits
/// conversation state.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{collaborator} service unavailable: {source:#}")]
    CollaboratorUnavailable {
        collaborator: Collaborator,
        #[source]
        source: anyhow::Error,
    },

    #[error("{collaborator} service timed out after {timeout:?}")]
    CollaboratorTimeout {
        collaborator: Collaborator,
        timeout: Duration,
    },

    #[error("classifier returned an unknown query class: {0}")]
    MalformedClassification(String),

    #[error("eviction left {remaining} messages, expected at least 2")]
    EvictionInconsistency { remaining: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl PipelineError {
    pub fn unavailable(collaborator: Collaborator, source: anyhow::Error) -> Self {
        Self::CollaboratorUnavailable {
            collaborator,
            source,
        }
    }

    /// Collaborator the failure came from, when there is one.
    pub fn collaborator(&self) -> Option<Collaborator> {
        match self {
            Self::CollaboratorUnavailable { collaborator, .. }
            | Self::CollaboratorTimeout { collaborator, .. } => Some(*collaborator),
            _ => None,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Await a collaborator call under a deadline, mapping both failure modes
/// onto [`PipelineError`].
pub(crate) async fn call_collaborator<T, F>(
    collaborator: Collaborator,
    timeout: Duration,
    fut: F,
) -> PipelineResult<T>
where
    F: std::future::Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::warn!(collaborator = %collaborator, error = %e, "Collaborator call failed");
            Err(PipelineError::unavailable(collaborator, e))
        }
        Err(_) => {
            tracing::warn!(collaborator = %collaborator, timeout = ?timeout, "Collaborator call timed out");
            Err(PipelineError::CollaboratorTimeout {
                collaborator,
                timeout,
            })
        }
    }
}
