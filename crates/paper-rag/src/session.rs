use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::types::ConversationState;

/// Latest committed `ConversationState` per session. Each session has its
/// own async mutex; holding it is what serializes turns within a session.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Mutex<ConversationState>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_session_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Handle to a session's state, creating an empty one on first use.
    pub fn checkout(&self, session_id: &str) -> Arc<Mutex<ConversationState>> {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    /// Clone of the committed state. Waits for an in-flight turn to finish.
    pub async fn snapshot(&self, session_id: &str) -> ConversationState {
        let handle = match self.sessions.get(session_id) {
            Some(entry) => entry.clone(),
            None => return ConversationState::default(),
        };
        let state = handle.lock().await;
        state.clone()
    }

    pub async fn reset(&self, session_id: &str) {
        let handle = self.checkout(session_id);
        *handle.lock().await = ConversationState::default();
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
