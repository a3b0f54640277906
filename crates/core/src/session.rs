use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::conversation::{ConversationState, SessionId};
use crate::domain::intent::Intent;
use crate::errors::CollaboratorError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One line of conversation history. User text is stored after scrubbing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub session_id: SessionId,
    pub turn: u64,
    pub speaker: Speaker,
    pub text: String,
    pub intent: Option<Intent>,
    pub recorded_at: DateTime<Utc>,
}

impl TurnRecord {
    pub fn new(
        session_id: SessionId,
        turn: u64,
        speaker: Speaker,
        text: impl Into<String>,
        intent: Option<Intent>,
    ) -> Self {
        Self { session_id, turn, speaker, text: text.into(), intent, recorded_at: Utc::now() }
    }
}

/// Narrow get/put port over the external conversation store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &SessionId)
        -> Result<Option<ConversationState>, CollaboratorError>;
    async fn save(&self, state: &ConversationState) -> Result<(), CollaboratorError>;
    async fn clear(&self, session_id: &SessionId) -> Result<(), CollaboratorError>;
    async fn append_turn(&self, record: TurnRecord) -> Result<(), CollaboratorError>;
    /// Most recent turns, oldest first.
    async fn recent_turns(
        &self,
        session_id: &SessionId,
        limit: usize,
    ) -> Result<Vec<TurnRecord>, CollaboratorError>;
}

#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    states: Arc<RwLock<HashMap<SessionId, ConversationState>>>,
    history: Arc<RwLock<HashMap<SessionId, Vec<TurnRecord>>>>,
}

impl InMemorySessionStore {
    pub async fn history(&self, session_id: &SessionId) -> Vec<TurnRecord> {
        self.history.read().await.get(session_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<ConversationState>, CollaboratorError> {
        Ok(self.states.read().await.get(session_id).cloned())
    }

    async fn save(&self, state: &ConversationState) -> Result<(), CollaboratorError> {
        self.states.write().await.insert(state.session_id.clone(), state.clone());
        Ok(())
    }

    async fn clear(&self, session_id: &SessionId) -> Result<(), CollaboratorError> {
        self.states.write().await.remove(session_id);
        Ok(())
    }

    async fn append_turn(&self, record: TurnRecord) -> Result<(), CollaboratorError> {
        self.history.write().await.entry(record.session_id.clone()).or_default().push(record);
        Ok(())
    }

    async fn recent_turns(
        &self,
        session_id: &SessionId,
        limit: usize,
    ) -> Result<Vec<TurnRecord>, CollaboratorError> {
        let history = self.history.read().await;
        let turns = history.get(session_id).map(Vec::as_slice).unwrap_or_default();
        let start = turns.len().saturating_sub(limit);
        Ok(turns[start..].to_vec())
    }
}
