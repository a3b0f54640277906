//! SQLite-backed conversation store.
//!
//! One row per session holds the typed state; the active flow is serialized as JSON so new
//! flow variants never need a schema change. A flow that no longer decodes is dropped on load
//! instead of failing every later turn. Turn history is append-only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use tellr_core::domain::{ActiveFlow, ConversationState, Intent, SessionId};
use tellr_core::errors::CollaboratorError;
use tellr_core::session::{SessionStore, Speaker, TurnRecord};
use tracing::warn;

use super::RepositoryError;
use crate::DbPool;

pub struct SqlSessionStore {
    pool: DbPool,
}

impl SqlSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn load_state(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<ConversationState>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT session_id, current_intent, flow_json, turn, updated_at
            FROM conversation_state
            WHERE session_id = ?
            "#,
        )
        .bind(&session_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| state_from_row(&row)).transpose()
    }

    /// Upserts the state. A stored turn counter never moves backwards.
    pub async fn save_state(&self, state: &ConversationState) -> Result<(), RepositoryError> {
        let flow_json = state
            .flow
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|error| RepositoryError::Decode(format!("flow encode: {error}")))?;
        let turn = i64::try_from(state.turn)
            .map_err(|_| RepositoryError::Decode(format!("turn {} out of range", state.turn)))?;

        sqlx::query(
            r#"
            INSERT INTO conversation_state (session_id, current_intent, flow_json, turn, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                current_intent = excluded.current_intent,
                flow_json = excluded.flow_json,
                turn = MAX(conversation_state.turn, excluded.turn),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.session_id.0)
        .bind(state.current_intent.map(|intent| intent.as_label()))
        .bind(flow_json)
        .bind(turn)
        .bind(state.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn clear_session(&self, session_id: &SessionId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM conversation_turn WHERE session_id = ?")
            .bind(&session_id.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM conversation_state WHERE session_id = ?")
            .bind(&session_id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn insert_turn(&self, record: &TurnRecord) -> Result<(), RepositoryError> {
        let turn = i64::try_from(record.turn)
            .map_err(|_| RepositoryError::Decode(format!("turn {} out of range", record.turn)))?;
        sqlx::query(
            r#"
            INSERT INTO conversation_turn (session_id, turn, speaker, text, intent, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.session_id.0)
        .bind(turn)
        .bind(record.speaker.as_str())
        .bind(&record.text)
        .bind(record.intent.map(|intent| intent.as_label()))
        .bind(record.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_recent_turns(
        &self,
        session_id: &SessionId,
        limit: usize,
    ) -> Result<Vec<TurnRecord>, RepositoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r#"
            SELECT session_id, turn, speaker, text, intent, recorded_at
            FROM conversation_turn
            WHERE session_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(&session_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut turns = rows.iter().map(turn_from_row).collect::<Result<Vec<_>, _>>()?;
        turns.reverse();
        Ok(turns)
    }
}

#[async_trait]
impl SessionStore for SqlSessionStore {
    async fn load(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<ConversationState>, CollaboratorError> {
        Ok(self.load_state(session_id).await?)
    }

    async fn save(&self, state: &ConversationState) -> Result<(), CollaboratorError> {
        Ok(self.save_state(state).await?)
    }

    async fn clear(&self, session_id: &SessionId) -> Result<(), CollaboratorError> {
        Ok(self.clear_session(session_id).await?)
    }

    async fn append_turn(&self, record: TurnRecord) -> Result<(), CollaboratorError> {
        Ok(self.insert_turn(&record).await?)
    }

    async fn recent_turns(
        &self,
        session_id: &SessionId,
        limit: usize,
    ) -> Result<Vec<TurnRecord>, CollaboratorError> {
        Ok(self.list_recent_turns(session_id, limit).await?)
    }
}

fn state_from_row(row: &SqliteRow) -> Result<ConversationState, RepositoryError> {
    let session_id = SessionId(row.try_get("session_id")?);
    let flow = row.try_get::<Option<String>, _>("flow_json")?.and_then(|json| {
        match serde_json::from_str::<ActiveFlow>(&json) {
            Ok(flow) => Some(flow),
            Err(error) => {
                warn!(
                    event_name = "session.state_corrupted",
                    session_id = %session_id,
                    stage = "decode",
                    error = %error,
                    "stored flow discarded"
                );
                None
            }
        }
    });

    Ok(ConversationState {
        session_id,
        current_intent: parse_intent(row.try_get("current_intent")?)?,
        flow,
        turn: parse_turn(row.try_get("turn")?)?,
        updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn turn_from_row(row: &SqliteRow) -> Result<TurnRecord, RepositoryError> {
    let speaker = match row.try_get::<String, _>("speaker")?.as_str() {
        "user" => Speaker::User,
        "assistant" => Speaker::Assistant,
        other => return Err(RepositoryError::Decode(format!("unknown speaker `{other}`"))),
    };
    Ok(TurnRecord {
        session_id: SessionId(row.try_get("session_id")?),
        turn: parse_turn(row.try_get("turn")?)?,
        speaker,
        text: row.try_get("text")?,
        intent: parse_intent(row.try_get("intent")?)?,
        recorded_at: parse_timestamp(&row.try_get::<String, _>("recorded_at")?)?,
    })
}

fn parse_intent(raw: Option<String>) -> Result<Option<Intent>, RepositoryError> {
    raw.map(|label| {
        Intent::from_label(&label)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown intent `{label}`")))
    })
    .transpose()
}

fn parse_turn(raw: i64) -> Result<u64, RepositoryError> {
    u64::try_from(raw).map_err(|_| RepositoryError::Decode(format!("negative turn {raw}")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("timestamp `{raw}`: {error}")))
}
