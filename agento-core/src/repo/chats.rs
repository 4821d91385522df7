//! Chat session repository (§3 ChatSession).

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

use crate::model::ChatSession;

use super::{open_conn, StoreError};

#[derive(Clone)]
pub struct ChatRepo {
    db_path: Arc<PathBuf>,
}

impl ChatRepo {
    pub(crate) fn new(db_path: Arc<PathBuf>) -> Self {
        Self { db_path }
    }

    pub async fn create(&self, session: ChatSession) -> Result<(), StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let data = serde_json::to_string(&session)?;
            conn.execute(
                "INSERT INTO chat_sessions (id, created_at, data) VALUES (?1, ?2, ?3)",
                params![session.id.to_string(), session.created_at.to_rfc3339(), data],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn get(&self, id: Uuid) -> Result<ChatSession, StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let data: String = conn
                .query_row("SELECT data FROM chat_sessions WHERE id = ?1", params![id.to_string()], |r| r.get(0))
                .map_err(|_| StoreError::NotFound(format!("chat session '{id}'")))?;
            Ok(serde_json::from_str(&data)?)
        })
        .await?
    }

    pub async fn list(&self) -> Result<Vec<ChatSession>, StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let mut stmt = conn.prepare("SELECT data FROM chat_sessions ORDER BY created_at DESC")?;
            let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(serde_json::from_str(&row?)?);
            }
            Ok(out)
        })
        .await?
    }

    /// Full replace. Callers (C6/C7) are responsible for the monotonicity invariants on
    /// `updated_at` and the four token counters (§3, §8).
    pub async fn update(&self, session: ChatSession) -> Result<(), StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let data = serde_json::to_string(&session)?;
            let changed = conn.execute(
                "UPDATE chat_sessions SET data = ?2 WHERE id = ?1",
                params![session.id.to_string(), data],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("chat session '{}'", session.id)));
            }
            Ok(())
        })
        .await?
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let changed = conn.execute("DELETE FROM chat_sessions WHERE id = ?1", params![id.to_string()])?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("chat session '{id}'")));
            }
            conn.execute("DELETE FROM chat_messages WHERE session_id = ?1", params![id.to_string()])?;
            Ok(())
        })
        .await?
    }

    /// Clears every agent reference back to direct-chat semantics (§3 Agent deletion invariant).
    pub async fn clear_agent_references(&self, agent_slug: &str) -> Result<u64, StoreError> {
        let db_path = Arc::clone(&self.db_path);
        let agent_slug = agent_slug.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let mut stmt = conn.prepare("SELECT id, data FROM chat_sessions")?;
            let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?;
            let mut updated = 0u64;
            for row in rows {
                let (id, data) = row?;
                let mut session: ChatSession = serde_json::from_str(&data)?;
                if session.agent_slug == agent_slug {
                    session.agent_slug.clear();
                    session.updated_at = Utc::now();
                    let new_data = serde_json::to_string(&session)?;
                    conn.execute("UPDATE chat_sessions SET data = ?2 WHERE id = ?1", params![id, new_data])?;
                    updated += 1;
                }
            }
            Ok(updated)
        })
        .await?
    }
}
