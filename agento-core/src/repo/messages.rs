//! Chat message repository (§3 ChatMessage). Append-only; `seq` enforces arrival order within
//! a session independent of timestamp resolution.

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::params;
use uuid::Uuid;

use crate::model::ChatMessage;

use super::{open_conn, StoreError};

#[derive(Clone)]
pub struct MessageRepo {
    db_path: Arc<PathBuf>,
}

impl MessageRepo {
    pub(crate) fn new(db_path: Arc<PathBuf>) -> Self {
        Self { db_path }
    }

    pub async fn append(&self, message: ChatMessage) -> Result<(), StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let next_seq: i64 = conn
                .query_row(
                    "SELECT COALESCE(MAX(seq), -1) + 1 FROM chat_messages WHERE session_id = ?1",
                    params![message.session_id.to_string()],
                    |r| r.get(0),
                )?;
            let data = serde_json::to_string(&message)?;
            conn.execute(
                "INSERT INTO chat_messages (session_id, seq, timestamp, data) VALUES (?1, ?2, ?3, ?4)",
                params![message.session_id.to_string(), next_seq, message.timestamp.to_rfc3339(), data],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn list_for_session(&self, session_id: Uuid) -> Result<Vec<ChatMessage>, StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let mut stmt = conn.prepare(
                "SELECT data FROM chat_messages WHERE session_id = ?1 ORDER BY seq ASC",
            )?;
            let rows = stmt.query_map(params![session_id.to_string()], |r| r.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(serde_json::from_str(&row?)?);
            }
            Ok(out)
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChatRole;
    use chrono::Utc;

    fn repo() -> MessageRepo {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.db");
        std::mem::forget(dir);
        let conn = open_conn(&path).unwrap();
        super::super::schema::init(&conn).unwrap();
        MessageRepo::new(Arc::new(path))
    }

    #[tokio::test]
    async fn append_preserves_arrival_order() {
        let repo = repo();
        let session_id = Uuid::new_v4();
        for (i, content) in ["hi", "hello back", "how are you"].iter().enumerate() {
            repo.append(ChatMessage {
                session_id,
                role: if i % 2 == 0 { ChatRole::User } else { ChatRole::Assistant },
                content: content.to_string(),
                timestamp: Utc::now(),
                blocks: None,
            })
            .await
            .unwrap();
        }
        let msgs = repo.list_for_session(session_id).await.unwrap();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].content, "hi");
        assert_eq!(msgs[2].content, "how are you");
    }
}
