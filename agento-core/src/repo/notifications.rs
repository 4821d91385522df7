//! Notification log repository (§3 NotificationLogEntry). Append-only; logged regardless of
//! send outcome (§4.6).

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::params;

use crate::model::NotificationLogEntry;

use super::{open_conn, StoreError};

#[derive(Clone)]
pub struct NotificationLogRepo {
    db_path: Arc<PathBuf>,
}

impl NotificationLogRepo {
    pub(crate) fn new(db_path: Arc<PathBuf>) -> Self {
        Self { db_path }
    }

    pub async fn append(&self, entry: NotificationLogEntry) -> Result<(), StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let data = serde_json::to_string(&entry)?;
            conn.execute(
                "INSERT INTO notification_log (id, created_at, data) VALUES (?1, ?2, ?3)",
                params![entry.id.to_string(), entry.created_at.to_rfc3339(), data],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn list(&self) -> Result<Vec<NotificationLogEntry>, StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let mut stmt = conn.prepare("SELECT data FROM notification_log ORDER BY created_at DESC")?;
            let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
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
    use crate::model::DeliveryStatus;
    use chrono::Utc;
    use uuid::Uuid;

    fn repo() -> NotificationLogRepo {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("n.db");
        std::mem::forget(dir);
        let conn = open_conn(&path).unwrap();
        super::super::schema::init(&conn).unwrap();
        NotificationLogRepo::new(Arc::new(path))
    }

    #[tokio::test]
    async fn append_then_list() {
        let repo = repo();
        repo.append(NotificationLogEntry {
            id: Uuid::new_v4(),
            event_type: "tasks_scheduler.task_execution.finished".into(),
            provider: "smtp".into(),
            subject: "Task finished".into(),
            status: DeliveryStatus::Sent,
            error_msg: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        let entries = repo.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, DeliveryStatus::Sent);
    }
}
