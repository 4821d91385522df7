//! Job history repository (§3 JobHistory). Rows are never mutated after reaching a terminal
//! status except for retention deletion (`prune`, §9 Open Question on retention).

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::model::JobHistory;

use super::{open_conn, StoreError};

#[derive(Clone)]
pub struct JobHistoryRepo {
    db_path: Arc<PathBuf>,
}

impl JobHistoryRepo {
    pub(crate) fn new(db_path: Arc<PathBuf>) -> Self {
        Self { db_path }
    }

    pub async fn insert(&self, entry: JobHistory) -> Result<(), StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let data = serde_json::to_string(&entry)?;
            conn.execute(
                "INSERT INTO job_history (id, task_id, started_at, data) VALUES (?1, ?2, ?3, ?4)",
                params![entry.id.to_string(), entry.task_id.to_string(), entry.started_at.to_rfc3339(), data],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn update(&self, entry: JobHistory) -> Result<(), StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let data = serde_json::to_string(&entry)?;
            let changed = conn.execute("UPDATE job_history SET data = ?2 WHERE id = ?1", params![entry.id.to_string(), data])?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("job history '{}'", entry.id)));
            }
            Ok(())
        })
        .await?
    }

    pub async fn get(&self, id: Uuid) -> Result<JobHistory, StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let data: String = conn
                .query_row("SELECT data FROM job_history WHERE id = ?1", params![id.to_string()], |r| r.get(0))
                .map_err(|_| StoreError::NotFound(format!("job history '{id}'")))?;
            Ok(serde_json::from_str(&data)?)
        })
        .await?
    }

    pub async fn list_for_task(&self, task_id: Uuid) -> Result<Vec<JobHistory>, StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let mut stmt = conn.prepare(
                "SELECT data FROM job_history WHERE task_id = ?1 ORDER BY started_at DESC",
            )?;
            let rows = stmt.query_map(params![task_id.to_string()], |r| r.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(serde_json::from_str(&row?)?);
            }
            Ok(out)
        })
        .await?
    }

    /// §9 Open Question decision: a configurable cap plus age-based purge. Deletes rows beyond
    /// `max_rows` (oldest first, by `started_at`) and/or older than `max_age`. Both `None` means
    /// unbounded retention, matching spec's stated default.
    pub async fn prune(&self, max_rows: Option<u32>, max_age: Option<Duration>) -> Result<u64, StoreError> {
        if max_rows.is_none() && max_age.is_none() {
            return Ok(0);
        }
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let mut deleted = 0u64;
            if let Some(max_age) = max_age {
                let cutoff = (Utc::now() - max_age).to_rfc3339();
                deleted += conn.execute("DELETE FROM job_history WHERE started_at < ?1", params![cutoff])? as u64;
            }
            if let Some(max_rows) = max_rows {
                let total: i64 = conn.query_row("SELECT COUNT(*) FROM job_history", [], |r| r.get(0))?;
                let excess = total - max_rows as i64;
                if excess > 0 {
                    deleted += conn.execute(
                        "DELETE FROM job_history WHERE id IN (
                            SELECT id FROM job_history ORDER BY started_at ASC LIMIT ?1
                        )",
                        params![excess],
                    )? as u64;
                }
            }
            Ok(deleted)
        })
        .await?
    }
}
