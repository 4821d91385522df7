//! Scheduled task repository (§3, §4.3). `next_fire_claim` implements the atomic
//! "advance next_run_at, bump run_count" step of the tick loop (§4.3 step 1, §5 ordering
//! guarantee: a single task cannot double-fire under concurrent ticks).

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::model::{RunStatus, ScheduledTask, TaskStatus};

use super::{open_conn, StoreError};

#[derive(Clone)]
pub struct TaskRepo {
    db_path: Arc<PathBuf>,
}

impl TaskRepo {
    pub(crate) fn new(db_path: Arc<PathBuf>) -> Self {
        Self { db_path }
    }

    pub async fn create(&self, task: ScheduledTask) -> Result<(), StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let data = serde_json::to_string(&task)?;
            conn.execute(
                "INSERT INTO scheduled_tasks (id, next_run_at, status, data) VALUES (?1, ?2, ?3, ?4)",
                params![
                    task.id.to_string(),
                    task.next_run_at.map(|t| t.to_rfc3339()),
                    status_str(task.status),
                    data
                ],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn get(&self, id: Uuid) -> Result<ScheduledTask, StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let data: String = conn
                .query_row("SELECT data FROM scheduled_tasks WHERE id = ?1", params![id.to_string()], |r| r.get(0))
                .map_err(|_| StoreError::NotFound(format!("scheduled task '{id}'")))?;
            Ok(serde_json::from_str(&data)?)
        })
        .await?
    }

    pub async fn list(&self) -> Result<Vec<ScheduledTask>, StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let mut stmt = conn.prepare("SELECT data FROM scheduled_tasks")?;
            let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(serde_json::from_str(&row?)?);
            }
            Ok(out)
        })
        .await?
    }

    /// Active tasks whose `next_run_at` is due at or before `now`, used by the tick loop to
    /// rebuild its priority heap on startup and after mutations.
    pub async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTask>, StoreError> {
        let all = self.list().await?;
        Ok(all
            .into_iter()
            .filter(|t| t.status == TaskStatus::Active && t.next_run_at.is_some_and(|n| n <= now))
            .collect())
    }

    pub async fn update(&self, task: ScheduledTask) -> Result<(), StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let data = serde_json::to_string(&task)?;
            let changed = conn.execute(
                "UPDATE scheduled_tasks SET next_run_at = ?2, status = ?3, data = ?4 WHERE id = ?1",
                params![
                    task.id.to_string(),
                    task.next_run_at.map(|t| t.to_rfc3339()),
                    status_str(task.status),
                    data
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("scheduled task '{}'", task.id)));
            }
            Ok(())
        })
        .await?
    }

    /// Atomically advances `next_run_at` and bumps `run_count` only if the row's current
    /// `next_run_at` still matches `expected_next_run_at` — the guard against double-fire under
    /// concurrent ticks (§4.3, §5).
    pub async fn claim_fire(
        &self,
        id: Uuid,
        expected_next_run_at: DateTime<Utc>,
        new_next_run_at: Option<DateTime<Utc>>,
    ) -> Result<Option<ScheduledTask>, StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let mut conn = open_conn(&db_path)?;
            let tx = conn.transaction()?;
            let data: String = tx
                .query_row("SELECT data FROM scheduled_tasks WHERE id = ?1", params![id.to_string()], |r| r.get(0))
                .map_err(|_| StoreError::NotFound(format!("scheduled task '{id}'")))?;
            let mut task: ScheduledTask = serde_json::from_str(&data)?;
            if task.next_run_at != Some(expected_next_run_at) {
                return Ok(None);
            }
            task.run_count += 1;
            task.next_run_at = new_next_run_at;
            if task.should_stop(Utc::now()) {
                task.status = TaskStatus::Paused;
                task.next_run_at = None;
            }
            let updated = serde_json::to_string(&task)?;
            tx.execute(
                "UPDATE scheduled_tasks SET next_run_at = ?2, status = ?3, data = ?4 WHERE id = ?1",
                params![id.to_string(), task.next_run_at.map(|t| t.to_rfc3339()), status_str(task.status), updated],
            )?;
            tx.commit()?;
            Ok(Some(task))
        })
        .await?
    }

    pub async fn record_run_outcome(
        &self,
        id: Uuid,
        status: RunStatus,
        finished_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut task = self.get(id).await?;
        task.last_run_at = Some(finished_at);
        task.last_run_status = Some(status);
        self.update(task).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let changed = conn.execute("DELETE FROM scheduled_tasks WHERE id = ?1", params![id.to_string()])?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("scheduled task '{id}'")));
            }
            Ok(())
        })
        .await?
    }
}

fn status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Active => "active",
        TaskStatus::Paused => "paused",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScheduleConfig;

    fn repo() -> TaskRepo {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        std::mem::forget(dir);
        let conn = open_conn(&path).unwrap();
        super::super::schema::init(&conn).unwrap();
        TaskRepo::new(Arc::new(path))
    }

    fn sample(next_run_at: Option<DateTime<Utc>>) -> ScheduledTask {
        let now = Utc::now();
        ScheduledTask {
            id: Uuid::new_v4(),
            name: "every minute".into(),
            description: String::new(),
            prompt: "check inbox".into(),
            agent_slug: String::new(),
            working_directory: String::new(),
            model: String::new(),
            settings_profile_id: String::new(),
            timeout_minutes: 30,
            schedule: ScheduleConfig::Interval { every_minutes: 1, every_hours: 0, every_days: 0 },
            stop_after_count: 0,
            stop_after_time: None,
            status: TaskStatus::Active,
            run_count: 0,
            last_run_at: None,
            last_run_status: None,
            next_run_at,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn claim_fire_rejects_stale_expectation() {
        let repo = repo();
        let now = Utc::now();
        let task = sample(Some(now));
        repo.create(task.clone()).await.unwrap();

        let claimed = repo.claim_fire(task.id, now, Some(now + chrono::Duration::minutes(1))).await.unwrap();
        assert!(claimed.is_some());
        assert_eq!(claimed.unwrap().run_count, 1);

        // Second claim against the same (now-stale) expected value must not double-fire.
        let second = repo.claim_fire(task.id, now, Some(now + chrono::Duration::minutes(2))).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn claim_fire_pauses_on_stop_after_count() {
        let repo = repo();
        let now = Utc::now();
        let mut task = sample(Some(now));
        task.stop_after_count = 1;
        repo.create(task.clone()).await.unwrap();

        let claimed = repo.claim_fire(task.id, now, Some(now + chrono::Duration::minutes(1))).await.unwrap().unwrap();
        assert_eq!(claimed.status, TaskStatus::Paused);
        assert_eq!(claimed.next_run_at, None);
    }

    #[tokio::test]
    async fn list_due_filters_by_status_and_time() {
        let repo = repo();
        let now = Utc::now();
        let due = sample(Some(now - chrono::Duration::minutes(1)));
        let not_due = sample(Some(now + chrono::Duration::minutes(5)));
        repo.create(due.clone()).await.unwrap();
        repo.create(not_due).await.unwrap();

        let results = repo.list_due(now).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, due.id);
    }
}
