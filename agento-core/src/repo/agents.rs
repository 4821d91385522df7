//! Agent repository (§3). `slug` is the primary key and must match
//! `^[a-z0-9]+(?:-[a-z0-9]+)*$`.

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::params;

use crate::model::Agent;

use super::{open_conn, StoreError};

#[derive(Clone)]
pub struct AgentRepo {
    db_path: Arc<PathBuf>,
}

/// Validates the slug shape required by §3's Agent invariant.
pub fn validate_slug(slug: &str) -> Result<(), StoreError> {
    let valid = !slug.is_empty()
        && slug
            .split('-')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    if valid {
        Ok(())
    } else {
        Err(StoreError::Validation(format!(
            "agent slug '{slug}' must match ^[a-z0-9]+(?:-[a-z0-9]+)*$"
        )))
    }
}

impl AgentRepo {
    pub(crate) fn new(db_path: Arc<PathBuf>) -> Self {
        Self { db_path }
    }

    pub async fn create(&self, agent: Agent) -> Result<(), StoreError> {
        validate_slug(&agent.slug)?;
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let exists: Option<i64> = conn
                .query_row("SELECT 1 FROM agents WHERE slug = ?1", params![agent.slug], |r| r.get(0))
                .ok();
            if exists.is_some() {
                return Err(StoreError::Conflict(format!("agent slug '{}' already exists", agent.slug)));
            }
            let data = serde_json::to_string(&agent)?;
            conn.execute("INSERT INTO agents (slug, data) VALUES (?1, ?2)", params![agent.slug, data])?;
            Ok(())
        })
        .await?
    }

    pub async fn upsert(&self, agent: Agent) -> Result<(), StoreError> {
        validate_slug(&agent.slug)?;
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let data = serde_json::to_string(&agent)?;
            conn.execute(
                "INSERT INTO agents (slug, data) VALUES (?1, ?2)
                 ON CONFLICT(slug) DO UPDATE SET data = excluded.data",
                params![agent.slug, data],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn get(&self, slug: &str) -> Result<Agent, StoreError> {
        let db_path = Arc::clone(&self.db_path);
        let slug = slug.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let data: String = conn
                .query_row("SELECT data FROM agents WHERE slug = ?1", params![slug], |r| r.get(0))
                .map_err(|_| StoreError::NotFound(format!("agent '{slug}'")))?;
            Ok(serde_json::from_str(&data)?)
        })
        .await?
    }

    pub async fn list(&self) -> Result<Vec<Agent>, StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let mut stmt = conn.prepare("SELECT data FROM agents ORDER BY slug")?;
            let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(serde_json::from_str(&row?)?);
            }
            Ok(out)
        })
        .await?
    }

    /// Hard delete (§3: referencing chats fall back to direct-chat semantics — enforced by
    /// `ChatRepo`/`ChatService`, not here).
    pub async fn delete(&self, slug: &str) -> Result<(), StoreError> {
        let db_path = Arc::clone(&self.db_path);
        let slug = slug.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let changed = conn.execute("DELETE FROM agents WHERE slug = ?1", params![slug])?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("agent '{slug}'")));
            }
            Ok(())
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PermissionMode, ThinkingMode};
    use std::collections::BTreeMap;

    fn sample(slug: &str) -> Agent {
        Agent {
            slug: slug.to_string(),
            name: "Hello".into(),
            description: String::new(),
            model: "claude-sonnet".into(),
            thinking: ThinkingMode::Adaptive,
            permission_mode: PermissionMode::Default,
            system_prompt: "hi".into(),
            capabilities: BTreeMap::new(),
        }
    }

    async fn repo() -> AgentRepo {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.db");
        std::mem::forget(dir);
        let conn = open_conn(&path).unwrap();
        super::schema::init(&conn).unwrap();
        AgentRepo::new(Arc::new(path))
    }

    #[tokio::test]
    async fn rejects_bad_slug() {
        let repo = repo().await;
        let err = repo.create(sample("Bad Slug")).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let repo = repo().await;
        repo.create(sample("hello-agent")).await.unwrap();
        let got = repo.get("hello-agent").await.unwrap();
        assert_eq!(got.name, "Hello");
    }

    #[tokio::test]
    async fn create_duplicate_slug_conflicts() {
        let repo = repo().await;
        repo.create(sample("dup")).await.unwrap();
        let err = repo.create(sample("dup")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let repo = repo().await;
        let err = repo.delete("missing").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
