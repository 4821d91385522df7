//! Integration repository (§3). Also backs the filesystem-fallback path of §6 when the caller
//! prefers `integrations/<id>.json` over the relational store (used by the registry's reload
//! path to avoid losing state mid-flight — see `crate::integrations`).

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::params;
use uuid::Uuid;

use crate::model::Integration;

use super::{open_conn, StoreError};

#[derive(Clone)]
pub struct IntegrationRepo {
    db_path: Arc<PathBuf>,
}

impl IntegrationRepo {
    pub(crate) fn new(db_path: Arc<PathBuf>) -> Self {
        Self { db_path }
    }

    pub async fn upsert(&self, integration: Integration) -> Result<(), StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let data = serde_json::to_string(&integration)?;
            conn.execute(
                "INSERT INTO integrations (id, data) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET data = excluded.data",
                params![integration.id.to_string(), data],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn get(&self, id: Uuid) -> Result<Integration, StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let data: String = conn
                .query_row("SELECT data FROM integrations WHERE id = ?1", params![id.to_string()], |r| r.get(0))
                .map_err(|_| StoreError::NotFound(format!("integration '{id}'")))?;
            Ok(serde_json::from_str(&data)?)
        })
        .await?
    }

    pub async fn list(&self) -> Result<Vec<Integration>, StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let mut stmt = conn.prepare("SELECT data FROM integrations")?;
            let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(serde_json::from_str(&row?)?);
            }
            Ok(out)
        })
        .await?
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let changed = conn.execute("DELETE FROM integrations WHERE id = ?1", params![id.to_string()])?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("integration '{id}'")));
            }
            Ok(())
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IntegrationType, OAuthCredentials};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn repo() -> IntegrationRepo {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("i.db");
        std::mem::forget(dir);
        let conn = open_conn(&path).unwrap();
        super::super::schema::init(&conn).unwrap();
        IntegrationRepo::new(Arc::new(path))
    }

    fn sample() -> Integration {
        let now = Utc::now();
        Integration {
            id: Uuid::new_v4(),
            name: "Calendar".into(),
            kind: IntegrationType::Google,
            enabled: true,
            credentials: OAuthCredentials::default(),
            auth: None,
            services: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn auth_field_preserved_byte_for_byte_on_resave() {
        let repo = repo();
        let mut integration = sample();
        integration.auth = Some(crate::model::OAuthToken {
            access_token: "at-1".into(),
            refresh_token: "rt-1".into(),
            expires_at: None,
        });
        repo.upsert(integration.clone()).await.unwrap();

        let mut reloaded = repo.get(integration.id).await.unwrap();
        assert_eq!(reloaded.auth, integration.auth);
        reloaded.name = "Calendar v2".into();
        repo.upsert(reloaded).await.unwrap();

        let final_version = repo.get(integration.id).await.unwrap();
        assert_eq!(final_version.auth, integration.auth);
    }
}
