//! Settings repository (§3 UserSettings, §4.7). Single row (`id = 0`); notification settings
//! are embedded as a JSON string inside the snapshot to preserve forward compatibility, per spec.

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::params;

use crate::model::UserSettings;

use super::{open_conn, StoreError};

#[derive(Clone)]
pub struct SettingsRepo {
    db_path: Arc<PathBuf>,
}

impl SettingsRepo {
    pub(crate) fn new(db_path: Arc<PathBuf>) -> Self {
        Self { db_path }
    }

    pub async fn get(&self) -> Result<UserSettings, StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let data: Option<String> = conn
                .query_row("SELECT data FROM settings WHERE id = 0", [], |r| r.get(0))
                .ok();
            match data {
                Some(data) => Ok(serde_json::from_str(&data)?),
                None => Ok(UserSettings::default()),
            }
        })
        .await?
    }

    pub async fn put(&self, settings: UserSettings) -> Result<(), StoreError> {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_conn(&db_path)?;
            let data = serde_json::to_string(&settings)?;
            conn.execute(
                "INSERT INTO settings (id, data) VALUES (0, ?1)
                 ON CONFLICT(id) DO UPDATE SET data = excluded.data",
                params![data],
            )?;
            Ok(())
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> SettingsRepo {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.db");
        std::mem::forget(dir);
        let conn = open_conn(&path).unwrap();
        super::super::schema::init(&conn).unwrap();
        SettingsRepo::new(Arc::new(path))
    }

    #[tokio::test]
    async fn get_defaults_when_unset() {
        let repo = repo();
        let settings = repo.get().await.unwrap();
        assert_eq!(settings.theme, "system");
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let repo = repo();
        let mut settings = repo.get().await.unwrap();
        settings.default_model = "claude-opus".into();
        repo.put(settings.clone()).await.unwrap();
        let got = repo.get().await.unwrap();
        assert_eq!(got.default_model, "claude-opus");
    }
}
