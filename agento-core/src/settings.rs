//! Settings manager (C5, §4.7). Load-once-on-boot, write-through-on-update; rejects writes to
//! env-locked fields that differ from the locked value, silently normalizes when they match.

use agento_config::EnvLocks;
use tokio::sync::RwLock;

use crate::model::UserSettings;
use crate::repo::{settings::SettingsRepo, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("field '{field}' is locked by {env_var} and cannot be set to a different value")]
    Locked { field: String, env_var: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct SettingsManager {
    repo: SettingsRepo,
    locks: EnvLocks,
    cached: RwLock<UserSettings>,
}

impl SettingsManager {
    pub async fn load(repo: SettingsRepo) -> Result<Self, StoreError> {
        let locks = EnvLocks::from_env();
        let mut settings = repo.get().await?;
        apply_locks(&mut settings, &locks);
        Ok(Self { repo, locks, cached: RwLock::new(settings) })
    }

    pub async fn get(&self) -> UserSettings {
        self.cached.read().await.clone()
    }

    /// Rejects a write to a locked field only when the incoming value differs from the locked
    /// value; an unchanged value is accepted (§4.7: "otherwise silently normalized").
    pub async fn update(&self, mut new_settings: UserSettings) -> Result<UserSettings, SettingsError> {
        if self.locks.is_locked("default_model") {
            let locked = self.locks.locked_value("default_model").unwrap_or_default();
            if new_settings.default_model != locked && !new_settings.default_model.is_empty() {
                return Err(SettingsError::Locked {
                    field: "default_model".to_string(),
                    env_var: "AGENTO_DEFAULT_MODEL".to_string(),
                });
            }
        }
        if self.locks.is_locked("default_working_directory") {
            let locked = self.locks.locked_value("default_working_directory").unwrap_or_default();
            if new_settings.default_working_directory != locked && !new_settings.default_working_directory.is_empty() {
                return Err(SettingsError::Locked {
                    field: "default_working_directory".to_string(),
                    env_var: "AGENTO_WORKING_DIR".to_string(),
                });
            }
        }
        apply_locks(&mut new_settings, &self.locks);
        self.repo.put(new_settings.clone()).await?;
        *self.cached.write().await = new_settings.clone();
        Ok(new_settings)
    }

    pub fn locked_fields(&self) -> Vec<&'static str> {
        self.locks.fields().collect()
    }
}

fn apply_locks(settings: &mut UserSettings, locks: &EnvLocks) {
    if let Some(model) = locks.locked_value("default_model") {
        settings.default_model = model;
    }
    if let Some(dir) = locks.locked_value("default_working_directory") {
        settings.default_working_directory = dir;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::schema;

    fn repo() -> SettingsRepo {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.db");
        std::mem::forget(dir);
        let conn = rusqlite::Connection::open(&path).unwrap();
        schema::init(&conn).unwrap();
        SettingsRepo::new(std::sync::Arc::new(path))
    }

    #[tokio::test]
    async fn update_rejects_conflicting_locked_value() {
        std::env::set_var("AGENTO_DEFAULT_MODEL", "claude-locked");
        let manager = SettingsManager::load(repo()).await.unwrap();
        let mut new_settings = manager.get().await;
        new_settings.default_model = "claude-other".into();
        let err = manager.update(new_settings).await.unwrap_err();
        assert!(matches!(err, SettingsError::Locked { .. }));
        std::env::remove_var("AGENTO_DEFAULT_MODEL");
    }

    #[tokio::test]
    async fn update_accepts_matching_locked_value() {
        std::env::set_var("AGENTO_DEFAULT_MODEL", "claude-locked");
        let manager = SettingsManager::load(repo()).await.unwrap();
        let mut new_settings = manager.get().await;
        new_settings.default_model = "claude-locked".into();
        manager.update(new_settings).await.unwrap();
        std::env::remove_var("AGENTO_DEFAULT_MODEL");
    }
}
