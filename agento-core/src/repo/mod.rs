//! Typed CRUD repositories over the relational store (C1, §3). The store is the single
//! shared write surface (§5); every operation opens a short-lived connection inside
//! `tokio::task::spawn_blocking` rather than holding one across an `.await` point, following
//! `loom::memory::sqlite_store::SqliteStore`.

pub mod agents;
pub mod chats;
pub mod error;
pub mod integrations;
pub mod job_history;
pub mod messages;
pub mod notifications;
pub(crate) mod schema;
pub mod settings;
pub mod tasks;

pub use error::StoreError;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use agents::AgentRepo;
use chats::ChatRepo;
use integrations::IntegrationRepo;
use job_history::JobHistoryRepo;
use messages::MessageRepo;
use notifications::NotificationLogRepo;
use settings::SettingsRepo;
use tasks::TaskRepo;

pub(crate) fn open_conn(path: &Path) -> Result<rusqlite::Connection, StoreError> {
    let conn = rusqlite::Connection::open(path)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

/// Opens (creating if absent) the sqlite-backed store and exposes one repository per entity.
/// Cloning is cheap: each repo holds only an `Arc<PathBuf>`.
#[derive(Clone)]
pub struct Repositories {
    pub agents: AgentRepo,
    pub chats: ChatRepo,
    pub messages: MessageRepo,
    pub integrations: IntegrationRepo,
    pub tasks: TaskRepo,
    pub job_history: JobHistoryRepo,
    pub settings: SettingsRepo,
    pub notifications: NotificationLogRepo,
}

impl Repositories {
    /// Fatal on failure per §7 (database open failure aborts startup).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Storage(format!("create data dir: {e}")))?;
        }
        let conn = open_conn(&path)?;
        schema::init(&conn)?;
        let path = Arc::new(path);
        Ok(Self {
            agents: AgentRepo::new(Arc::clone(&path)),
            chats: ChatRepo::new(Arc::clone(&path)),
            messages: MessageRepo::new(Arc::clone(&path)),
            integrations: IntegrationRepo::new(Arc::clone(&path)),
            tasks: TaskRepo::new(Arc::clone(&path)),
            job_history: JobHistoryRepo::new(Arc::clone(&path)),
            settings: SettingsRepo::new(Arc::clone(&path)),
            notifications: NotificationLogRepo::new(path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_parent_dirs_and_tables() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("agento.db");
        let repos = Repositories::open(&db_path).unwrap();
        assert!(db_path.exists());
        drop(repos);
    }
}
