//! Chat service (C7, §4.2). Thin lifecycle around the run orchestrator; owns the
//! at-most-one-active-run guard via a per-session in-memory lock acquired in `begin_message`
//! and released when the returned [`ChatRunHandle`] is dropped (§4.2, §9 design note on
//! process-wide mutable state).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::model::{Agent, ChatMessage, ChatSession};
use crate::repo::{Repositories, StoreError};
use crate::run::{RunHandle, RunOrchestrator};
use crate::runtime::RunError;
use crate::settings::SettingsManager;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("a message is already being processed for this chat")]
    Conflict,
    #[error("agent '{0}' does not exist")]
    UnknownAgent(String),
}

const TITLE_MAX_CHARS: usize = 60;

/// First `TITLE_MAX_CHARS` characters of `prompt`, trimmed at a UTF-8-safe boundary, with an
/// ellipsis appended when truncated (§9 Open Question decision: title auto-derivation).
fn derive_title(prompt: &str) -> String {
    let trimmed = prompt.trim();
    if trimmed.chars().count() <= TITLE_MAX_CHARS {
        return trimmed.to_string();
    }
    let truncated: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    format!("{truncated}…")
}

/// Bundles the run's event stream with the per-session lock guard so the guard's lifetime is
/// tied to the caller holding this handle (dropped once the caller finishes driving the run).
pub struct ChatRunHandle {
    pub handle: RunHandle,
    _guard: OwnedMutexGuard<()>,
}

pub struct ChatService {
    repos: Repositories,
    orchestrator: Arc<RunOrchestrator>,
    settings: Arc<SettingsManager>,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ChatService {
    pub fn new(repos: Repositories, orchestrator: Arc<RunOrchestrator>, settings: Arc<SettingsManager>) -> Arc<Self> {
        Arc::new(Self { repos, orchestrator, settings, locks: Mutex::new(HashMap::new()) })
    }

    pub async fn list_sessions(&self) -> Result<Vec<ChatSession>, ChatError> {
        Ok(self.repos.chats.list().await?)
    }

    pub async fn get_session(&self, id: Uuid) -> Result<ChatSession, ChatError> {
        Ok(self.repos.chats.get(id).await?)
    }

    pub async fn get_session_with_history(&self, id: Uuid) -> Result<(ChatSession, Vec<ChatMessage>), ChatError> {
        let session = self.repos.chats.get(id).await?;
        let history = self.repos.messages.list_for_session(id).await?;
        Ok((session, history))
    }

    /// Validates `agent_slug` existence when non-empty; otherwise creates a direct-chat session
    /// (§4.2).
    pub async fn create_session(
        &self,
        agent_slug: Option<String>,
        working_directory: Option<String>,
        model: Option<String>,
        settings_profile_id: Option<String>,
    ) -> Result<ChatSession, ChatError> {
        let agent_slug = agent_slug.unwrap_or_default();
        if !agent_slug.is_empty() {
            self.repos.agents.get(&agent_slug).await.map_err(|_| ChatError::UnknownAgent(agent_slug.clone()))?;
        }
        let settings_snapshot = self.settings.get().await;
        let now = Utc::now();
        let session = ChatSession {
            id: Uuid::new_v4(),
            title: "New chat".to_string(),
            agent_slug,
            continuation_token: String::new(),
            working_directory: working_directory.unwrap_or(settings_snapshot.default_working_directory),
            model: model.unwrap_or_default(),
            settings_profile_id: settings_profile_id.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_cache_creation_tokens: 0,
            total_cache_read_tokens: 0,
        };
        self.repos.chats.create(session.clone()).await?;
        Ok(session)
    }

    pub async fn update_session(&self, session: ChatSession) -> Result<(), ChatError> {
        Ok(self.repos.chats.update(session).await?)
    }

    pub async fn delete_session(&self, id: Uuid) -> Result<(), ChatError> {
        self.repos.chats.delete(id).await?;
        self.locks.lock().await.remove(&id);
        Ok(())
    }

    async fn lock_for(&self, session_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(session_id).or_insert_with(|| Arc::new(Mutex::new(()))))
    }

    /// Acquires the per-session lock (returns `Conflict` if already held), auto-derives the
    /// session title on the first message, then delegates to `RunOrchestrator::begin_run`.
    pub async fn begin_message(&self, session_id: Uuid, prompt: String) -> Result<(ChatSession, ChatRunHandle), ChatError> {
        let lock = self.lock_for(session_id).await;
        let guard = Arc::clone(&lock).try_lock_owned().map_err(|_| ChatError::Conflict)?;

        let mut session = self.repos.chats.get(session_id).await?;
        let history = self.repos.messages.list_for_session(session_id).await?;
        if history.is_empty() && session.title == "New chat" {
            session.title = derive_title(&prompt);
            self.repos.chats.update(session.clone()).await?;
        }

        let agent: Option<Agent> = if session.agent_slug.is_empty() {
            None
        } else {
            Some(self.repos.agents.get(&session.agent_slug).await?)
        };
        let settings_snapshot = self.settings.get().await;

        let handle = self.orchestrator.begin_run(&session, agent.as_ref(), prompt, &settings_snapshot).await?;
        Ok((session, ChatRunHandle { handle, _guard: guard }))
    }

    pub fn orchestrator(&self) -> &Arc<RunOrchestrator> {
        &self.orchestrator
    }
}
