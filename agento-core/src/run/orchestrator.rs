//! Run orchestrator (C6, §4.1): `BeginRun`/`CommitRun`, effective agent resolution, and the
//! at-most-one-active-run guard for this component's own boundary (C7 additionally guards at
//! the chat-service layer, §4.2).

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use agento_protocol::{MessageBlock, RunEvent, Usage};
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::events::{BusEvent, EventBus};
use crate::integrations::IntegrationRegistry;
use crate::mcp_registry::McpServerSpec;
use crate::model::{Agent, ChatMessage, ChatRole, ChatSession, PermissionMode, ThinkingMode, UserSettings};
use crate::repo::Repositories;
use crate::run::allowlist::build_allowed_tools;
use crate::run::capture::TurnCapture;
use crate::run::demux::demux_frame;
use crate::run::handle::RunHandle;
use crate::runtime::{LlmRuntime, RunError, RunOptions};
use crate::tools::LocalToolServer;

/// Effective per-run agent configuration (§4.1 "Effective agent resolution"): either the
/// named agent or a synthesized direct-chat default.
pub struct EffectiveAgent {
    pub model: String,
    pub thinking: ThinkingMode,
    pub permission_mode: PermissionMode,
    pub capabilities: crate::model::Capabilities,
}

impl EffectiveAgent {
    pub fn resolve(agent: Option<&Agent>, session: &ChatSession, settings: &UserSettings) -> Self {
        match agent {
            Some(agent) => Self {
                model: if session.model.is_empty() { agent.model.clone() } else { session.model.clone() },
                thinking: agent.thinking,
                permission_mode: agent.permission_mode,
                capabilities: agent.capabilities.clone(),
            },
            None => Self {
                model: if session.model.is_empty() { settings.default_model.clone() } else { session.model.clone() },
                thinking: ThinkingMode::Adaptive,
                permission_mode: PermissionMode::Default,
                capabilities: BTreeMap::new(),
            },
        }
    }
}

pub struct RunOrchestrator {
    repos: Repositories,
    local_tools: Arc<LocalToolServer>,
    local_registry: Arc<BTreeMap<String, McpServerSpec>>,
    integrations: Arc<IntegrationRegistry>,
    runtime: Arc<dyn LlmRuntime>,
    events: Arc<EventBus>,
    active_runs: Mutex<HashSet<Uuid>>,
}

impl RunOrchestrator {
    pub fn new(
        repos: Repositories,
        local_tools: Arc<LocalToolServer>,
        local_registry: Arc<BTreeMap<String, McpServerSpec>>,
        integrations: Arc<IntegrationRegistry>,
        runtime: Arc<dyn LlmRuntime>,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new(Self {
            repos,
            local_tools,
            local_registry,
            integrations,
            runtime,
            events,
            active_runs: Mutex::new(HashSet::new()),
        })
    }

    /// `NOT_FOUND` is the caller's responsibility (session/agent lookup happens before this is
    /// called); this returns `Conflict` when a run is already active for the session (§4.1).
    pub async fn begin_run(
        self: &Arc<Self>,
        session: &ChatSession,
        agent: Option<&Agent>,
        prompt: String,
        settings: &UserSettings,
    ) -> Result<RunHandle, RunError> {
        {
            let mut active = self.active_runs.lock().await;
            if active.contains(&session.id) {
                return Err(RunError::Conflict);
            }
            active.insert(session.id);
        }

        // Persist the user message before any network I/O (§4.1).
        if let Err(e) = self
            .repos
            .messages
            .append(ChatMessage {
                session_id: session.id,
                role: ChatRole::User,
                content: prompt.clone(),
                timestamp: Utc::now(),
                blocks: None,
            })
            .await
        {
            self.active_runs.lock().await.remove(&session.id);
            return Err(e.into());
        }

        let effective = EffectiveAgent::resolve(agent, session, settings);
        let allowed_tools =
            build_allowed_tools(&effective.capabilities, &self.local_tools, &self.local_registry, &self.integrations).await;
        let mut mcp_servers: Vec<(String, McpServerSpec)> =
            self.local_registry.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        for server in self.integrations.running_servers().await {
            // Integration tool servers run in-process (§4.4 "local transport"); this synthetic
            // URL just gives the runtime a server spec entry matching the `mcp__<id>__*` names
            // already present in `allowed_tools`.
            let url = format!("agento-integration://{}", server.integration_id);
            mcp_servers.push((server.integration_id.to_string(), McpServerSpec::StreamableHttp { url }));
        }

        let options = RunOptions {
            continuation_token: session.continuation_token.clone(),
            model: effective.model,
            thinking_mode: effective.thinking,
            permission_mode: effective.permission_mode,
            allowed_tools,
            mcp_servers,
            working_directory: session.working_directory.clone(),
            settings_file_path: None,
        };

        let runtime_stream = match self.runtime.start_run(options, prompt).await {
            Ok(s) => s,
            Err(e) => {
                self.active_runs.lock().await.remove(&session.id);
                return Err(e);
            }
        };

        let (events_tx, events_rx) = tokio::sync::mpsc::channel(64);
        let answers_tx = runtime_stream.answers.clone();
        let orchestrator = Arc::clone(self);
        let session_id = session.id;
        let mut frames = runtime_stream.frames;
        let driver = tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                for event in demux_frame(&frame) {
                    let terminal = event.is_terminal();
                    if events_tx.send(event).await.is_err() {
                        break;
                    }
                    if terminal {
                        orchestrator.active_runs.lock().await.remove(&session_id);
                        return;
                    }
                }
            }
            // Stream closed without a terminal event: a transport-level failure (§4.1).
            orchestrator.active_runs.lock().await.remove(&session_id);
        });

        Ok(RunHandle::new(events_rx, answers_tx, driver))
    }

    /// Persists the assistant message (skipped when `text_aggregate` is empty), replaces the
    /// continuation token, accumulates usage, bumps `updated_at` (§4.1 `CommitRun`).
    pub async fn commit_run(
        &self,
        session: &mut ChatSession,
        blocks: Vec<MessageBlock>,
        text_aggregate: String,
        usage: Usage,
        continuation_token: String,
    ) -> Result<(), RunError> {
        if !text_aggregate.is_empty() {
            self.repos
                .messages
                .append(ChatMessage {
                    session_id: session.id,
                    role: ChatRole::Assistant,
                    content: text_aggregate,
                    timestamp: Utc::now(),
                    blocks: Some(blocks),
                })
                .await?;
        }
        if !continuation_token.is_empty() {
            session.continuation_token = continuation_token;
        }
        session.accumulate_usage(&usage);
        session.updated_at = Utc::now();
        self.repos.chats.update(session.clone()).await?;
        Ok(())
    }

    /// Drains a `RunHandle` to its terminal event (or stream-close), capturing blocks and
    /// committing the outcome. Convenience wrapper combining `TurnCapture` with `CommitRun`,
    /// used by the chat service and the scheduler alike (§4.1/§4.2/§4.3 "run pipeline parity").
    pub async fn drive_to_completion(
        &self,
        session: &mut ChatSession,
        mut handle: RunHandle,
    ) -> Result<RunEvent, RunError> {
        let mut capture = TurnCapture::new();
        let mut terminal = None;
        while let Some(event) = handle.events.recv().await {
            capture.on_event(&event);
            self.publish_status(&event).await;
            if event.is_terminal() {
                terminal = Some(event);
                break;
            }
        }
        let Some(RunEvent::ResultTerminal { usage, continuation_token, .. }) = terminal.clone() else {
            return Err(RunError::Transport("run ended without a terminal event".to_string()));
        };
        self.commit_run(session, capture.into_blocks(), capture.text_aggregate(), usage, continuation_token).await?;
        Ok(terminal.expect("checked above"))
    }

    async fn publish_status(&self, event: &RunEvent) {
        if let RunEvent::SystemStatus { message } = event {
            self.events.publish(BusEvent::new("run.status").with("message", message.clone())).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::schema;
    use crate::runtime::MockLlmRuntime;
    use std::path::PathBuf;

    fn orchestrator() -> Arc<RunOrchestrator> {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("orch.db");
        std::mem::forget(dir);
        let repos = Repositories::open(&path).unwrap();
        let conn = rusqlite::Connection::open(&path).unwrap();
        schema::init(&conn).unwrap();
        let integrations = IntegrationRegistry::new(repos.integrations.clone());
        RunOrchestrator::new(
            repos,
            Arc::new(LocalToolServer::default()),
            Arc::new(BTreeMap::new()),
            integrations,
            Arc::new(MockLlmRuntime::single_turn_with_tool_use("tok-1")),
            EventBus::default_bus(),
        )
    }

    fn sample_session() -> ChatSession {
        let now = Utc::now();
        ChatSession {
            id: Uuid::new_v4(),
            title: "New chat".into(),
            agent_slug: String::new(),
            continuation_token: String::new(),
            working_directory: "/tmp".into(),
            model: "mock-model".into(),
            settings_profile_id: String::new(),
            created_at: now,
            updated_at: now,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_cache_creation_tokens: 0,
            total_cache_read_tokens: 0,
        }
    }

    #[tokio::test]
    async fn seed_scenario_one_first_turn_with_tool_use() {
        let orch = orchestrator();
        let settings = UserSettings::default();
        let mut session = sample_session();
        orch.repos.chats.create(session.clone()).await.unwrap();

        let handle = orch
            .begin_run(&session, None, "what time is it in Tokyo?".to_string(), &settings)
            .await
            .unwrap();
        let terminal = orch.drive_to_completion(&mut session, handle).await.unwrap();
        assert!(terminal.is_terminal());
        assert_eq!(session.continuation_token, "tok-1");

        let messages = orch.repos.messages.list_for_session(session.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::User);
        assert_eq!(messages[1].role, ChatRole::Assistant);
        let blocks = messages[1].blocks.as_ref().unwrap();
        assert!(blocks.iter().any(|b| matches!(b, MessageBlock::ToolUse { name, result: Some(_), .. } if name == "current_time")));
    }

    #[tokio::test]
    async fn concurrent_begin_run_on_same_session_conflicts() {
        let orch = orchestrator();
        let settings = UserSettings::default();
        let session = sample_session();
        orch.repos.chats.create(session.clone()).await.unwrap();

        let _first = orch.begin_run(&session, None, "p1".to_string(), &settings).await.unwrap();
        let second = orch.begin_run(&session, None, "p2".to_string(), &settings).await;
        assert!(second.is_err());
    }
}
