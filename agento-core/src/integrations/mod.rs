//! Integration registry (C4, §4.4). Per-integration lifecycle: OAuth, start/stop/reload of the
//! in-process tool server, scope computation. Process-wide mutable state (the state map, the
//! OAuth flow map) is wrapped in small guarded structures and never exposed directly (§9 design
//! note), following `serve::app::AppState`'s minimal-state-behind-a-mutex convention.

mod oauth_flow;
mod scopes;
mod service_tools;

pub use oauth_flow::OAuthFlowError;
pub use scopes::scopes_for_services;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::model::{Integration, IntegrationType, OAuthToken};
use crate::repo::integrations::IntegrationRepo;
use crate::repo::StoreError;
use crate::tools::{LocalTool, ToolSpec};

pub const OAUTH_FLOW_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationState {
    Absent,
    ConfiguredUnauthenticated,
    Starting,
    Running,
    Stopping,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    OAuth(#[from] OAuthFlowError),
    #[error("integration '{0}' is not in a state that allows this operation: {1:?}")]
    InvalidState(Uuid, IntegrationState),
}

/// One in-process tool server per integration, exposing tools under `mcp__<integration-id>__`.
/// The run orchestrator reads `qualified_tool_names()` when building the allowlist (§4.1).
pub struct IntegrationToolServer {
    pub integration_id: Uuid,
    tools: HashMap<String, Arc<dyn LocalTool>>,
}

impl IntegrationToolServer {
    pub fn new(integration_id: Uuid, tools: Vec<Arc<dyn LocalTool>>) -> Self {
        let tools = tools.into_iter().map(|t| (t.spec().name.clone(), t)).collect();
        Self { integration_id, tools }
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec()).collect()
    }

    /// `mcp__<integration-id>__<tool-name>` per §4.1's allowlist prefix rule.
    pub fn qualified_tool_names(&self) -> Vec<String> {
        self.tools.keys().map(|name| format!("mcp__{}__{}", self.integration_id, name)).collect()
    }

    pub async fn call(&self, tool_name: &str, input: serde_json::Value) -> Result<serde_json::Value, crate::tools::ToolError> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| crate::tools::ToolError::NotFound(tool_name.to_string()))?;
        tool.call(input).await
    }
}

struct RegistryInner {
    states: HashMap<Uuid, IntegrationState>,
    servers: HashMap<Uuid, Arc<IntegrationToolServer>>,
}

pub struct IntegrationRegistry {
    repo: IntegrationRepo,
    inner: Mutex<RegistryInner>,
}

impl IntegrationRegistry {
    pub fn new(repo: IntegrationRepo) -> Arc<Self> {
        Arc::new(Self {
            repo,
            inner: Mutex::new(RegistryInner {
                states: HashMap::new(),
                servers: HashMap::new(),
            }),
        })
    }

    pub async fn create(&self, integration: Integration) -> Result<(), IntegrationError> {
        let id = integration.id;
        self.repo.upsert(integration).await?;
        self.inner.lock().await.states.insert(id, IntegrationState::ConfiguredUnauthenticated);
        Ok(())
    }

    pub async fn state(&self, id: Uuid) -> IntegrationState {
        self.inner.lock().await.states.get(&id).copied().unwrap_or(IntegrationState::Absent)
    }

    /// Allocates a free loopback port, builds the authorization URL with scopes computed from
    /// enabled services, and spawns the one-shot receiver with a 10-minute timeout (§4.4). Safe
    /// to call concurrently for different ids — only this id's map entry is mutated, serialized
    /// behind the registry mutex for the duration of the mutation itself, not the whole flow.
    /// On a successful callback the token is persisted and the tool server started
    /// (configured-unauthenticated -> starting -> running) entirely in the background task; on
    /// timeout or provider error the state becomes `Failed` and `authenticated` stays false.
    pub async fn start_oauth(self: &Arc<Self>, id: Uuid) -> Result<String, IntegrationError> {
        let integration = self.repo.get(id).await?;
        let scopes = scopes_for_services(&integration.kind, &integration.services);
        let flow = oauth_flow::PendingFlow::start(&integration, scopes).await?;
        let auth_url = flow.authorize_url.clone();
        self.inner.lock().await.states.insert(id, IntegrationState::Starting);

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            match flow.wait_for_token().await {
                Ok(token) => {
                    if let Err(e) = registry.finish_oauth(id, token).await {
                        tracing::warn!(integration_id = %id, "failed to finish oauth flow: {e}");
                        registry.inner.lock().await.states.insert(id, IntegrationState::Failed);
                    }
                }
                Err(e) => {
                    tracing::warn!(integration_id = %id, "oauth flow did not complete: {e}");
                    registry.inner.lock().await.states.insert(id, IntegrationState::Failed);
                }
            }
        });
        Ok(auth_url)
    }

    async fn finish_oauth(&self, id: Uuid, token: OAuthToken) -> Result<(), IntegrationError> {
        let mut integration = self.repo.get(id).await?;
        integration.auth = Some(token);
        integration.updated_at = chrono::Utc::now();
        self.repo.upsert(integration.clone()).await?;
        self.start_tool_server(&integration).await?;
        Ok(())
    }

    async fn start_tool_server(&self, integration: &Integration) -> Result<(), IntegrationError> {
        let tools = service_tools::build_tools(integration);
        let server = Arc::new(IntegrationToolServer::new(integration.id, tools));
        let mut inner = self.inner.lock().await;
        inner.servers.insert(integration.id, server);
        inner.states.insert(integration.id, IntegrationState::Running);
        Ok(())
    }

    async fn stop_tool_server(&self, id: Uuid) {
        let mut inner = self.inner.lock().await;
        inner.states.insert(id, IntegrationState::Stopping);
        inner.servers.remove(&id);
        inner.states.insert(id, IntegrationState::ConfiguredUnauthenticated);
    }

    /// Persists new config then stops and re-starts the tool server (§4.4 `Update`/`Reload`).
    pub async fn update(&self, mut integration: Integration) -> Result<(), IntegrationError> {
        integration.updated_at = chrono::Utc::now();
        self.repo.upsert(integration.clone()).await?;
        self.reload(integration.id).await
    }

    pub async fn reload(&self, id: Uuid) -> Result<(), IntegrationError> {
        self.stop_tool_server(id).await;
        let integration = self.repo.get(id).await?;
        if integration.authenticated() {
            self.start_tool_server(&integration).await?;
        }
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), IntegrationError> {
        self.stop_tool_server(id).await;
        self.inner.lock().await.states.remove(&id);
        self.repo.delete(id).await?;
        Ok(())
    }

    /// Tool server for this integration, if running — used by the run orchestrator when
    /// building the merged allowlist and dispatching `mcp__<id>__*` tool calls (§4.1).
    pub async fn tool_server(&self, id: Uuid) -> Option<Arc<IntegrationToolServer>> {
        self.inner.lock().await.servers.get(&id).cloned()
    }

    /// Every running, authenticated integration — used to build the allowlist's integration
    /// source set (§4.1).
    pub async fn running_servers(&self) -> Vec<Arc<IntegrationToolServer>> {
        self.inner.lock().await.servers.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IntegrationType, OAuthCredentials};
    use crate::repo::schema;
    use std::collections::BTreeMap;

    fn repo() -> IntegrationRepo {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reg.db");
        std::mem::forget(dir);
        let conn = rusqlite::Connection::open(&path).unwrap();
        schema::init(&conn).unwrap();
        IntegrationRepo::new(Arc::new(path))
    }

    fn sample() -> Integration {
        let now = chrono::Utc::now();
        Integration {
            id: Uuid::new_v4(),
            name: "Calendar".into(),
            kind: IntegrationType::Google,
            enabled: true,
            credentials: OAuthCredentials { client_id: "cid".into(), client_secret: "secret".into() },
            auth: None,
            services: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_sets_configured_unauthenticated() {
        let registry = IntegrationRegistry::new(repo());
        let integration = sample();
        registry.create(integration.clone()).await.unwrap();
        assert_eq!(registry.state(integration.id).await, IntegrationState::ConfiguredUnauthenticated);
    }

    #[tokio::test]
    async fn delete_removes_state_and_row() {
        let registry = IntegrationRegistry::new(repo());
        let integration = sample();
        registry.create(integration.clone()).await.unwrap();
        registry.delete(integration.id).await.unwrap();
        assert_eq!(registry.state(integration.id).await, IntegrationState::Absent);
        let err = registry.repo.get(integration.id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn qualified_tool_names_use_mcp_prefix() {
        let id = Uuid::new_v4();
        let server = IntegrationToolServer::new(id, vec![Arc::new(crate::tools::CurrentTimeTool)]);
        let names = server.qualified_tool_names();
        assert_eq!(names, vec![format!("mcp__{id}__current_time")]);
    }
}
