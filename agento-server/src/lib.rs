//! HTTP + SSE boundary for Agento (§6): JSON CRUD over every entity of §3, Server-Sent Events
//! for streamed runs, and a companion endpoint for injecting mid-run interactive answers. The
//! OAuth redirect callback is served by `agento-core`'s own loopback receiver, not by this
//! router.
//!
//! **Public API**: [`router`], [`run_serve`], [`run_serve_on_listener`] — grounded on the
//! teacher's `serve::lib.rs` shape (`run_serve`/`run_serve_on_listener` bind-then-serve pair),
//! adapted from a websocket upgrade handler to a plain JSON+SSE `Router`.

pub mod answers;
pub mod error;
mod routes;
pub mod state;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

pub use answers::AnswerRegistry;
pub use error::ApiError;
pub use state::AppState;

const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:8080";

/// Builds the full router: every entity's CRUD routes merged under `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::agents::router())
        .merge(routes::chats::router())
        .merge(routes::stream::router())
        .merge(routes::answer::router())
        .merge(routes::tasks::router())
        .merge(routes::integrations::router())
        .merge(routes::settings::router())
        .merge(routes::notifications::router())
        .with_state(state)
}

/// Serves on an existing listener, exiting gracefully when `shutdown` reports `true` (§5's
/// shared root lifecycle signal — see `agento-cli`'s `web` command for the `ctrl_c` wiring).
pub async fn run_serve_on_listener(
    listener: TcpListener,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    info!("HTTP server listening on http://{addr}");
    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
}

/// Binds `addr` (default `127.0.0.1:8080`) and serves until `shutdown` reports `true`.
pub async fn run_serve(
    addr: Option<&str>,
    state: AppState,
    shutdown: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let addr = addr.unwrap_or(DEFAULT_HTTP_ADDR);
    let listener = TcpListener::bind(addr).await?;
    run_serve_on_listener(listener, state, shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use agento_core::{ChatService, EventBus, IntegrationRegistry, MockLlmRuntime, Repositories, RunOrchestrator, Scheduler, SettingsManager};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    async fn test_state() -> AppState {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server-test.db");
        std::mem::forget(dir);
        let repos = Repositories::open(&path).unwrap();
        let events = EventBus::default_bus();
        let integrations = IntegrationRegistry::new(repos.integrations.clone());
        let settings = Arc::new(SettingsManager::load(repos.settings.clone()).await.unwrap());
        let orchestrator = RunOrchestrator::new(
            repos.clone(),
            Arc::new(agento_core::tools::LocalToolServer::default()),
            Arc::new(BTreeMap::new()),
            Arc::clone(&integrations),
            Arc::new(MockLlmRuntime::single_turn_with_tool_use("tok-1")),
            Arc::clone(&events),
        );
        let chat = ChatService::new(repos.clone(), Arc::clone(&orchestrator), Arc::clone(&settings));
        let scheduler = Scheduler::new(repos.clone(), orchestrator, Arc::clone(&settings), Arc::clone(&events), 4);
        AppState {
            repos,
            chat,
            integrations,
            settings,
            events,
            scheduler,
            answers: AnswerRegistry::new(),
        }
    }

    /// Mirrors the teacher's `serve/tests/e2e` convention: bind a real ephemeral listener, spawn
    /// `run_serve_on_listener`, and exercise it with a real HTTP client rather than `oneshot`.
    #[tokio::test]
    async fn server_e2e_smoke_agent_list() {
        let state = test_state().await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (_tx, rx) = watch::channel(false);
        let server_handle = tokio::spawn(run_serve_on_listener(listener, state, rx));

        let response = reqwest::get(format!("http://{addr}/agents")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Vec<serde_json::Value> = response.json().await.unwrap();
        assert!(body.is_empty());

        server_handle.abort();
    }

    #[tokio::test]
    async fn server_e2e_create_and_fetch_agent() {
        let state = test_state().await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (_tx, rx) = watch::channel(false);
        let server_handle = tokio::spawn(run_serve_on_listener(listener, state, rx));

        let client = reqwest::Client::new();
        let create_body = serde_json::json!({
            "slug": "writer",
            "name": "Writer",
            "description": "Drafts prose.",
            "model": "claude-3-sonnet",
            "thinking": "adaptive",
            "permission_mode": "default",
            "system_prompt": "You write things.",
            "capabilities": {},
        });
        let response = client
            .post(format!("http://{addr}/agents"))
            .json(&create_body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let response = reqwest::get(format!("http://{addr}/agents/writer")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let agent: serde_json::Value = response.json().await.unwrap();
        assert_eq!(agent["slug"], "writer");

        server_handle.abort();
    }
}
