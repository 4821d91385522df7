//! The agent runtime boundary (§1, §6 "Runtime RPC contract"). The actual process — a
//! third-party LLM coding agent speaking a JSON-framed stream — is an external collaborator;
//! this module defines only the trait the run orchestrator calls against, grounded on
//! `loom::llm::LlmClient`'s async_trait shape and its default-to-mock convention
//! (`runner/options.rs::resolve_llm_client`).

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::mcp_registry::McpServerSpec;
use crate::model::{PermissionMode, ThinkingMode};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("runtime transport error: {0}")]
    Transport(String),
    #[error("runtime process exited: {0}")]
    ProcessExited(String),
    #[error("run timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("run was cancelled")]
    Cancelled,
    #[error("a run is already active for this chat")]
    Conflict,
    #[error(transparent)]
    Store(#[from] crate::repo::StoreError),
    #[error("no active run to answer or close")]
    NoActiveRun,
}

/// The options object consumed by the runtime (§6): `session_id` here is the continuation
/// token, not the `ChatSession` id.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub continuation_token: String,
    pub model: String,
    pub thinking_mode: ThinkingMode,
    pub permission_mode: PermissionMode,
    pub allowed_tools: Vec<String>,
    pub mcp_servers: Vec<(String, McpServerSpec)>,
    pub working_directory: String,
    pub settings_file_path: Option<PathBuf>,
}

/// A started run: a channel of raw runtime frames (one of `system`/`assistant`/`stream_event`/
/// `user`/`user_input_required`/`result`, §6) plus a sender for re-injecting interactive
/// answers into the runtime's inbound channel (§4.1 `handle.Answer`).
pub struct RuntimeStream {
    pub frames: mpsc::Receiver<Value>,
    pub answers: mpsc::Sender<Value>,
}

/// Abstraction over the third-party agent runtime (§1 Non-goals: "the third-party agent
/// runtime library and its JSON streaming protocol" is external). `prompt` is passed
/// separately from `options` since it is not part of the reusable RPC options object.
#[async_trait]
pub trait LlmRuntime: Send + Sync {
    async fn start_run(&self, options: RunOptions, prompt: String) -> Result<RuntimeStream, RunError>;
}

/// In-memory mock, the default runtime per §1's "in-memory mock default" — used by tests and
/// by any caller that has not wired a real runtime process. Grounded on `loom::llm::StubLlm`.
///
/// Each call to `start_run` pops the next scripted frame sequence; scripts are consumed in
/// FIFO order so a test can queue distinct responses for successive turns on the same session.
pub struct MockLlmRuntime {
    scripts: tokio::sync::Mutex<std::collections::VecDeque<Vec<Value>>>,
}

impl MockLlmRuntime {
    pub fn new(scripts: Vec<Vec<Value>>) -> Self {
        Self { scripts: tokio::sync::Mutex::new(scripts.into_iter().collect()) }
    }

    /// A single script producing `system.init`, a `current_time` tool_use/tool_result pair, a
    /// final assistant turn, and a `result.terminal` — the shape of §8 seed scenario 1.
    pub fn single_turn_with_tool_use(continuation_token: &str) -> Self {
        Self::new(vec![vec![
            serde_json::json!({"type": "system", "subtype": "init", "model": "mock-model", "cwd": "/tmp", "tools": [], "permission_mode": "default"}),
            serde_json::json!({"type": "assistant", "message": {"content": [
                {"type": "tool_use", "id": "tu-1", "name": "current_time", "input": {"timezone": "Asia/Tokyo"}}
            ]}}),
            serde_json::json!({"type": "user", "message": {"content": [
                {"type": "tool_result", "tool_use_id": "tu-1", "content": {"iso8601": "2026-07-26T09:00:00+09:00"}}
            ]}}),
            serde_json::json!({"type": "assistant", "message": {"content": [
                {"type": "text", "text": "It's 9am in Tokyo."}
            ]}}),
            serde_json::json!({"type": "result", "subtype": "success", "is_error": false,
                "usage": {"input_tokens": 10, "output_tokens": 5, "cache_creation_input_tokens": 0, "cache_read_input_tokens": 0},
                "session_id": continuation_token}),
        ]])
    }
}

#[async_trait]
impl LlmRuntime for MockLlmRuntime {
    async fn start_run(&self, _options: RunOptions, _prompt: String) -> Result<RuntimeStream, RunError> {
        let script = self
            .scripts
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| RunError::Transport("mock runtime has no scripted response queued".to_string()))?;
        let (frame_tx, frame_rx) = mpsc::channel(32);
        let (answer_tx, mut answer_rx) = mpsc::channel(8);
        tokio::spawn(async move {
            for frame in script {
                if frame_tx.send(frame).await.is_err() {
                    return;
                }
            }
            // Drain any late answers so the sender side never blocks on a dropped receiver.
            while answer_rx.recv().await.is_some() {}
        });
        Ok(RuntimeStream { frames: frame_rx, answers: answer_tx })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_runtime_streams_scripted_frames_in_order() {
        let runtime = MockLlmRuntime::single_turn_with_tool_use("tok-1");
        let options = RunOptions {
            continuation_token: String::new(),
            model: "mock-model".into(),
            thinking_mode: ThinkingMode::Adaptive,
            permission_mode: PermissionMode::Default,
            allowed_tools: vec!["current_time".into()],
            mcp_servers: vec![],
            working_directory: "/tmp".into(),
            settings_file_path: None,
        };
        let mut stream = runtime.start_run(options, "what time is it in Tokyo?".into()).await.unwrap();
        let first = stream.frames.recv().await.unwrap();
        assert_eq!(first["type"], "system");
        let mut last = None;
        while let Some(frame) = stream.frames.recv().await {
            last = Some(frame);
        }
        assert_eq!(last.unwrap()["session_id"], "tok-1");
    }

    #[tokio::test]
    async fn mock_runtime_with_no_scripts_errors() {
        let runtime = MockLlmRuntime::new(vec![]);
        let options = RunOptions {
            continuation_token: String::new(),
            model: "m".into(),
            thinking_mode: ThinkingMode::Adaptive,
            permission_mode: PermissionMode::Default,
            allowed_tools: vec![],
            mcp_servers: vec![],
            working_directory: "/tmp".into(),
            settings_file_path: None,
        };
        let err = runtime.start_run(options, "hi".into()).await.unwrap_err();
        assert!(matches!(err, RunError::Transport(_)));
    }
}
