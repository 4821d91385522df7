//! Local tool server (C3, §4.1, §4.3 tool plane unification). Exposes built-in tools under a
//! stable prefix; tools registered here are referenced by bare name in allowlists (non-built-in
//! sources get the `mcp__<server>__<tool>` prefix instead, see `crate::run::tools`).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Tool specification exposed to the allowlist and runtime, aligned with an MCP `tools/list`
/// result item (grounded on `graphweave::tool_source::ToolSpec`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid arguments: {0}")]
    InvalidInput(String),
    #[error("upstream request failed: {0}")]
    Upstream(String),
}

#[async_trait]
pub trait LocalTool: Send + Sync {
    fn spec(&self) -> ToolSpec;
    async fn call(&self, input: Value) -> Result<Value, ToolError>;
}

/// Built-in timezone-aware clock tool (§1, §8 seed scenario 1: `current_time` with
/// `input.timezone="Asia/Tokyo"`).
pub struct CurrentTimeTool;

#[async_trait]
impl LocalTool for CurrentTimeTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "current_time".into(),
            description: "Returns the current date and time in a given IANA timezone.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": { "timezone": { "type": "string" } },
                "required": ["timezone"]
            }),
        }
    }

    async fn call(&self, input: Value) -> Result<Value, ToolError> {
        let timezone = input
            .get("timezone")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidInput("missing 'timezone'".to_string()))?;
        let tz: Tz = timezone
            .parse()
            .map_err(|_| ToolError::InvalidInput(format!("unknown timezone '{timezone}'")))?;
        let now = Utc::now().with_timezone(&tz);
        Ok(serde_json::json!({
            "timezone": timezone,
            "iso8601": now.to_rfc3339(),
        }))
    }
}

/// In-process registry of built-in tools. One instance is shared by the whole process; the
/// run orchestrator reads `allowed_names()` to build the capability source set (§4.1).
pub struct LocalToolServer {
    tools: BTreeMap<String, Arc<dyn LocalTool>>,
}

impl Default for LocalToolServer {
    fn default() -> Self {
        let mut server = Self { tools: BTreeMap::new() };
        server.register(Arc::new(CurrentTimeTool));
        server
    }
}

impl LocalToolServer {
    pub fn empty() -> Self {
        Self { tools: BTreeMap::new() }
    }

    pub fn register(&mut self, tool: Arc<dyn LocalTool>) {
        self.tools.insert(tool.spec().name.clone(), tool);
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec()).collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub async fn call(&self, name: &str, input: Value) -> Result<Value, ToolError> {
        let tool = self.tools.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.call(input).await
    }
}
