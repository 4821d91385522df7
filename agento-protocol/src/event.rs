//! Demultiplexed run event kinds (§4.1 of the run orchestrator contract).
//!
//! State-carrying variants that mirror runtime payloads use `serde_json::Value` for the
//! parts the orchestrator passes through verbatim (tool input/result); everything the
//! orchestrator itself constructs is typed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token usage reported by the terminal event of a run. All four counters are additive
/// across the lifetime of a session (see `ChatSession` in `agento-core`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cache_read_input_tokens: u64,
}

/// One ordered fragment within an assistant turn.
///
/// Block order preserves arrival order from the runtime so that a reloaded
/// conversation renders identically to the live stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBlock {
    Thinking { text: String },
    Text { text: String },
    ToolUse {
        id: String,
        name: String,
        input: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
}

impl MessageBlock {
    /// Returns the flattened text contribution of this block (empty for tool_use).
    pub fn text_contribution(&self) -> &str {
        match self {
            MessageBlock::Thinking { .. } => "",
            MessageBlock::Text { text } => text,
            MessageBlock::ToolUse { .. } => "",
        }
    }

    /// Attaches a tool result to a `tool_use` block matching `tool_use_id`. No-op otherwise.
    pub fn attach_result(&mut self, tool_use_id: &str, value: Value) {
        if let MessageBlock::ToolUse { id, result, .. } = self {
            if id == tool_use_id {
                *result = Some(value);
            }
        }
    }
}

/// Incremental delta carried by a `stream.delta` event. The orchestrator buffers these
/// by block index and concatenates them in arrival order to build the final block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeltaPayload {
    Thinking { text: String },
    Text { text: String },
    ToolInputJson { partial_json: String },
}

/// A homogenized run event, produced by demultiplexing the runtime's raw JSON stream.
/// Exactly one `result_terminal` event ends a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// First event of every run.
    SystemInit {
        model: String,
        working_directory: String,
        tools: Vec<String>,
        permission_mode: String,
    },
    /// Advisory tool-execution progress string; not ordered w.r.t. deltas.
    SystemStatus { message: String },
    /// Incremental content; implementer must buffer by block index.
    StreamDelta { block_index: usize, delta: DeltaPayload },
    /// Emitted when the model ends a turn within the run.
    AssistantTurn { blocks: Vec<MessageBlock> },
    /// Attached to the matching `tool_use` block by `tool_use_id`.
    ToolResult { tool_use_id: String, result: Value },
    /// Run is suspended; the caller must answer via `RunHandle::answer`.
    UserInputRequired { schema: Value },
    /// Exactly one per run.
    ResultTerminal {
        subtype: String,
        is_error: bool,
        usage: Usage,
        continuation_token: String,
    },
}

impl RunEvent {
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::ResultTerminal { .. })
    }
}
