//! Stream demultiplexing (§4.1): turns one raw runtime frame into zero or more homogenized
//! [`RunEvent`]s. An unknown `type` is ignored without terminating the stream (§8 boundary
//! behavior), matching the teacher's tolerant tagged-decode style in `loom::protocol::stream`.

use agento_protocol::{DeltaPayload, MessageBlock, RunEvent, Usage};
use serde_json::Value;

fn parse_block(value: &Value) -> Option<MessageBlock> {
    match value.get("type")?.as_str()? {
        "thinking" => Some(MessageBlock::Thinking { text: value.get("text")?.as_str()?.to_string() }),
        "text" => Some(MessageBlock::Text { text: value.get("text")?.as_str()?.to_string() }),
        "tool_use" => Some(MessageBlock::ToolUse {
            id: value.get("id")?.as_str()?.to_string(),
            name: value.get("name")?.as_str()?.to_string(),
            input: value.get("input").cloned().unwrap_or(Value::Null),
            result: None,
        }),
        _ => None,
    }
}

fn parse_delta(value: &Value) -> Option<DeltaPayload> {
    match value.get("type")?.as_str()? {
        "thinking_delta" => Some(DeltaPayload::Thinking { text: value.get("text")?.as_str()?.to_string() }),
        "text_delta" => Some(DeltaPayload::Text { text: value.get("text")?.as_str()?.to_string() }),
        "input_json_delta" => {
            Some(DeltaPayload::ToolInputJson { partial_json: value.get("partial_json")?.as_str()?.to_string() })
        }
        _ => None,
    }
}

fn parse_usage(value: &Value) -> Usage {
    Usage {
        input_tokens: value.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
        output_tokens: value.get("output_tokens").and_then(Value::as_u64).unwrap_or(0),
        cache_creation_input_tokens: value.get("cache_creation_input_tokens").and_then(Value::as_u64).unwrap_or(0),
        cache_read_input_tokens: value.get("cache_read_input_tokens").and_then(Value::as_u64).unwrap_or(0),
    }
}

/// Demultiplexes one raw frame. Most frame types produce exactly one event; a `user` frame
/// carrying several `tool_result` blocks produces one `ToolResult` per block.
pub fn demux_frame(frame: &Value) -> Vec<RunEvent> {
    let Some(frame_type) = frame.get("type").and_then(Value::as_str) else {
        return Vec::new();
    };
    match frame_type {
        "system" => match frame.get("subtype").and_then(Value::as_str) {
            Some("init") => vec![RunEvent::SystemInit {
                model: frame.get("model").and_then(Value::as_str).unwrap_or_default().to_string(),
                working_directory: frame.get("cwd").and_then(Value::as_str).unwrap_or_default().to_string(),
                tools: frame
                    .get("tools")
                    .and_then(Value::as_array)
                    .map(|a| a.iter().filter_map(|t| t.as_str().map(str::to_string)).collect())
                    .unwrap_or_default(),
                permission_mode: frame.get("permission_mode").and_then(Value::as_str).unwrap_or_default().to_string(),
            }],
            _ => vec![RunEvent::SystemStatus {
                message: frame.get("message").and_then(Value::as_str).unwrap_or_default().to_string(),
            }],
        },
        "stream_event" => {
            let Some(block_index) = frame.get("index").and_then(Value::as_u64) else {
                return Vec::new();
            };
            let Some(delta) = frame.get("delta").and_then(parse_delta) else {
                return Vec::new();
            };
            vec![RunEvent::StreamDelta { block_index: block_index as usize, delta }]
        }
        "assistant" => {
            let blocks = frame
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(parse_block).collect())
                .unwrap_or_default();
            vec![RunEvent::AssistantTurn { blocks }]
        }
        "user" => frame
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_result"))
                    .filter_map(|b| {
                        Some(RunEvent::ToolResult {
                            tool_use_id: b.get("tool_use_id")?.as_str()?.to_string(),
                            result: b.get("content").cloned().unwrap_or(Value::Null),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default(),
        "user_input_required" => {
            vec![RunEvent::UserInputRequired { schema: frame.get("schema").cloned().unwrap_or(Value::Null) }]
        }
        "result" => vec![RunEvent::ResultTerminal {
            subtype: frame.get("subtype").and_then(Value::as_str).unwrap_or_default().to_string(),
            is_error: frame.get("is_error").and_then(Value::as_bool).unwrap_or(false),
            usage: frame.get("usage").map(parse_usage).unwrap_or_default(),
            continuation_token: frame.get("session_id").and_then(Value::as_str).unwrap_or_default().to_string(),
        }],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_is_ignored() {
        let frame = serde_json::json!({"type": "something_new", "foo": "bar"});
        assert!(demux_frame(&frame).is_empty());
    }

    #[test]
    fn system_init_is_first_event_shape() {
        let frame = serde_json::json!({"type": "system", "subtype": "init", "model": "m", "cwd": "/tmp", "tools": ["current_time"], "permission_mode": "default"});
        let events = demux_frame(&frame);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], RunEvent::SystemInit { model, .. } if model == "m"));
    }

    #[test]
    fn assistant_frame_parses_tool_use_block() {
        let frame = serde_json::json!({"type": "assistant", "message": {"content": [
            {"type": "tool_use", "id": "t1", "name": "current_time", "input": {"timezone": "Asia/Tokyo"}}
        ]}});
        let events = demux_frame(&frame);
        match &events[0] {
            RunEvent::AssistantTurn { blocks } => {
                assert_eq!(blocks.len(), 1);
                assert!(matches!(&blocks[0], MessageBlock::ToolUse { name, .. } if name == "current_time"));
            }
            _ => panic!("expected assistant turn"),
        }
    }

    #[test]
    fn user_frame_with_multiple_tool_results_yields_multiple_events() {
        let frame = serde_json::json!({"type": "user", "message": {"content": [
            {"type": "tool_result", "tool_use_id": "t1", "content": {"a": 1}},
            {"type": "tool_result", "tool_use_id": "t2", "content": {"b": 2}}
        ]}});
        let events = demux_frame(&frame);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn result_frame_carries_continuation_token() {
        let frame = serde_json::json!({"type": "result", "subtype": "success", "is_error": false,
            "usage": {"input_tokens": 1, "output_tokens": 2, "cache_creation_input_tokens": 0, "cache_read_input_tokens": 0},
            "session_id": "tok-xyz"});
        let events = demux_frame(&frame);
        match &events[0] {
            RunEvent::ResultTerminal { continuation_token, .. } => assert_eq!(continuation_token, "tok-xyz"),
            _ => panic!("expected terminal"),
        }
    }
}
