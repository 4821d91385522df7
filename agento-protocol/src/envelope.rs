//! Envelope (session_id, run_id, event_id) attached to every emitted [`RunEvent`].
//!
//! `EnvelopeState` is per-run: `session_id` is constant, `event_id` increases
//! monotonically for the life of the run, giving subscribers (SSE clients, tests) a
//! total order over one run's events even though the bus as a whole has no global order.

use crate::event::RunEvent;
use serde_json::Value;

#[derive(Clone, Debug, Default)]
pub struct Envelope {
    pub session_id: Option<String>,
    pub run_id: Option<String>,
    pub event_id: Option<u64>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_run_id(mut self, id: impl Into<String>) -> Self {
        self.run_id = Some(id.into());
        self
    }

    pub fn with_event_id(mut self, id: u64) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Merges envelope fields into a JSON object. Does not overwrite existing keys.
    pub fn inject_into(&self, obj: &mut Value) {
        let Some(obj) = obj.as_object_mut() else {
            return;
        };
        if let Some(ref id) = self.session_id {
            obj.entry("session_id")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(ref id) = self.run_id {
            obj.entry("run_id").or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(id) = self.event_id {
            obj.entry("event_id")
                .or_insert_with(|| Value::Number(serde_json::Number::from(id)));
        }
    }
}

/// Per-run envelope state: assigns a monotonically increasing `event_id` to each event.
pub struct EnvelopeState {
    pub session_id: String,
    pub run_id: String,
    next_event_id: u64,
}

impl EnvelopeState {
    pub fn new(session_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            run_id: run_id.into(),
            next_event_id: 1,
        }
    }

    /// Serializes `event` and injects the envelope, advancing `event_id`.
    pub fn to_json(&mut self, event: &RunEvent) -> Result<Value, serde_json::Error> {
        let mut value = event.to_value()?;
        let env = Envelope::new()
            .with_session_id(&self.session_id)
            .with_run_id(&self.run_id)
            .with_event_id(self.next_event_id);
        self.next_event_id += 1;
        env.inject_into(&mut value);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Usage;

    #[test]
    fn envelope_state_assigns_increasing_event_ids() {
        let mut state = EnvelopeState::new("sess-1", "run-1");
        let ev = RunEvent::SystemStatus {
            message: "listing files".into(),
        };
        let first = state.to_json(&ev).unwrap();
        let second = state.to_json(&ev).unwrap();
        assert_eq!(first["event_id"], 1);
        assert_eq!(second["event_id"], 2);
        assert_eq!(first["session_id"], "sess-1");
        assert_eq!(first["run_id"], "run-1");
    }

    #[test]
    fn envelope_inject_does_not_overwrite() {
        let mut obj = serde_json::json!({"type": "result_terminal", "session_id": "explicit"});
        let env = Envelope::new().with_session_id("sess-1");
        env.inject_into(&mut obj);
        assert_eq!(obj["session_id"], "explicit");
    }

    #[test]
    fn terminal_event_serializes_with_usage() {
        let mut state = EnvelopeState::new("sess-1", "run-1");
        let ev = RunEvent::ResultTerminal {
            subtype: "success".into(),
            is_error: false,
            usage: Usage {
                input_tokens: 1,
                output_tokens: 2,
                cache_creation_input_tokens: 0,
                cache_read_input_tokens: 0,
            },
            continuation_token: "tok".into(),
        };
        let value = state.to_json(&ev).unwrap();
        assert_eq!(value["usage"]["input_tokens"], 1);
        assert_eq!(value["continuation_token"], "tok");
    }
}
