//! Mid-run interactive-answer injection (§6 "a separate endpoint for injecting interactive
//! answers"). A run's answer sender is registered here while its SSE stream is open and removed
//! once the run reaches its terminal event, so a client can `POST` an answer without the
//! streaming request itself staying open to receive it — following §9's convention of wrapping
//! process-wide mutable state in a small guarded newtype rather than exposing the map directly.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct AnswerRegistry {
    inner: Arc<Mutex<HashMap<Uuid, mpsc::Sender<Value>>>>,
}

impl AnswerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, session_id: Uuid, sender: mpsc::Sender<Value>) {
        self.inner.lock().await.insert(session_id, sender);
    }

    pub async fn unregister(&self, session_id: Uuid) {
        self.inner.lock().await.remove(&session_id);
    }

    /// Returns `None` when no run is currently suspended for this session, either because it
    /// never started or because it already reached a terminal event.
    pub async fn send(&self, session_id: Uuid, payload: Value) -> Option<()> {
        let sender = self.inner.lock().await.get(&session_id).cloned()?;
        sender.send(payload).await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_without_registration_returns_none() {
        let registry = AnswerRegistry::new();
        let result = registry.send(Uuid::new_v4(), serde_json::json!({"ok": true})).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn send_after_register_reaches_receiver() {
        let registry = AnswerRegistry::new();
        let session_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(1);
        registry.register(session_id, tx).await;

        registry.send(session_id, serde_json::json!({"value": 42})).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received["value"], 42);
    }

    #[tokio::test]
    async fn unregister_makes_subsequent_sends_noop() {
        let registry = AnswerRegistry::new();
        let session_id = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(1);
        registry.register(session_id, tx).await;
        registry.unregister(session_id).await;

        let result = registry.send(session_id, serde_json::json!({})).await;
        assert!(result.is_none());
    }
}
