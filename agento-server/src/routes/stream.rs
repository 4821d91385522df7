//! Streamed runs (§4.1, §6): `POST /chats/:id/messages` drives one turn through the chat
//! service and forwards each demultiplexed [`agento_protocol::RunEvent`] to the client as
//! Server-Sent Events, while a background task mirrors `RunOrchestrator::drive_to_completion`'s
//! capture-then-commit bookkeeping without itself owning the client connection — grounded on
//! the teacher's `serve::run::handle_run` spawn-task-plus-channel dispatch, adapted from
//! websocket frames to an axum `Sse` stream.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use agento_core::run::capture::TurnCapture;
use agento_protocol::{EnvelopeState, RunEvent};

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/chats/:id/messages", post(stream_message))
}

#[derive(Deserialize)]
struct SendMessage {
    prompt: String,
}

async fn stream_message(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(body): Json<SendMessage>,
) -> Result<Sse<impl futures::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let (mut session, mut chat_run_handle) = state.chat.begin_message(session_id, body.prompt).await?;

    state.answers.register(session_id, chat_run_handle.handle.answer_sender()).await;

    let (tx, rx) = tokio::sync::mpsc::channel::<serde_json::Value>(64);
    let orchestrator = Arc::clone(state.chat.orchestrator());
    let answers = state.answers.clone();

    tokio::spawn(async move {
        let run_id = Uuid::new_v4().to_string();
        let mut envelope = EnvelopeState::new(session_id.to_string(), run_id);
        let mut capture = TurnCapture::new();
        let mut terminal_event = None;

        while let Some(event) = chat_run_handle.handle.events.recv().await {
            capture.on_event(&event);
            let is_terminal = event.is_terminal();
            match envelope.to_json(&event) {
                Ok(value) => {
                    if tx.send(value).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!("failed to serialize run event: {e}"),
            }
            if is_terminal {
                terminal_event = Some(event);
                break;
            }
        }

        match terminal_event {
            Some(RunEvent::ResultTerminal { usage, continuation_token, .. }) => {
                if let Err(e) = orchestrator
                    .commit_run(&mut session, capture.into_blocks(), capture.text_aggregate(), usage, continuation_token)
                    .await
                {
                    tracing::error!(session_id = %session_id, "failed to commit run: {e}");
                }
            }
            _ => tracing::warn!(session_id = %session_id, "run stream ended without a terminal event"),
        }

        answers.unregister(session_id).await;
        // `chat_run_handle` drops here, releasing the per-session lock guard.
    });

    let stream = ReceiverStream::new(rx).map(|value| {
        let data = serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().data(data))
    });

    Ok(Sse::new(stream))
}
