//! Chat session CRUD and history (§3 ChatSession/ChatMessage, §6 HTTP surface).

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agento_core::model::{ChatMessage, ChatSession};

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chats", get(list).post(create))
        .route("/chats/:id", get(get_one).put(update).delete(remove))
        .route("/chats/:id/history", get(history))
}

async fn list(State(state): State<AppState>) -> Result<Json<Vec<ChatSession>>, ApiError> {
    Ok(Json(state.chat.list_sessions().await?))
}

async fn get_one(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ChatSession>, ApiError> {
    Ok(Json(state.chat.get_session(id).await?))
}

#[derive(Serialize)]
struct SessionWithHistory {
    session: ChatSession,
    messages: Vec<ChatMessage>,
}

async fn history(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<SessionWithHistory>, ApiError> {
    let (session, messages) = state.chat.get_session_with_history(id).await?;
    Ok(Json(SessionWithHistory { session, messages }))
}

#[derive(Deserialize)]
struct CreateSession {
    #[serde(default)]
    agent_slug: Option<String>,
    #[serde(default)]
    working_directory: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    settings_profile_id: Option<String>,
}

async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateSession>,
) -> Result<Json<ChatSession>, ApiError> {
    let session = state
        .chat
        .create_session(body.agent_slug, body.working_directory, body.model, body.settings_profile_id)
        .await?;
    Ok(Json(session))
}

async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut session): Json<ChatSession>,
) -> Result<Json<ChatSession>, ApiError> {
    session.id = id;
    state.chat.update_session(session.clone()).await?;
    Ok(Json(session))
}

async fn remove(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<(), ApiError> {
    state.chat.delete_session(id).await?;
    state.answers.unregister(id).await;
    Ok(())
}
