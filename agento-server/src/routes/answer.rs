//! Interactive-answer injection (§4.1 `UserInputRequired`, §6 "a separate endpoint for injecting
//! interactive answers"): `POST /chats/:id/answer` re-injects a payload into whichever run is
//! currently suspended for that session, independent of the SSE request that started it.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/chats/:id/answer", post(answer))
}

async fn answer(State(state): State<AppState>, Path(id): Path<Uuid>, Json(payload): Json<Value>) -> Result<(), ApiError> {
    state
        .answers
        .send(id, payload)
        .await
        .ok_or_else(|| ApiError::Validation(format!("no run is currently awaiting input for chat '{id}'")))?;
    Ok(())
}
