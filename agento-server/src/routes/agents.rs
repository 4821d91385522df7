//! Agent CRUD (§3 Agent, §6 HTTP surface).

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use agento_core::model::Agent;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/agents", get(list).post(create))
        .route("/agents/:slug", get(get_one).put(update).delete(remove))
}

async fn list(State(state): State<AppState>) -> Result<Json<Vec<Agent>>, ApiError> {
    Ok(Json(state.repos.agents.list().await?))
}

async fn get_one(State(state): State<AppState>, Path(slug): Path<String>) -> Result<Json<Agent>, ApiError> {
    Ok(Json(state.repos.agents.get(&slug).await?))
}

async fn create(State(state): State<AppState>, Json(agent): Json<Agent>) -> Result<Json<Agent>, ApiError> {
    state.repos.agents.create(agent.clone()).await?;
    Ok(Json(agent))
}

#[derive(Deserialize)]
struct UpdateAgent {
    #[serde(flatten)]
    agent: Agent,
}

async fn update(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(body): Json<UpdateAgent>,
) -> Result<Json<Agent>, ApiError> {
    let mut agent = body.agent;
    agent.slug = slug;
    state.repos.agents.upsert(agent.clone()).await?;
    Ok(Json(agent))
}

/// §3 Agent deletion invariant: referencing chats fall back to direct-chat semantics.
async fn remove(State(state): State<AppState>, Path(slug): Path<String>) -> Result<(), ApiError> {
    state.repos.agents.delete(&slug).await?;
    state.repos.chats.clear_agent_references(&slug).await?;
    Ok(())
}
