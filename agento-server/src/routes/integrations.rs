//! Integration CRUD and OAuth start (§3 Integration, §4.4, §6). The OAuth callback itself is
//! served by `agento-core`'s own loopback receiver (`integrations::oauth_flow::PendingFlow`), not
//! by this router — the registry's `start_oauth` spawns that listener directly.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agento_core::model::{Integration, IntegrationType, OAuthCredentials, ServiceConfig};

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/integrations", get(list).post(create))
        .route("/integrations/:id", get(get_one).put(update).delete(remove))
        .route("/integrations/:id/oauth/start", post(start_oauth))
}

async fn list(State(state): State<AppState>) -> Result<Json<Vec<Integration>>, ApiError> {
    Ok(Json(state.repos.integrations.list().await?))
}

async fn get_one(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Integration>, ApiError> {
    Ok(Json(state.repos.integrations.get(id).await?))
}

#[derive(Deserialize)]
struct CreateIntegration {
    name: String,
    #[serde(rename = "type")]
    kind: IntegrationType,
    #[serde(default = "default_true")]
    enabled: bool,
    credentials: OAuthCredentials,
    #[serde(default)]
    services: std::collections::BTreeMap<String, ServiceConfig>,
}

fn default_true() -> bool {
    true
}

async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateIntegration>,
) -> Result<Json<Integration>, ApiError> {
    let now = Utc::now();
    let integration = Integration {
        id: Uuid::new_v4(),
        name: body.name,
        kind: body.kind,
        enabled: body.enabled,
        credentials: body.credentials,
        auth: None,
        services: body.services,
        created_at: now,
        updated_at: now,
    };
    state.integrations.create(integration.clone()).await?;
    Ok(Json(integration))
}

async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut integration): Json<Integration>,
) -> Result<Json<Integration>, ApiError> {
    integration.id = id;
    state.integrations.update(integration.clone()).await?;
    Ok(Json(integration))
}

async fn remove(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<(), ApiError> {
    state.integrations.delete(id).await?;
    Ok(())
}

#[derive(Serialize)]
struct AuthorizeUrl {
    authorize_url: String,
}

async fn start_oauth(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<AuthorizeUrl>, ApiError> {
    let authorize_url = state.integrations.start_oauth(id).await?;
    Ok(Json(AuthorizeUrl { authorize_url }))
}
