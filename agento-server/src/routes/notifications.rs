//! Notification delivery log listing (§3 NotificationLogEntry, §4.6, §6).

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use agento_core::model::NotificationLogEntry;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/notifications/log", get(list))
}

async fn list(State(state): State<AppState>) -> Result<Json<Vec<NotificationLogEntry>>, ApiError> {
    Ok(Json(state.repos.notifications.list().await?))
}
