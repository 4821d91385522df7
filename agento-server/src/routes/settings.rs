//! Process-wide settings (§3 UserSettings, §4.7, §6).

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use agento_core::model::UserSettings;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/settings", get(get_settings).put(update))
}

async fn get_settings(State(state): State<AppState>) -> Json<UserSettings> {
    Json(state.settings.get().await)
}

async fn update(State(state): State<AppState>, Json(settings): Json<UserSettings>) -> Result<Json<UserSettings>, ApiError> {
    let updated = state.settings.update(settings).await.map_err(settings_error_to_api)?;
    Ok(Json(updated))
}

fn settings_error_to_api(e: agento_core::SettingsError) -> ApiError {
    match e {
        agento_core::SettingsError::Locked { .. } => ApiError::Validation(e.to_string()),
        agento_core::SettingsError::Store(s) => s.into(),
    }
}
