//! Scheduled task CRUD, pause/resume, and job history listing (§3, §4.3, §6).

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use agento_core::model::{JobHistory, ScheduledTask, TaskStatus};
use agento_core::scheduler::next_fire;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list).post(create))
        .route("/tasks/:id", get(get_one).put(update).delete(remove))
        .route("/tasks/:id/pause", post(pause))
        .route("/tasks/:id/resume", post(resume))
        .route("/tasks/:id/history", get(history))
}

async fn list(State(state): State<AppState>) -> Result<Json<Vec<ScheduledTask>>, ApiError> {
    Ok(Json(state.repos.tasks.list().await?))
}

async fn get_one(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ScheduledTask>, ApiError> {
    Ok(Json(state.repos.tasks.get(id).await?))
}

#[derive(Deserialize)]
struct CreateTask {
    name: String,
    #[serde(default)]
    description: String,
    prompt: String,
    #[serde(default)]
    agent_slug: String,
    #[serde(default)]
    working_directory: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    settings_profile_id: String,
    #[serde(default = "default_timeout_minutes")]
    timeout_minutes: u32,
    schedule: agento_core::model::ScheduleConfig,
    #[serde(default)]
    stop_after_count: u32,
    #[serde(default)]
    stop_after_time: Option<chrono::DateTime<Utc>>,
}

fn default_timeout_minutes() -> u32 {
    30
}

async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateTask>,
) -> Result<Json<ScheduledTask>, ApiError> {
    let now = Utc::now();
    let timeout_minutes = body.timeout_minutes.clamp(1, 240);
    let next_run_at = next_fire(&body.schedule, now)
        .map_err(|e| ApiError::Validation(format!("invalid schedule: {e}")))?;
    let task = ScheduledTask {
        id: Uuid::new_v4(),
        name: body.name,
        description: body.description,
        prompt: body.prompt,
        agent_slug: body.agent_slug,
        working_directory: body.working_directory,
        model: body.model,
        settings_profile_id: body.settings_profile_id,
        timeout_minutes,
        schedule: body.schedule,
        stop_after_count: body.stop_after_count,
        stop_after_time: body.stop_after_time,
        status: TaskStatus::Active,
        run_count: 0,
        last_run_at: None,
        last_run_status: None,
        next_run_at,
        created_at: now,
        updated_at: now,
    };
    state.repos.tasks.create(task.clone()).await?;
    state.scheduler.notify_mutation();
    Ok(Json(task))
}

async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut task): Json<ScheduledTask>,
) -> Result<Json<ScheduledTask>, ApiError> {
    task.id = id;
    task.updated_at = Utc::now();
    state.repos.tasks.update(task.clone()).await?;
    state.scheduler.notify_mutation();
    Ok(Json(task))
}

async fn remove(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<(), ApiError> {
    state.repos.tasks.delete(id).await?;
    state.scheduler.notify_mutation();
    Ok(())
}

async fn pause(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ScheduledTask>, ApiError> {
    let mut task = state.repos.tasks.get(id).await?;
    task.status = TaskStatus::Paused;
    task.updated_at = Utc::now();
    state.repos.tasks.update(task.clone()).await?;
    state.scheduler.notify_mutation();
    Ok(Json(task))
}

async fn resume(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ScheduledTask>, ApiError> {
    let mut task = state.repos.tasks.get(id).await?;
    let now = Utc::now();
    let next_run_at = next_fire(&task.schedule, now).map_err(|e| ApiError::Validation(e.to_string()))?;
    let Some(next_run_at) = next_run_at else {
        return Err(ApiError::Validation(
            "cannot resume a one-off task whose run_at has already passed".to_string(),
        ));
    };
    task.status = TaskStatus::Active;
    task.run_count = 0;
    task.last_run_at = None;
    task.last_run_status = None;
    task.next_run_at = Some(next_run_at);
    task.updated_at = now;
    state.repos.tasks.update(task.clone()).await?;
    state.scheduler.notify_mutation();
    Ok(Json(task))
}

async fn history(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Vec<JobHistory>>, ApiError> {
    Ok(Json(state.repos.job_history.list_for_task(id).await?))
}
