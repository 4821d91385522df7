//! Shared application state (§6 HTTP surface), grounded on the teacher's `serve::app::AppState`
//! — a small `Clone` handle bundle passed to every handler via axum's `State` extractor.

use std::sync::Arc;

use agento_core::{ChatService, EventBus, IntegrationRegistry, Repositories, Scheduler, SettingsManager};

use crate::answers::AnswerRegistry;

#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub chat: Arc<ChatService>,
    pub integrations: Arc<IntegrationRegistry>,
    pub settings: Arc<SettingsManager>,
    pub events: Arc<EventBus>,
    pub scheduler: Arc<Scheduler>,
    pub answers: AnswerRegistry,
}
