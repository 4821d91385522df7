//! Maps internal errors onto the kind taxonomy of spec §7 (Validation, NotFound, Conflict,
//! Transient, Fatal) and renders them as `{error, kind}` JSON bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use agento_core::repo::StoreError;
use agento_core::{ChatError, IntegrationError, RunError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Transient(String),
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Transient(_) => "transient",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string(), "kind": self.kind() }));
        (self.status(), body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => ApiError::NotFound(msg),
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::Validation(msg) => ApiError::Validation(msg),
            StoreError::Storage(_) | StoreError::Serde(_) => ApiError::Transient(e.to_string()),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::Store(s) => s.into(),
            ChatError::Run(r) => r.into(),
            ChatError::Conflict => ApiError::Conflict(e.to_string()),
            ChatError::UnknownAgent(_) => ApiError::Validation(e.to_string()),
        }
    }
}

impl From<RunError> for ApiError {
    fn from(e: RunError) -> Self {
        match e {
            RunError::Conflict => ApiError::Conflict(e.to_string()),
            RunError::Store(s) => s.into(),
            RunError::Transport(_) | RunError::ProcessExited(_) | RunError::Timeout(_) => {
                ApiError::Transient(e.to_string())
            }
            RunError::Cancelled | RunError::NoActiveRun => ApiError::Validation(e.to_string()),
        }
    }
}

impl From<IntegrationError> for ApiError {
    fn from(e: IntegrationError) -> Self {
        ApiError::Transient(e.to_string())
    }
}
