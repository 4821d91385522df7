//! One module per entity family, each exposing a `router() -> Router<AppState>` merged by
//! [`crate::router`].

pub mod agents;
pub mod answer;
pub mod chats;
pub mod integrations;
pub mod notifications;
pub mod settings;
pub mod stream;
pub mod tasks;
