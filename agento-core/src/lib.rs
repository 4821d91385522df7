//! Core orchestration for Agento: persistence, settings, integrations, tool dispatch, and the
//! run pipeline that drives the external agent runtime.
//!
//! ## Main modules
//!
//! - [`model`]: domain types — [`model::Agent`], [`model::ChatSession`], [`model::ScheduledTask`],
//!   [`model::UserSettings`], and friends.
//! - [`repo`]: SQLite-backed repositories ([`repo::Repositories`]), one per entity family.
//! - [`settings`]: [`settings::SettingsManager`] — load-once, write-through, env-lock aware.
//! - [`tools`]: built-in local tools ([`tools::LocalToolServer`]).
//! - [`integrations`]: OAuth-backed third-party integrations ([`integrations::IntegrationRegistry`]).
//! - [`mcp_registry`]: `mcps.yaml` loading ([`mcp_registry::McpServerSpec`]).
//! - [`events`]: the in-process event bus ([`events::EventBus`], [`events::BusEvent`]).
//! - [`runtime`]: the external LLM runtime boundary ([`runtime::LlmRuntime`], [`runtime::MockLlmRuntime`]).
//! - [`run`]: the run orchestrator ([`run::RunOrchestrator`], [`run::RunHandle`]).
//! - [`chat`]: the chat service ([`chat::ChatService`]) — session lifecycle atop the run orchestrator.
//! - [`scheduler`]: the task scheduler ([`scheduler::Scheduler`]).
//! - [`notifications`]: the notification handler ([`notifications::NotificationHandler`]).

pub mod chat;
pub mod events;
pub mod integrations;
pub mod mcp_registry;
pub mod model;
pub mod notifications;
pub mod repo;
pub mod run;
pub mod runtime;
pub mod scheduler;
pub mod settings;
pub mod tools;

pub use chat::{ChatError, ChatRunHandle, ChatService};
pub use events::{BusEvent, EventBus};
pub use integrations::{IntegrationError, IntegrationRegistry};
pub use notifications::NotificationHandler;
pub use repo::{Repositories, StoreError};
pub use run::{EffectiveAgent, RunHandle, RunOrchestrator};
pub use runtime::{LlmRuntime, MockLlmRuntime, RunError, RunOptions, RuntimeStream};
pub use scheduler::Scheduler;
pub use settings::{SettingsError, SettingsManager};
