//! Core data model (§3). Repositories are the only code that writes these to the store;
//! `MessageBlock` arrays are in-memory only — reload reconstructs from `content` alone.

use agento_protocol::MessageBlock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// `mapping from source kind -> ordered set of tool names` (§3 Agent.capabilities).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    BuiltIn,
    Local,
    Integration(String),
}

pub type Capabilities = BTreeMap<SourceKind, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingMode {
    Adaptive,
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    Bypass,
    Default,
    Empty,
}

/// Reusable agent configuration (§3). `slug` matches `^[a-z0-9]+(?:-[a-z0-9]+)*$` and is
/// globally unique; enforced by [`crate::repo::agents::validate_slug`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub model: String,
    pub thinking: ThinkingMode,
    pub permission_mode: PermissionMode,
    /// May contain `{{current_date}}`, `{{current_time}}` placeholders.
    pub system_prompt: String,
    pub capabilities: Capabilities,
}

/// A conversation thread (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub title: String,
    /// Empty for direct chat.
    pub agent_slug: String,
    /// Opaque continuation token from the runtime; empty before the first turn.
    pub continuation_token: String,
    pub working_directory: String,
    /// Empty means inherit from agent or default.
    pub model: String,
    pub settings_profile_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cache_creation_tokens: u64,
    pub total_cache_read_tokens: u64,
}

impl ChatSession {
    pub fn accumulate_usage(&mut self, usage: &agento_protocol::Usage) {
        self.total_input_tokens += usage.input_tokens;
        self.total_output_tokens += usage.output_tokens;
        self.total_cache_creation_tokens += usage.cache_creation_input_tokens;
        self.total_cache_read_tokens += usage.cache_read_input_tokens;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// Append-only turn (§3). `blocks` is reconstructed from the runtime during a run and is not
/// itself persisted; `content` is the flattened text that survives reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub session_id: Uuid,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<MessageBlock>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationType {
    Google,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub enabled: bool,
    pub tools: Vec<String>,
}

/// One connection to an external tool provider (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: IntegrationType,
    pub enabled: bool,
    pub credentials: OAuthCredentials,
    /// Empty when unauthenticated.
    pub auth: Option<OAuthToken>,
    pub services: BTreeMap<String, ServiceConfig>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Integration {
    pub fn authenticated(&self) -> bool {
        self.auth.as_ref().is_some_and(|t| !t.access_token.is_empty())
    }
}

/// Schedule variant (§4.3). `interval`'s effective period is the sum of the positive parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schedule_type", rename_all = "snake_case")]
pub enum ScheduleConfig {
    OneOff {
        run_at: DateTime<Utc>,
    },
    Interval {
        #[serde(default)]
        every_minutes: u32,
        #[serde(default)]
        every_hours: u32,
        #[serde(default)]
        every_days: u32,
    },
    Cron {
        expression: String,
    },
}

impl ScheduleConfig {
    /// Sum of the positive interval parts, in minutes. Only meaningful for `Interval`.
    pub fn interval_period_minutes(&self) -> Option<i64> {
        match self {
            ScheduleConfig::Interval {
                every_minutes,
                every_hours,
                every_days,
            } => Some(*every_minutes as i64 + (*every_hours as i64) * 60 + (*every_days as i64) * 1440),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

/// Recurring or one-off prompt (§3/§4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub prompt: String,
    pub agent_slug: String,
    pub working_directory: String,
    pub model: String,
    pub settings_profile_id: String,
    /// Clamped to [1, 240]; default 30.
    pub timeout_minutes: u32,
    pub schedule: ScheduleConfig,
    /// 0 = unbounded.
    pub stop_after_count: u32,
    pub stop_after_time: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub run_count: u32,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_status: Option<RunStatus>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledTask {
    pub fn should_stop(&self, now: DateTime<Utc>) -> bool {
        (self.stop_after_count > 0 && self.run_count >= self.stop_after_count)
            || self.stop_after_time.is_some_and(|t| now >= t)
    }
}

/// One task execution (§3). Rows are never mutated after reaching a terminal status except for
/// retention deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHistory {
    pub id: Uuid,
    pub task_id: Uuid,
    pub task_name: String,
    pub agent_slug: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub chat_session_id: Uuid,
    pub model: String,
    pub prompt_preview: String,
    pub error_message: Option<String>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cache_creation_tokens: u64,
    pub total_cache_read_tokens: u64,
}

/// Tri-state boolean: `None` means "default enabled" (§3 NotificationSettings, §9 design note).
pub type TriBool = Option<bool>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTasksPreferences {
    #[serde(default)]
    pub on_finished: TriBool,
    #[serde(default)]
    pub on_failed: TriBool,
}

impl ScheduledTasksPreferences {
    pub fn on_finished_enabled(&self) -> bool {
        self.on_finished.unwrap_or(true)
    }

    pub fn on_failed_enabled(&self) -> bool {
        self.on_failed.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    #[serde(default)]
    pub scheduled_tasks: ScheduledTasksPreferences,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
    #[serde(default)]
    pub subject_prefix: String,
}

/// Subtree of UserSettings (§3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub provider: SmtpConfig,
    pub preferences: NotificationPreferences,
}

/// Process-wide preferences (§3). Env-locked fields are read-only to `UserSettings::update`;
/// see [`crate::settings`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub default_working_directory: String,
    pub default_model: String,
    pub notifications: NotificationSettings,
    pub onboarding_complete: bool,
    pub theme: String,
    pub event_bus_worker_count: usize,
    /// §9 Open Question decision: job history retention bounds, applied opportunistically by the
    /// scheduler after each tick. `None` means unbounded (the spec's stated default).
    #[serde(default)]
    pub job_history_max_rows: Option<u32>,
    #[serde(default)]
    pub job_history_max_age_days: Option<u32>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            default_working_directory: String::new(),
            default_model: String::new(),
            notifications: NotificationSettings::default(),
            onboarding_complete: false,
            theme: "system".to_string(),
            event_bus_worker_count: 3,
            job_history_max_rows: None,
            job_history_max_age_days: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

/// Append-only delivery attempt (§3). Logged regardless of send outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationLogEntry {
    pub id: Uuid,
    pub event_type: String,
    pub provider: String,
    pub subject: String,
    pub status: DeliveryStatus,
    pub error_msg: Option<String>,
    pub created_at: DateTime<Utc>,
}
