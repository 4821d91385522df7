//! Notification handler (C9, §4.6). Subscribes to the event bus; for each event, late-binds
//! current settings, applies category preference filtering, and delivers over SMTP with a
//! 30-second timeout. Every attempt is logged through `NotificationLogRepo` regardless of
//! outcome.
//!
//! §9 Open Question (unaddressed by spec.md): `SmtpConfig` carries no explicit recipient field.
//! Resolved here by sending to `from_address` itself — the conventional shape for a
//! single-operator personal deployment notifying its own inbox.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use uuid::Uuid;

use crate::events::{BusEvent, EventBus};
use crate::model::{DeliveryStatus, NotificationLogEntry, SmtpConfig};
use crate::repo::notifications::NotificationLogRepo;
use crate::settings::SettingsManager;

/// Maps a dotted event type to the human title used in the subject line (§4.6: "human title
/// derived from event type").
fn human_title(event_type: &str) -> String {
    match event_type {
        "tasks_scheduler.task_execution.finished" => "Scheduled task finished".to_string(),
        "tasks_scheduler.task_execution.failed" => "Scheduled task failed".to_string(),
        other => other.replace('.', " ").replace('_', " "),
    }
}

/// Returns `false` when the event belongs to a category whose preference is explicitly
/// disabled (§4.6).
fn category_enabled(event_type: &str, settings: &crate::model::NotificationSettings) -> bool {
    match event_type {
        "tasks_scheduler.task_execution.finished" => settings.preferences.scheduled_tasks.on_finished_enabled(),
        "tasks_scheduler.task_execution.failed" => settings.preferences.scheduled_tasks.on_failed_enabled(),
        _ => true,
    }
}

pub struct NotificationHandler {
    settings: Arc<SettingsManager>,
    log: NotificationLogRepo,
}

impl NotificationHandler {
    pub fn new(settings: Arc<SettingsManager>, log: NotificationLogRepo) -> Arc<Self> {
        Arc::new(Self { settings, log })
    }

    /// Registers this handler as an event bus subscriber. Call once at startup.
    pub async fn subscribe(self: &Arc<Self>, events: &Arc<EventBus>) {
        let handler = Arc::clone(self);
        events
            .subscribe(Arc::new(move |event: BusEvent| {
                let handler = Arc::clone(&handler);
                async move { handler.handle(event).await }.boxed()
            }))
            .await;
    }

    async fn handle(&self, event: BusEvent) {
        let settings = self.settings.get().await.notifications;
        if !settings.enabled {
            return;
        }
        if !category_enabled(&event.event_type, &settings) {
            return;
        }

        let subject = format!("{}{}", settings.provider.subject_prefix, human_title(&event.event_type));
        let body = render_body(&event);

        let outcome = tokio::time::timeout(Duration::from_secs(30), send(&settings.provider, &subject, &body)).await;
        let (status, error_msg) = match outcome {
            Ok(Ok(())) => (DeliveryStatus::Sent, None),
            Ok(Err(e)) => (DeliveryStatus::Failed, Some(e)),
            Err(_) => (DeliveryStatus::Failed, Some("SMTP delivery timed out after 30s".to_string())),
        };

        if let Err(e) = self
            .log
            .append(NotificationLogEntry {
                id: Uuid::new_v4(),
                event_type: event.event_type.clone(),
                provider: "smtp".to_string(),
                subject,
                status,
                error_msg,
                created_at: chrono::Utc::now(),
            })
            .await
        {
            tracing::error!("failed to append notification log entry: {e}");
        }
    }
}

fn render_body(event: &BusEvent) -> String {
    let mut lines: Vec<String> = event.payload.iter().map(|(k, v)| format!("{k}: {v}")).collect();
    lines.sort();
    lines.join("\n")
}

async fn send(config: &SmtpConfig, subject: &str, body: &str) -> Result<(), String> {
    let mailbox: Mailbox = config.from_address.parse().map_err(|e| format!("invalid from address: {e}"))?;
    let message = Message::builder()
        .from(mailbox.clone())
        .to(mailbox)
        .subject(subject)
        .body(body.to_string())
        .map_err(|e| format!("failed to build message: {e}"))?;

    let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        .map_err(|e| format!("failed to configure SMTP relay: {e}"))?
        .port(config.port);
    if !config.username.is_empty() {
        builder = builder.credentials(Credentials::new(config.username.clone(), config.password.clone()));
    }
    let mailer = builder.build();

    mailer.send(message).await.map(|_| ()).map_err(|e| format!("SMTP send failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NotificationPreferences, NotificationSettings, ScheduledTasksPreferences};

    #[test]
    fn category_enabled_respects_explicit_false() {
        let settings = NotificationSettings {
            enabled: true,
            provider: SmtpConfig::default(),
            preferences: NotificationPreferences {
                scheduled_tasks: ScheduledTasksPreferences { on_finished: Some(false), on_failed: None },
            },
        };
        assert!(!category_enabled("tasks_scheduler.task_execution.finished", &settings));
        assert!(category_enabled("tasks_scheduler.task_execution.failed", &settings));
    }

    #[test]
    fn human_title_maps_known_event_types() {
        assert_eq!(human_title("tasks_scheduler.task_execution.finished"), "Scheduled task finished");
        assert_eq!(human_title("tasks_scheduler.task_execution.failed"), "Scheduled task failed");
    }

    #[test]
    fn render_body_is_deterministically_ordered() {
        let event = BusEvent::new("x").with("b", "2").with("a", "1");
        assert_eq!(render_body(&event), "a: 1\nb: 2");
    }
}
