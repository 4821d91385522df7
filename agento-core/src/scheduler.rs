//! Task scheduler (C8, §4.3). Fires each active task exactly once per occurrence, drives it
//! through the run orchestrator, records the outcome, and enforces stop rules.
//!
//! The tick loop holds a `BinaryHeap` of `Reverse<(next_run_at, task_id)>` and sleeps until the
//! earliest key, waking early on task mutations via a `tokio::sync::Notify` — adapted from the
//! teacher's owned-channel wakeup idiom (`channels/updater.rs`) to this bus's non-blocking
//! semantics. Concurrent executions are bounded by a `tokio::sync::Semaphore`.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use croner::Cron;
use uuid::Uuid;

use crate::events::{BusEvent, EventBus};
use crate::model::{ChatSession, JobHistory, RunStatus, ScheduleConfig, ScheduledTask, TaskStatus};
use crate::repo::Repositories;
use crate::run::RunOrchestrator;
use crate::settings::SettingsManager;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid cron expression '{0}': {1}")]
    InvalidCron(String, String),
    #[error("interval schedule has no positive period")]
    EmptyInterval,
}

/// Computes the next fire instant strictly after `after` (§4.3). `one_off` fires once, at or
/// after `run_at`; callers treat a past `next_run_at` as immediately due via `list_due`.
pub fn next_fire(schedule: &ScheduleConfig, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, SchedulerError> {
    match schedule {
        ScheduleConfig::OneOff { run_at } => Ok(if *run_at <= after { None } else { Some(*run_at) }),
        ScheduleConfig::Interval { .. } => {
            let minutes = schedule.interval_period_minutes().ok_or(SchedulerError::EmptyInterval)?;
            if minutes <= 0 {
                return Err(SchedulerError::EmptyInterval);
            }
            Ok(Some(after + chrono::Duration::minutes(minutes)))
        }
        ScheduleConfig::Cron { expression } => {
            let cron =
                Cron::parse(expression).map_err(|e| SchedulerError::InvalidCron(expression.clone(), e.to_string()))?;
            let next = cron
                .find_next_occurrence(&after, false)
                .map_err(|e| SchedulerError::InvalidCron(expression.clone(), e.to_string()))?;
            Ok(Some(next))
        }
    }
}

fn prompt_preview(prompt: &str) -> String {
    let trimmed = prompt.trim();
    if trimmed.chars().count() <= 120 {
        trimmed.to_string()
    } else {
        trimmed.chars().take(120).collect()
    }
}

/// Held from the moment a task's occurrence is claimed until its worker reaches a terminal
/// status (or its timeout fires), enforcing §4.3's within-one-task no-overlap guarantee. Dropping
/// it (including on an early `return` from `dispatch`) releases the task for its next tick.
struct InFlightGuard {
    in_flight: Arc<StdMutex<HashSet<Uuid>>>,
    task_id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().unwrap().remove(&self.task_id);
    }
}

pub struct Scheduler {
    repos: Repositories,
    orchestrator: Arc<RunOrchestrator>,
    settings: Arc<SettingsManager>,
    events: Arc<EventBus>,
    notify: Arc<tokio::sync::Notify>,
    semaphore: Arc<tokio::sync::Semaphore>,
    in_flight: Arc<StdMutex<HashSet<Uuid>>>,
}

impl Scheduler {
    pub fn new(
        repos: Repositories,
        orchestrator: Arc<RunOrchestrator>,
        settings: Arc<SettingsManager>,
        events: Arc<EventBus>,
        max_concurrency: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            repos,
            orchestrator,
            settings,
            events,
            notify: Arc::new(tokio::sync::Notify::new()),
            semaphore: Arc::new(tokio::sync::Semaphore::new(max_concurrency)),
            in_flight: Arc::new(StdMutex::new(HashSet::new())),
        })
    }

    /// Wakes the tick loop early; call after creating, updating, deleting, or resuming a task.
    pub fn notify_mutation(&self) {
        self.notify.notify_one();
    }

    async fn build_heap(&self) -> BinaryHeap<Reverse<(DateTime<Utc>, Uuid)>> {
        let tasks = self.repos.tasks.list().await.unwrap_or_default();
        tasks
            .into_iter()
            .filter(|t| t.status == TaskStatus::Active)
            .filter_map(|t| t.next_run_at.map(|n| Reverse((n, t.id))))
            .collect()
    }

    /// Runs until `shutdown` reports `true`. Grounded on the teacher's root lifecycle shape
    /// (`tokio::sync::watch::Receiver<bool>`, §9 design note).
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }
            let heap = self.build_heap().await;
            let sleep_for = match heap.peek() {
                Some(Reverse((next, _))) => (*next - Utc::now()).to_std().unwrap_or(StdDuration::ZERO),
                None => StdDuration::from_secs(300),
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = self.notify.notified() => { continue; }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() { return; }
                }
            }

            let now = Utc::now();
            let due = self.repos.tasks.list_due(now).await.unwrap_or_default();
            for task in due {
                self.dispatch(task, now).await;
            }
            self.prune_job_history().await;
        }
    }

    /// Opportunistic retention pass (§9 Open Question decision): applies the settings-sourced
    /// bounds, both unbounded by default.
    async fn prune_job_history(&self) {
        let settings = self.settings.get().await;
        let max_age = settings.job_history_max_age_days.map(|days| chrono::Duration::days(days as i64));
        if settings.job_history_max_rows.is_none() && max_age.is_none() {
            return;
        }
        if let Err(e) = self.repos.job_history.prune(settings.job_history_max_rows, max_age).await {
            tracing::warn!("job history prune failed: {e}");
        }
    }

    /// Atomically claims the occurrence (step 1 of §4.3's tick loop), then hands the actual
    /// execution to a bounded-concurrency worker task. Skips tasks with a run still in flight
    /// (§4.3 "within one task, runs never overlap").
    async fn dispatch(&self, task: ScheduledTask, now: DateTime<Utc>) {
        let Some(expected) = task.next_run_at else { return };
        if !self.in_flight.lock().unwrap().insert(task.id) {
            return;
        }
        let guard = InFlightGuard { in_flight: Arc::clone(&self.in_flight), task_id: task.id };

        let new_next = match next_fire(&task.schedule, expected) {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(task_id = %task.id, "failed to compute next occurrence: {e}");
                None
            }
        };
        let claimed = match self.repos.tasks.claim_fire(task.id, expected, new_next).await {
            Ok(Some(t)) => t,
            Ok(None) => return, // lost the race (concurrent tick); already advanced elsewhere
            Err(e) => {
                tracing::error!(task_id = %task.id, "claim_fire failed: {e}");
                return;
            }
        };

        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(p) => p,
            Err(_) => return, // semaphore closed during shutdown
        };
        let repos = self.repos.clone();
        let orchestrator = Arc::clone(&self.orchestrator);
        let settings = Arc::clone(&self.settings);
        let events = Arc::clone(&self.events);
        tokio::spawn(async move {
            let _permit = permit;
            let _guard = guard;
            execute(repos, orchestrator, settings, events, claimed, now).await;
        });
    }
}

/// Worker body for one task occurrence (§4.3 steps 2-6).
async fn execute(
    repos: Repositories,
    orchestrator: Arc<RunOrchestrator>,
    settings: Arc<SettingsManager>,
    events: Arc<EventBus>,
    task: ScheduledTask,
    started_at: DateTime<Utc>,
) {
    let session_id = Uuid::new_v4();
    let mut session = ChatSession {
        id: session_id,
        title: format!("[scheduled] {}", task.name),
        agent_slug: task.agent_slug.clone(),
        continuation_token: String::new(),
        working_directory: task.working_directory.clone(),
        model: task.model.clone(),
        settings_profile_id: task.settings_profile_id.clone(),
        created_at: started_at,
        updated_at: started_at,
        total_input_tokens: 0,
        total_output_tokens: 0,
        total_cache_creation_tokens: 0,
        total_cache_read_tokens: 0,
    };

    if let Err(e) = repos.chats.create(session.clone()).await {
        tracing::error!(task_id = %task.id, "failed to create disposable session: {e}");
        return;
    }

    let mut history = JobHistory {
        id: Uuid::new_v4(),
        task_id: task.id,
        task_name: task.name.clone(),
        agent_slug: task.agent_slug.clone(),
        status: RunStatus::Running,
        started_at,
        finished_at: None,
        duration_ms: None,
        chat_session_id: session_id,
        model: task.model.clone(),
        prompt_preview: prompt_preview(&task.prompt),
        error_message: None,
        total_input_tokens: 0,
        total_output_tokens: 0,
        total_cache_creation_tokens: 0,
        total_cache_read_tokens: 0,
    };
    if let Err(e) = repos.job_history.insert(history.clone()).await {
        tracing::error!(task_id = %task.id, "failed to insert job history row: {e}");
    }

    let timeout = StdDuration::from_secs(task.timeout_minutes as u64 * 60);
    let agent_slug = task.agent_slug.clone();
    let prompt = task.prompt.clone();
    let user_settings = settings.get().await;

    let outcome = tokio::time::timeout(timeout, async {
        let agent = if agent_slug.is_empty() { None } else { repos.agents.get(&agent_slug).await.ok() };
        let handle = orchestrator.begin_run(&session, agent.as_ref(), prompt, &user_settings).await?;
        orchestrator.drive_to_completion(&mut session, handle).await
    })
    .await;

    let finished_at = Utc::now();
    let (status, error_message) = match outcome {
        Ok(Ok(agento_protocol::RunEvent::ResultTerminal { is_error: true, .. })) => {
            (RunStatus::Failed, Some("run completed with an error result".to_string()))
        }
        Ok(Ok(_)) => (RunStatus::Success, None),
        Ok(Err(e)) => (RunStatus::Failed, Some(e.to_string())),
        Err(_) => (RunStatus::Failed, Some(format!("run exceeded {}-minute timeout", task.timeout_minutes))),
    };

    history.status = status;
    history.finished_at = Some(finished_at);
    history.duration_ms = Some((finished_at - started_at).num_milliseconds());
    history.error_message = error_message.clone();
    history.total_input_tokens = session.total_input_tokens;
    history.total_output_tokens = session.total_output_tokens;
    history.total_cache_creation_tokens = session.total_cache_creation_tokens;
    history.total_cache_read_tokens = session.total_cache_read_tokens;
    if let Err(e) = repos.job_history.update(history).await {
        tracing::error!(task_id = %task.id, "failed to finalize job history row: {e}");
    }
    if let Err(e) = repos.tasks.record_run_outcome(task.id, status, finished_at).await {
        tracing::error!(task_id = %task.id, "failed to record run outcome: {e}");
    }

    let event_type = match status {
        RunStatus::Success => "tasks_scheduler.task_execution.finished",
        _ => "tasks_scheduler.task_execution.failed",
    };
    let mut event = BusEvent::new(event_type)
        .with("task_id", task.id.to_string())
        .with("task_name", task.name.clone())
        .with("duration_ms", (finished_at - started_at).num_milliseconds().to_string());
    if let Some(msg) = error_message {
        event = event.with("error_message", msg);
    }
    events.publish(event).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_off_fires_once_then_terminates() {
        let now = Utc::now();
        let schedule = ScheduleConfig::OneOff { run_at: now };
        assert_eq!(next_fire(&schedule, now).unwrap(), None);
        assert_eq!(next_fire(&schedule, now - chrono::Duration::minutes(1)).unwrap(), Some(now));
    }

    #[test]
    fn interval_period_is_sum_of_parts() {
        let now = Utc::now();
        let schedule = ScheduleConfig::Interval { every_minutes: 30, every_hours: 1, every_days: 0 };
        assert_eq!(next_fire(&schedule, now).unwrap(), Some(now + chrono::Duration::minutes(90)));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let now = Utc::now();
        let schedule = ScheduleConfig::Interval { every_minutes: 0, every_hours: 0, every_days: 0 };
        assert!(next_fire(&schedule, now).is_err());
    }

    #[test]
    fn cron_computes_next_occurrence_strictly_after() {
        let now = Utc::now();
        let schedule = ScheduleConfig::Cron { expression: "* * * * *".to_string() };
        let next = next_fire(&schedule, now).unwrap().unwrap();
        assert!(next > now);
    }

    #[test]
    fn invalid_cron_expression_is_rejected() {
        let now = Utc::now();
        let schedule = ScheduleConfig::Cron { expression: "not a cron".to_string() };
        assert!(next_fire(&schedule, now).is_err());
    }
}
