//! C7 Reviewer Gateway — one logical session per connected reviewer,
//! forwarding ownership-checked `start`/`complete`/`fail` calls onto the
//! task store plus a heartbeat-driven presence lifecycle.
use crate::bus::{DispatchEvent, EventBus};
use crate::error::{DispatchError, Result};
use crate::models::{Presence, Role, Task};
use crate::store::TaskStore;
use crate::validation::ContentValidator;
use std::sync::Arc;
use std::time::Duration;

/// A reviewer's live connection. The session never caches task state — every
/// action re-reads/re-writes through the Task Store, which remains the only
/// linearization point.
pub struct ReviewerSession {
    store: Arc<TaskStore>,
    bus: Arc<EventBus>,
    validator: ContentValidator,
    reviewer_id: String,
    presence_ttl: Duration,
}

impl ReviewerSession {
    /// Registers the reviewer if unseen, and sets presence to `available`
    /// unless the reviewer already holds a task or is suspended, in which
    /// case the prior presence is preserved.
    pub async fn connect(
        store: Arc<TaskStore>,
        bus: Arc<EventBus>,
        reviewer_id: String,
        role: Role,
        presence_ttl: Duration,
    ) -> Result<Self> {
        let reviewer = store.ensure_reviewer(&reviewer_id, role).await;
        if reviewer.active && reviewer.current_task_id.is_none() {
            let updated = store.set_presence(&reviewer_id, Presence::Available).await?;
            bus.publish(DispatchEvent::ReviewerPresence {
                reviewer_id: updated.id,
                presence: updated.presence,
            });
        }

        Ok(Self {
            store,
            bus,
            validator: ContentValidator::new()?,
            reviewer_id,
            presence_ttl,
        })
    }

    /// Attaches to an already-registered reviewer without touching
    /// presence, for transports that dispatch one action per request
    /// rather than holding a live connection (`POST /reviewers/{id}/actions`).
    /// `connect` remains the entry point for transports that model an
    /// actual session lifecycle.
    pub fn attach(store: Arc<TaskStore>, bus: Arc<EventBus>, reviewer_id: String, presence_ttl: Duration) -> Result<Self> {
        Ok(Self {
            store,
            bus,
            validator: ContentValidator::new()?,
            reviewer_id,
            presence_ttl,
        })
    }

    /// `start`, forwarded with an ownership check that is implicit in the
    /// store's `get_owned_task_mut`, but verified again here so the
    /// gateway's own precondition (any task at all owned by this caller)
    /// is explicit.
    pub async fn start(&self, task_id: &str) -> Result<Task> {
        let task = self.store.start(task_id, &self.reviewer_id).await?;
        self.bus.publish(DispatchEvent::TaskStarted {
            task_id: task.id.clone(),
            reviewer_id: self.reviewer_id.clone(),
        });
        Ok(task)
    }

    /// `complete`. `notes` is sanitized before it reaches the store; a
    /// sanitization failure surfaces as `Validation`, never silently drops
    /// the note.
    pub async fn complete(&self, task_id: &str, new_resume_url: String, notes: Option<String>) -> Result<Task> {
        if new_resume_url.trim().is_empty() {
            return Err(DispatchError::Validation(
                "new_resume_url is required to complete a task".to_string(),
            ));
        }
        let notes = notes.map(|n| self.validator.sanitize_note(&n)).transpose()?;

        let assigned_at_task = self.store.get_task(task_id).await?;
        let assigned_at = assigned_at_task.assigned_at;

        let task = self
            .store
            .complete(task_id, &self.reviewer_id, new_resume_url.clone(), notes)
            .await?;

        let completion_seconds = match (assigned_at, task.completed_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds() as f64 / 1000.0,
            _ => 0.0,
        };

        self.bus.publish(DispatchEvent::TaskCompleted {
            task_id: task.id.clone(),
            reviewer_id: self.reviewer_id.clone(),
            new_resume_url,
            completion_seconds,
        });
        Ok(task)
    }

    /// `fail`. The reason is sanitized and appended to the task's notes;
    /// the reviewer returns to `available`.
    pub async fn fail(&self, task_id: &str, reason: String) -> Result<Task> {
        let reason = self.validator.sanitize_note(&reason)?;
        let task = self.store.fail(task_id, &self.reviewer_id, reason.clone()).await?;
        self.bus.publish(DispatchEvent::TaskFailed {
            task_id: task.id.clone(),
            reviewer_id: self.reviewer_id.clone(),
            reason,
        });
        Ok(task)
    }

    /// Updates `last_heartbeat_at` without changing presence. If the
    /// session itself never notices a missed heartbeat (it vanished
    /// without a clean close), the presence watchdog sweep in `main.rs`
    /// flips the reviewer to `offline` once `last_heartbeat_at` exceeds
    /// `presence_ttl`, so staleness is enforced even without a live
    /// session observing it.
    pub async fn heartbeat(&self) -> Result<()> {
        self.store.heartbeat(&self.reviewer_id).await
    }

    pub fn presence_ttl(&self) -> Duration {
        self.presence_ttl
    }

    /// Closing the session never fails a held task. It only flips presence
    /// to `offline`; a task left `assigned`/`in_progress` is the Deadline
    /// Monitor's concern, not the gateway's.
    pub async fn disconnect(&self) -> Result<()> {
        let reviewer = self.store.get_reviewer(&self.reviewer_id).await?;
        if reviewer.active {
            let updated = self.store.set_presence(&self.reviewer_id, Presence::Offline).await?;
            self.bus.publish(DispatchEvent::ReviewerPresence {
                reviewer_id: updated.id,
                presence: updated.presence,
            });
        }
        Ok(())
    }
}
