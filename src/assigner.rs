//! C4 Assigner — keeps the queue draining while reviewers exist. A tick
//! interval plus an event-driven nudge, `tokio::select!`-composed with the
//! other background loops in `main.rs`.
use crate::bus::{DispatchEvent, EventBus};
use crate::error::Result;
use crate::models::Reviewer;
use crate::store::TaskStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Runs the Assigner's tick loop. Multiple instances may run concurrently
/// against the same `TaskStore` — correctness relies on the store's
/// lock-skip semantics, never on the uniqueness of the assigner; this
/// service only ever spawns one, but nothing about the loop assumes that.
pub struct Assigner {
    store: Arc<TaskStore>,
    bus: Arc<EventBus>,
    tick: Duration,
    max_retries: u32,
}

impl Assigner {
    pub fn new(store: Arc<TaskStore>, bus: Arc<EventBus>, tick: Duration, max_retries: u32) -> Self {
        Self {
            store,
            bus,
            tick,
            max_retries,
        }
    }

    /// Drives the loop until cancelled. Runs every `ASSIGN_TICK` and
    /// additionally whenever the bus publishes `task.enqueued` or a
    /// reviewer becomes `available`.
    pub async fn run(&self) -> Result<()> {
        info!(tick_secs = self.tick.as_secs(), "assigner loop starting");
        let mut ticker = tokio::time::interval(self.tick);
        let mut events = self.bus.subscribe();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.drain_once().await;
                }
                event = events.recv() => {
                    match event {
                        Ok(DispatchEvent::TaskEnqueued { .. }) => {
                            self.drain_once().await;
                        }
                        Ok(DispatchEvent::ReviewerPresence { presence, .. })
                            if presence == crate::models::Presence::Available =>
                        {
                            self.drain_once().await;
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "assigner event subscription lagged, falling back to tick cadence");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            error!("event bus closed, assigner loop exiting");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Drains as much of the queue as the currently eligible reviewer pool
    /// allows in one pass: repeatedly performs a single tick's work
    /// (lock-one-task, lock-one-reviewer, claim, commit) until either side
    /// is exhausted, rather than waiting for the next tick per pairing.
    async fn drain_once(&self) {
        loop {
            match self.assign_one().await {
                Ok(true) => continue,
                Ok(false) => return,
                Err(e) => {
                    // All non-fatal errors are transient and retried on the
                    // next tick; they never surface to end users.
                    error!(error = %e, "assigner tick failed, will retry next tick");
                    return;
                }
            }
        }
    }

    /// One tick's worth of work: lock a reviewer, lock a task, claim, and
    /// commit. Returns `Ok(true)` if a task was assigned (or abandoned to
    /// `timeout`) and the caller should immediately try again, `Ok(false)`
    /// if either side of the queue is currently empty. `pub(crate)` so
    /// integration scenarios in `crate::tests` can drive a single tick
    /// deterministically.
    pub(crate) async fn assign_one(&self) -> Result<bool> {
        let eligible = self.store.eligible_reviewers().await;
        let Some(reviewer) = pick_best(&eligible) else {
            return Ok(false);
        };

        match self.store.claim_next_task_for(&reviewer.id).await? {
            Some(task) if task.retry_count > self.max_retries => {
                // A task past the retry cap is abandoned rather than
                // re-assigned. `abandon_with_timeout` releases the reviewer this claim
                // just bound, undoing the assignment rather than crediting
                // or requeuing it.
                let abandoned = self.store.abandon_with_timeout(&task.id).await?;
                self.bus.publish(DispatchEvent::TaskTimeout {
                    task_id: abandoned.id.clone(),
                });
                debug!(task_id = %abandoned.id, "task abandoned after exceeding retry cap");
                Ok(true)
            }
            Some(task) => {
                self.bus.publish(DispatchEvent::TaskAssigned {
                    task_id: task.id.clone(),
                    reviewer_id: reviewer.id.clone(),
                    deadline_at: task.deadline_at.unwrap_or_else(chrono::Utc::now),
                });
                debug!(task_id = %task.id, reviewer_id = %reviewer.id, "task assigned");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Fairness policy: fewest `tasks_completed`, ties broken by oldest
/// `last_heartbeat_at` (least-recently-used).
fn pick_best(reviewers: &[Reviewer]) -> Option<&Reviewer> {
    reviewers.iter().min_by(|a, b| {
        a.tasks_completed
            .cmp(&b.tasks_completed)
            .then_with(|| a.last_heartbeat_at.cmp(&b.last_heartbeat_at))
    })
}
