//! C5 Deadline Monitor + C6 Pre-warning Emitter — a single sweep loop,
//! on a fixed-interval `tokio::time::interval`, that expires overdue tasks
//! through the strike machine and emits exactly-once T-minus warnings.
use crate::bus::{DispatchEvent, EventBus};
use crate::error::Result;
use crate::store::TaskStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Deduplicates `(task_id, minutes_remaining)` warning emission. A short-
/// lived map keyed by the pair; entries expire after `2 × DEADLINE_TICK`
/// so a task that is reassigned and hits the same mark again on a later
/// pass can warn again.
struct WarningDedup {
    seen: Mutex<HashMap<(String, i64), DateTime<Utc>>>,
    ttl: chrono::Duration,
}

impl WarningDedup {
    fn new(ttl: chrono::Duration) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns `true` if this is the first time this pair has been seen
    /// within the TTL window (the caller should emit); `false` if a prior
    /// acquisition within the window means "already emitted".
    async fn try_acquire(&self, task_id: &str, minutes_remaining: i64) -> bool {
        let now = Utc::now();
        let mut seen = self.seen.lock().await;
        seen.retain(|_, acquired_at| now - *acquired_at < self.ttl);

        let key = (task_id.to_string(), minutes_remaining);
        if seen.contains_key(&key) {
            false
        } else {
            seen.insert(key, now);
            true
        }
    }
}

pub struct DeadlineMonitor {
    store: Arc<TaskStore>,
    bus: Arc<EventBus>,
    tick: Duration,
    warning_marks: Vec<i64>,
    dedup: WarningDedup,
}

impl DeadlineMonitor {
    pub fn new(
        store: Arc<TaskStore>,
        bus: Arc<EventBus>,
        tick: Duration,
        warning_marks: Vec<i64>,
    ) -> Self {
        let ttl = chrono::Duration::seconds(2 * tick.as_secs() as i64);
        Self {
            store,
            bus,
            tick,
            warning_marks,
            dedup: WarningDedup::new(ttl),
        }
    }

    pub async fn run(&self) -> Result<()> {
        info!(tick_secs = self.tick.as_secs(), "deadline monitor loop starting");
        let mut ticker = tokio::time::interval(self.tick);
        loop {
            ticker.tick().await;
            self.sweep_once().await;
        }
    }

    /// `pub(crate)` so integration scenarios in `crate::tests` can drive
    /// one sweep deterministically instead of waiting on the tick interval.
    pub(crate) async fn sweep_once(&self) {
        let now = Utc::now();

        if let Err(e) = self.emit_warnings(now).await {
            error!(error = %e, "pre-warning emitter sweep failed, will retry next tick");
        }

        let expired_ids = self.store.expired_task_ids(now).await;
        for task_id in expired_ids {
            if let Err(e) = self.expire_one(&task_id).await {
                error!(task_id = %task_id, error = %e, "deadline expiry failed, will retry next tick");
            }
        }
    }

    /// `expire` plus its publish sequence: `reviewer.strike`, then
    /// `reviewer.suspended` if applicable, then `task.requeued` — all
    /// after a single commit.
    async fn expire_one(&self, task_id: &str) -> Result<()> {
        let Some(outcome) = self.store.expire(task_id).await? else {
            // Already resolved since the sweep snapshot; nothing to do.
            return Ok(());
        };

        self.bus.publish(DispatchEvent::ReviewerStrike {
            reviewer_id: outcome.reviewer.id.clone(),
            kind: outcome.strike_kind,
            warnings: outcome.reviewer.warnings,
            violations: outcome.reviewer.violations,
        });
        if outcome.newly_suspended {
            self.bus.publish(DispatchEvent::ReviewerSuspended {
                reviewer_id: outcome.reviewer.id.clone(),
            });
        }
        self.bus.publish(DispatchEvent::TaskRequeued {
            task_id: outcome.task.id.clone(),
            retry_count: outcome.task.retry_count,
            reason: outcome.incident.reason.clone(),
        });

        debug!(
            task_id = %outcome.task.id,
            reviewer_id = %outcome.reviewer.id,
            kind = ?outcome.strike_kind,
            newly_suspended = outcome.newly_suspended,
            "task expired and reviewer struck"
        );
        Ok(())
    }

    /// For each held task whose remaining time matches a configured mark,
    /// emit `task.warning` exactly once per `(task_id, minute)`. Never
    /// mutates the Task Store.
    async fn emit_warnings(&self, now: DateTime<Utc>) -> Result<()> {
        let candidates = self
            .store
            .tasks_nearing_deadline(&self.warning_marks, now)
            .await;

        for (task, minutes_remaining) in candidates {
            let Some(reviewer_id) = task.assigned_to.clone() else {
                continue;
            };
            if self.dedup.try_acquire(&task.id, minutes_remaining).await {
                self.bus.publish(DispatchEvent::TaskWarning {
                    task_id: task.id.clone(),
                    reviewer_id,
                    minutes_remaining,
                });
            }
        }
        Ok(())
    }
}
