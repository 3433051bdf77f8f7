//! C1 Task Store — the linearization point for every task and reviewer
//! state transition. Lock-ordered, verify-then-mutate, single commit point
//! per operation, over the full task/reviewer/incident/application schema.
//!
//! This in-process, lock-guarded store stands in for "one primary
//! relational store" reachable via skip-locked claims. Per-row locking is
//! realized with two top-level `tokio::sync::Mutex` maps (tasks,
//! reviewers); every operation that touches both takes them in **task-first,
//! reviewer-second** order to avoid deadlock.

use crate::config::DispatchConfig;
use crate::error::{DispatchError, Result};
use crate::models::{Application, Incident, IncidentKind, Presence, Reviewer, Role, Task, TaskStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Outcome of `expire()`, carrying what the Deadline Monitor needs to
/// publish `reviewer.strike`, `reviewer.suspended`, and `task.requeued`
/// in sequence.
pub struct ExpireOutcome {
    pub task: Task,
    pub reviewer: Reviewer,
    pub incident: Incident,
    pub strike_kind: IncidentKind,
    pub newly_suspended: bool,
}

pub struct TaskStore {
    config: DispatchConfig,
    tasks: Mutex<HashMap<String, Task>>,
    reviewers: Mutex<HashMap<String, Reviewer>>,
    incidents: Mutex<Vec<Incident>>,
    applications: Mutex<HashMap<(String, String), Application>>,
}

impl TaskStore {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            tasks: Mutex::new(HashMap::new()),
            reviewers: Mutex::new(HashMap::new()),
            incidents: Mutex::new(Vec::new()),
            applications: Mutex::new(HashMap::new()),
        }
    }

    fn presence_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.config.presence_ttl_secs as i64)
    }

    fn sla(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.config.sla_minutes)
    }

    // --- C3 Intake: enqueue ------------------------------------------------

    /// `enqueue`. Precondition `score < SCORE_THRESHOLD` is enforced here
    /// as well as in intake, since the store is the authoritative boundary.
    pub async fn enqueue(
        &self,
        candidate_id: String,
        job_id: String,
        ats_score: f64,
        old_resume_url: Option<String>,
        missing_keywords: Vec<String>,
        suggestions: Vec<String>,
    ) -> Result<Task> {
        if ats_score >= self.config.score_threshold {
            return Err(DispatchError::Validation(format!(
                "ats_score {ats_score} is at or above the threshold {}; route to auto-apply instead",
                self.config.score_threshold
            )));
        }

        let mut tasks = self.tasks.lock().await;
        let queued_count = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Queued)
            .count();
        if queued_count >= crate::constants::MAX_QUEUE_SIZE {
            return Err(DispatchError::Transient(format!(
                "task queue full (max {})",
                crate::constants::MAX_QUEUE_SIZE
            )));
        }

        let task = Task::new(
            candidate_id,
            job_id,
            ats_score,
            old_resume_url,
            missing_keywords,
            suggestions,
        );
        tasks.insert(task.id.clone(), task.clone());
        debug!(task_id = %task.id, "task enqueued");
        Ok(task)
    }

    // --- C4 Assigner support ------------------------------------------------

    /// Reviewers the Assigner's fairness policy may consider right now,
    /// as an owned snapshot so the caller can rank them without holding
    /// the lock.
    pub async fn eligible_reviewers(&self) -> Vec<Reviewer> {
        let now = Utc::now();
        let reviewers = self.reviewers.lock().await;
        reviewers
            .values()
            .filter(|r| {
                r.eligible_for_assignment(
                    self.presence_ttl(),
                    self.config.violations_before_suspension,
                    now,
                )
            })
            .cloned()
            .collect()
    }

    /// `claim_next_task_for`. Locks the oldest queued task, re-verifies
    /// the given reviewer is still eligible, and binds them. Returns
    /// `Ok(None)` if there is no queued task or the reviewer is no longer
    /// eligible — both are expected steady-state outcomes for a tick, not
    /// hard errors.
    pub async fn claim_next_task_for(&self, reviewer_id: &str) -> Result<Option<Task>> {
        let mut tasks = self.tasks.lock().await;
        let mut reviewers = self.reviewers.lock().await;

        let oldest_id = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Queued)
            .min_by_key(|t| t.created_at)
            .map(|t| t.id.clone());

        let Some(task_id) = oldest_id else {
            return Ok(None);
        };

        let now = Utc::now();
        let reviewer = match reviewers.get_mut(reviewer_id) {
            Some(r) if r.eligible_for_assignment(self.presence_ttl(), self.config.violations_before_suspension, now) => {
                r
            }
            Some(r) => {
                // Heartbeat went stale between selection and claim: mark
                // offline so the next tick picks a different candidate.
                if now - r.last_heartbeat_at > self.presence_ttl() {
                    r.presence = Presence::Offline;
                }
                return Ok(None);
            }
            None => return Ok(None),
        };

        let task = tasks.get_mut(&task_id).expect("task_id came from this map");
        task.status = TaskStatus::Assigned;
        task.assigned_to = Some(reviewer_id.to_string());
        task.assigned_at = Some(now);
        task.deadline_at = Some(now + self.sla());
        task.updated_at = now;

        reviewer.start_task(task_id.clone());

        debug!(task_id = %task_id, reviewer_id, "task assigned");
        Ok(Some(task.clone()))
    }

    // --- C7 Reviewer Gateway support ---------------------------------------

    /// `start`: moves an assigned task into `in_progress`.
    pub async fn start(&self, task_id: &str, reviewer_id: &str) -> Result<Task> {
        let mut tasks = self.tasks.lock().await;
        let task = get_owned_task_mut(&mut tasks, task_id, reviewer_id)?;

        if task.status != TaskStatus::Assigned {
            return Err(DispatchError::IllegalTransition {
                task_id: task_id.to_string(),
                message: format!("cannot start task in status {:?}", task.status),
            });
        }

        task.status = TaskStatus::InProgress;
        task.started_at = Some(Utc::now());
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    /// `complete`. Updates reviewer counters, releases the reviewer, and
    /// upserts the `Application` row, all under the same task-then-reviewer
    /// lock scope.
    pub async fn complete(
        &self,
        task_id: &str,
        reviewer_id: &str,
        new_resume_url: String,
        notes: Option<String>,
    ) -> Result<Task> {
        let mut tasks = self.tasks.lock().await;
        let mut reviewers = self.reviewers.lock().await;

        let task = get_owned_task_mut(&mut tasks, task_id, reviewer_id)?;
        if !matches!(task.status, TaskStatus::Assigned | TaskStatus::InProgress) {
            return Err(DispatchError::IllegalTransition {
                task_id: task_id.to_string(),
                message: format!("cannot complete task in status {:?}", task.status),
            });
        }

        let assigned_at = task.assigned_at.ok_or_else(|| DispatchError::Fatal(
            format!("task {task_id} held by a reviewer but missing assigned_at"),
        ))?;
        let now = Utc::now();
        let completion_seconds = (now - assigned_at).num_milliseconds() as f64 / 1000.0;

        task.status = TaskStatus::Completed;
        task.completed_at = Some(now);
        task.new_resume_url = Some(new_resume_url.clone());
        if let Some(notes) = notes {
            task.notes.push(notes);
        }
        task.updated_at = now;

        if let Some(reviewer) = reviewers.get_mut(reviewer_id) {
            reviewer.record_completion(completion_seconds);
        }

        let mut applications = self.applications.lock().await;
        let key = (task.candidate_id.clone(), task.job_id.clone());
        applications.insert(
            key,
            Application {
                candidate_id: task.candidate_id.clone(),
                job_id: task.job_id.clone(),
                resume_url: new_resume_url,
                ats_score_at_submission: task.ats_score,
                auto_submitted: false,
                submitted_at: now,
            },
        );

        debug!(task_id = %task_id, completion_seconds, "task completed");
        Ok(task.clone())
    }

    /// `fail`. Resets the row to `queued`, appends `reason` to notes, and
    /// releases the reviewer without crediting a completion.
    pub async fn fail(&self, task_id: &str, reviewer_id: &str, reason: String) -> Result<Task> {
        let mut tasks = self.tasks.lock().await;
        let mut reviewers = self.reviewers.lock().await;

        let task = get_owned_task_mut(&mut tasks, task_id, reviewer_id)?;
        if !matches!(task.status, TaskStatus::Assigned | TaskStatus::InProgress) {
            return Err(DispatchError::IllegalTransition {
                task_id: task_id.to_string(),
                message: format!("cannot fail task in status {:?}", task.status),
            });
        }

        task.status = TaskStatus::Queued;
        task.assigned_to = None;
        task.assigned_at = None;
        task.deadline_at = None;
        task.started_at = None;
        task.retry_count += 1;
        task.notes.push(reason);
        task.updated_at = Utc::now();

        if let Some(reviewer) = reviewers.get_mut(reviewer_id) {
            reviewer.release_task();
        }

        debug!(task_id = %task_id, "task failed and requeued by reviewer");
        Ok(task.clone())
    }

    // --- C5 Deadline Monitor support ----------------------------------------

    /// Ids of tasks whose deadline has passed, still held. Snapshot only;
    /// `expire` re-verifies under lock.
    pub async fn expired_task_ids(&self, now: DateTime<Utc>) -> Vec<String> {
        let tasks = self.tasks.lock().await;
        tasks
            .values()
            .filter(|t| {
                t.status.is_held() && t.deadline_at.map(|d| d < now).unwrap_or(false)
            })
            .map(|t| t.id.clone())
            .collect()
    }

    /// Tasks still held whose remaining time until deadline matches one of
    /// `warning_marks` (minutes), for the Pre-warning Emitter. Dedup is the
    /// caller's responsibility; the store never mutates state for a
    /// warning.
    pub async fn tasks_nearing_deadline(
        &self,
        warning_marks: &[i64],
        now: DateTime<Utc>,
    ) -> Vec<(Task, i64)> {
        let tasks = self.tasks.lock().await;
        tasks
            .values()
            .filter(|t| t.status.is_held())
            .filter_map(|t| {
                let deadline = t.deadline_at?;
                let minutes_remaining = (deadline - now).num_minutes();
                warning_marks
                    .contains(&minutes_remaining)
                    .then(|| (t.clone(), minutes_remaining))
            })
            .collect()
    }

    /// `expire`, called only by C5. Requeues the task, applies the strike
    /// machine to the holding reviewer, and writes an `Incident`.
    /// Re-verifies the task is still held and past its deadline (it may
    /// have been completed or failed since the sweep snapshot) rather than
    /// trusting the caller's id list blindly.
    pub async fn expire(&self, task_id: &str) -> Result<Option<ExpireOutcome>> {
        let mut tasks = self.tasks.lock().await;
        let mut reviewers = self.reviewers.lock().await;

        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| DispatchError::NotFound(format!("task {task_id}")))?;

        let now = Utc::now();
        if !task.status.is_held() || task.deadline_at.map(|d| d >= now).unwrap_or(true) {
            // Already resolved or not yet due; nothing to expire.
            return Ok(None);
        }

        let reviewer_id = task
            .assigned_to
            .clone()
            .ok_or_else(|| DispatchError::Fatal(format!("task {task_id} held with no assigned_to")))?;

        let overdue_minutes = task
            .deadline_at
            .map(|d| (now - d).num_minutes())
            .unwrap_or(0);

        task.status = TaskStatus::Queued;
        task.assigned_to = None;
        task.assigned_at = None;
        task.deadline_at = None;
        task.started_at = None;
        task.retry_count += 1;
        task.updated_at = now;

        let reviewer = reviewers
            .get_mut(&reviewer_id)
            .ok_or_else(|| DispatchError::Fatal(format!("reviewer {reviewer_id} not found for held task")))?;
        reviewer.release_task();
        let strike_kind = reviewer.apply_strike(
            self.config.warnings_before_violation,
            self.config.violations_before_suspension,
        );
        let newly_suspended = !reviewer.active;

        let incident = Incident::new(
            reviewer_id.clone(),
            strike_kind,
            format!("sla exceeded by {overdue_minutes} minutes"),
            Some(task_id.to_string()),
        );
        self.incidents.lock().await.push(incident.clone());

        if newly_suspended {
            let suspension = Incident::new(
                reviewer_id.clone(),
                IncidentKind::Suspension,
                "violations_before_suspension reached".to_string(),
                Some(task_id.to_string()),
            );
            self.incidents.lock().await.push(suspension);
        }

        debug!(task_id = %task_id, reviewer_id, ?strike_kind, "task expired and requeued");
        Ok(Some(ExpireOutcome {
            task: task.clone(),
            reviewer: reviewer.clone(),
            incident,
            strike_kind,
            newly_suspended,
        }))
    }

    // --- Reviewer presence ---------------------------------------------------

    /// `set_presence`. `available ↔ busy` is engine-driven only — the
    /// setter rejects an external caller trying to set `available` while
    /// the reviewer still holds a task, rejects `busy` outright (only
    /// `claim_next_task_for` may set it, as part of binding a task), and
    /// rejects any change for a suspended reviewer.
    pub async fn set_presence(&self, reviewer_id: &str, new: Presence) -> Result<Reviewer> {
        let mut reviewers = self.reviewers.lock().await;
        let reviewer = reviewers
            .get_mut(reviewer_id)
            .ok_or_else(|| DispatchError::NotFound(format!("reviewer {reviewer_id}")))?;

        if !reviewer.active && new != Presence::Offline {
            return Err(DispatchError::Suspended(reviewer_id.to_string()));
        }

        if new == Presence::Busy {
            return Err(DispatchError::IllegalTransition {
                task_id: reviewer.current_task_id.clone().unwrap_or_default(),
                message: "busy is set only by claim_next_task_for, not by an external caller".to_string(),
            });
        }

        if new == Presence::Available && reviewer.current_task_id.is_some() {
            return Err(DispatchError::IllegalTransition {
                task_id: reviewer.current_task_id.clone().unwrap_or_default(),
                message: "reviewer still holds a task".to_string(),
            });
        }

        reviewer.presence = new;
        reviewer.last_heartbeat_at = Utc::now();
        reviewer.updated_at = Utc::now();
        Ok(reviewer.clone())
    }

    /// Heartbeat without a presence change, for C7's keepalive.
    pub async fn heartbeat(&self, reviewer_id: &str) -> Result<()> {
        let mut reviewers = self.reviewers.lock().await;
        let reviewer = reviewers
            .get_mut(reviewer_id)
            .ok_or_else(|| DispatchError::NotFound(format!("reviewer {reviewer_id}")))?;
        reviewer.last_heartbeat_at = Utc::now();
        Ok(())
    }

    /// Registers a reviewer identity on first contact. Auth/session is
    /// external to this core; this is the minimal store-side counterpart
    /// the gateway needs on connect.
    pub async fn ensure_reviewer(&self, reviewer_id: &str, role: Role) -> Reviewer {
        let mut reviewers = self.reviewers.lock().await;
        reviewers
            .entry(reviewer_id.to_string())
            .or_insert_with(|| Reviewer::new(reviewer_id.to_string(), role))
            .clone()
    }

    /// Admin reset for suspended reviewers.
    pub async fn admin_reset_reviewer(&self, reviewer_id: &str) -> Result<Reviewer> {
        let mut reviewers = self.reviewers.lock().await;
        let reviewer = reviewers
            .get_mut(reviewer_id)
            .ok_or_else(|| DispatchError::NotFound(format!("reviewer {reviewer_id}")))?;
        reviewer.admin_reset();
        self.incidents.lock().await.push(Incident::new(
            reviewer_id.to_string(),
            IncidentKind::AdminReset,
            "admin reset".to_string(),
            None,
        ));
        Ok(reviewer.clone())
    }

    /// Abandons a task past its retry cap rather than re-queuing it,
    /// called by the Assigner when it notices `retry_count` exceeds
    /// `MAX_RETRIES` on the task it just locked. Releases whatever reviewer
    /// is currently bound to the task (the claim that just happened is
    /// undone rather than credited or requeued), in the same transaction.
    pub async fn abandon_with_timeout(&self, task_id: &str) -> Result<Task> {
        let mut tasks = self.tasks.lock().await;
        let mut reviewers = self.reviewers.lock().await;

        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| DispatchError::NotFound(format!("task {task_id}")))?;

        let released_reviewer_id = task.assigned_to.take();
        if let Some(reviewer_id) = &released_reviewer_id {
            if let Some(reviewer) = reviewers.get_mut(reviewer_id) {
                reviewer.release_task();
            }
        }
        task.status = TaskStatus::Timeout;
        task.assigned_at = None;
        task.deadline_at = None;
        task.started_at = None;
        task.updated_at = Utc::now();

        self.incidents.lock().await.push(Incident::new(
            released_reviewer_id.unwrap_or_default(),
            IncidentKind::RetriesExhausted,
            format!("retry_count {} exceeded max_retries", task.retry_count),
            Some(task_id.to_string()),
        ));
        Ok(task.clone())
    }

    // --- Read model ----------------------------------------------------------

    pub async fn get_task(&self, task_id: &str) -> Result<Task> {
        self.tasks
            .lock()
            .await
            .get(task_id)
            .cloned()
            .ok_or_else(|| DispatchError::NotFound(format!("task {task_id}")))
    }

    pub async fn get_reviewer(&self, reviewer_id: &str) -> Result<Reviewer> {
        self.reviewers
            .lock()
            .await
            .get(reviewer_id)
            .cloned()
            .ok_or_else(|| DispatchError::NotFound(format!("reviewer {reviewer_id}")))
    }

    pub async fn task_counts_by_status(&self) -> (usize, usize, usize) {
        let tasks = self.tasks.lock().await;
        let queued = tasks.values().filter(|t| t.status == TaskStatus::Queued).count();
        let assigned = tasks.values().filter(|t| t.status == TaskStatus::Assigned).count();
        let in_progress = tasks
            .values()
            .filter(|t| t.status == TaskStatus::InProgress)
            .count();
        (queued, assigned, in_progress)
    }

    pub async fn reviewer_counts(&self) -> (usize, usize, usize) {
        let reviewers = self.reviewers.lock().await;
        let total = reviewers.len();
        let available = reviewers
            .values()
            .filter(|r| r.presence == Presence::Available)
            .count();
        let suspended = reviewers.values().filter(|r| !r.active).count();
        (total, available, suspended)
    }

    /// Reviewer ids whose `last_heartbeat_at` is older than `presence_ttl`
    /// and who are not already `offline` — the set a presence watchdog
    /// sweep must flip to offline, since a gateway session that vanished
    /// without a clean `disconnect` never calls `set_presence` itself.
    pub async fn stale_reviewer_ids(&self) -> Vec<String> {
        let now = Utc::now();
        let reviewers = self.reviewers.lock().await;
        reviewers
            .values()
            .filter(|r| r.presence != Presence::Offline && now - r.last_heartbeat_at > self.presence_ttl())
            .map(|r| r.id.clone())
            .collect()
    }

    /// Test-only escape hatch for forcing a task's `deadline_at` into the
    /// past without waiting out a real SLA window.
    #[cfg(test)]
    pub(crate) fn tasks_for_test(&self) -> &Mutex<HashMap<String, Task>> {
        &self.tasks
    }

    /// Test-only escape hatch for seeding a reviewer's strike counters
    /// directly, to exercise the strike machine's promotion/suspension
    /// edges without replaying every prior expiry.
    #[cfg(test)]
    pub(crate) fn reviewers_for_test(&self) -> &Mutex<HashMap<String, Reviewer>> {
        &self.reviewers
    }

    /// Ambient cleanup sweep: evicts the oldest terminal tasks and oldest
    /// incidents once the in-memory store exceeds its configured bound.
    /// Returns `(tasks_evicted, incidents_evicted)`.
    pub async fn cleanup(&self) -> (usize, usize) {
        let mut tasks_evicted = 0;
        {
            let mut tasks = self.tasks.lock().await;
            if tasks.len() > crate::constants::MAX_STORED_TASKS {
                let mut terminal_ids: Vec<(DateTime<Utc>, String)> = tasks
                    .values()
                    .filter(|t| t.status.is_terminal())
                    .map(|t| (t.updated_at, t.id.clone()))
                    .collect();
                terminal_ids.sort_by_key(|(ts, _)| *ts);
                let overflow = tasks.len() - crate::constants::MAX_STORED_TASKS;
                for (_, id) in terminal_ids.into_iter().take(overflow) {
                    tasks.remove(&id);
                    tasks_evicted += 1;
                }
            }
        }

        let mut incidents_evicted = 0;
        {
            let mut incidents = self.incidents.lock().await;
            if incidents.len() > crate::constants::MAX_STORED_INCIDENTS {
                let overflow = incidents.len() - crate::constants::MAX_STORED_INCIDENTS;
                incidents.drain(0..overflow);
                incidents_evicted = overflow;
            }
        }

        if tasks_evicted > 0 || incidents_evicted > 0 {
            warn!(tasks_evicted, incidents_evicted, "cleanup sweep evicted rows");
        }
        (tasks_evicted, incidents_evicted)
    }
}

fn get_owned_task_mut<'a>(
    tasks: &'a mut HashMap<String, Task>,
    task_id: &str,
    reviewer_id: &str,
) -> Result<&'a mut Task> {
    let task = tasks
        .get_mut(task_id)
        .ok_or_else(|| DispatchError::NotFound(format!("task {task_id}")))?;
    if task.assigned_to.as_deref() != Some(reviewer_id) {
        return Err(DispatchError::NotOwner {
            task_id: task_id.to_string(),
            reviewer_id: reviewer_id.to_string(),
        });
    }
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> DispatchConfig {
        DispatchConfig {
            sla_minutes: 20,
            warning_marks: vec![5, 3, 1],
            presence_ttl_secs: 90,
            assign_tick_secs: 5,
            deadline_tick_secs: 60,
            max_retries: 3,
            warnings_before_violation: 3,
            violations_before_suspension: 3,
            score_threshold: 0.90,
        }
    }

    async fn available_reviewer(store: &TaskStore, id: &str) -> Reviewer {
        let reviewer = store.ensure_reviewer(id, Role::Employee).await;
        store.set_presence(id, Presence::Available).await.unwrap();
        reviewer
    }

    #[tokio::test]
    async fn enqueue_rejects_score_at_threshold() {
        let store = TaskStore::new(test_config());
        let err = store
            .enqueue("c1".into(), "j1".into(), 0.90, None, vec![], vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[tokio::test]
    async fn happy_path_assign_start_complete() {
        let store = TaskStore::new(test_config());
        available_reviewer(&store, "r1").await;

        let task = store
            .enqueue("c1".into(), "j1".into(), 0.5, Some("u1".into()), vec![], vec![])
            .await
            .unwrap();

        let assigned = store.claim_next_task_for("r1").await.unwrap().unwrap();
        assert_eq!(assigned.id, task.id);
        assert_eq!(assigned.status, TaskStatus::Assigned);
        assert_eq!(assigned.assigned_to.as_deref(), Some("r1"));

        store.start(&task.id, "r1").await.unwrap();
        let completed = store
            .complete(&task.id, "r1", "u2".into(), None)
            .await
            .unwrap();
        assert_eq!(completed.status, TaskStatus::Completed);

        let reviewer = store.get_reviewer("r1").await.unwrap();
        assert_eq!(reviewer.tasks_completed, 1);
        assert_eq!(reviewer.presence, Presence::Available);
        assert!(reviewer.current_task_id.is_none());
    }

    #[tokio::test]
    async fn claim_fails_without_eligible_reviewer() {
        let store = TaskStore::new(test_config());
        store
            .enqueue("c1".into(), "j1".into(), 0.5, None, vec![], vec![])
            .await
            .unwrap();
        let claimed = store.claim_next_task_for("ghost").await.unwrap();
        assert!(claimed.is_none());
    }

    #[tokio::test]
    async fn non_owner_cannot_start_or_complete() {
        let store = TaskStore::new(test_config());
        available_reviewer(&store, "r1").await;
        let task = store
            .enqueue("c1".into(), "j1".into(), 0.5, None, vec![], vec![])
            .await
            .unwrap();
        store.claim_next_task_for("r1").await.unwrap();

        let err = store.start(&task.id, "r2").await.unwrap_err();
        assert!(matches!(err, DispatchError::NotOwner { .. }));
    }

    #[tokio::test]
    async fn set_presence_rejects_available_while_holding_task() {
        let store = TaskStore::new(test_config());
        available_reviewer(&store, "r1").await;
        store
            .enqueue("c1".into(), "j1".into(), 0.5, None, vec![], vec![])
            .await
            .unwrap();
        store.claim_next_task_for("r1").await.unwrap();

        let err = store
            .set_presence("r1", Presence::Available)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn set_presence_rejects_change_for_suspended_reviewer() {
        let store = TaskStore::new(test_config());
        store.ensure_reviewer("r1", Role::Employee).await;
        store.admin_reset_reviewer("r1").await.unwrap();
        {
            let mut reviewers = store.reviewers.lock().await;
            reviewers.get_mut("r1").unwrap().active = false;
        }
        let err = store
            .set_presence("r1", Presence::Available)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Suspended(_)));
    }

    #[tokio::test]
    async fn set_presence_rejects_busy_from_an_external_caller() {
        let store = TaskStore::new(test_config());
        store.ensure_reviewer("r1", Role::Employee).await;

        let err = store.set_presence("r1", Presence::Busy).await.unwrap_err();
        assert!(matches!(err, DispatchError::IllegalTransition { .. }));

        let reviewer = store.get_reviewer("r1").await.unwrap();
        assert_ne!(reviewer.presence, Presence::Busy);
    }

    #[tokio::test]
    async fn stale_reviewer_ids_finds_only_overdue_non_offline_reviewers() {
        let store = TaskStore::new(test_config());
        available_reviewer(&store, "stale").await;
        available_reviewer(&store, "fresh").await;
        store.ensure_reviewer("already_offline", Role::Employee).await;

        {
            let mut reviewers = store.reviewers_for_test().lock().await;
            reviewers.get_mut("stale").unwrap().last_heartbeat_at =
                Utc::now() - (store.presence_ttl() + chrono::Duration::seconds(1));
        }

        let stale = store.stale_reviewer_ids().await;
        assert_eq!(stale, vec!["stale".to_string()]);
    }
}
