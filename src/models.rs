use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A human review task produced when an ATS match score falls below
/// [`crate::constants::SCORE_THRESHOLD`].
///
/// Tasks are the fundamental unit of work dispatched to reviewers. Every
/// state transition is owned by [`crate::store::TaskStore`]; nothing else
/// mutates a `Task` directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub candidate_id: String,
    pub job_id: String,
    pub ats_score: f64,
    pub status: TaskStatus,
    pub assigned_to: Option<String>,
    pub assigned_at: Option<chrono::DateTime<chrono::Utc>>,
    pub deadline_at: Option<chrono::DateTime<chrono::Utc>>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub old_resume_url: Option<String>,
    pub new_resume_url: Option<String>,
    pub retry_count: u32,
    pub missing_keywords: Vec<String>,
    pub suggestions: Vec<String>,
    pub notes: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Current status of a task in the dispatch pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Timeout,
}

impl TaskStatus {
    /// Terminal states never transition further (see GLOSSARY: Task terminal states).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Timeout
        )
    }

    pub fn is_held(self) -> bool {
        matches!(self, TaskStatus::Assigned | TaskStatus::InProgress)
    }
}

impl Task {
    pub fn new(
        candidate_id: String,
        job_id: String,
        ats_score: f64,
        old_resume_url: Option<String>,
        missing_keywords: Vec<String>,
        suggestions: Vec<String>,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            candidate_id,
            job_id,
            ats_score,
            status: TaskStatus::Queued,
            assigned_to: None,
            assigned_at: None,
            deadline_at: None,
            started_at: None,
            completed_at: None,
            old_resume_url,
            new_resume_url: None,
            retry_count: 0,
            missing_keywords,
            suggestions,
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Reviewer role. Out of scope for enforcement beyond storage — there is
/// no multi-tenant isolation in this service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Employee,
}

/// A reviewer's availability for assignment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Available,
    Busy,
    Offline,
}

/// A human reviewer, including SLA-compliance counters.
///
/// `warnings` and `violations` are maintained exclusively by the strike
/// machine in [`crate::deadline_monitor`]; nothing else increments them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reviewer {
    pub id: String,
    pub role: Role,
    pub presence: Presence,
    pub warnings: u8,
    pub violations: u8,
    pub tasks_completed: u64,
    pub avg_completion_seconds: f64,
    pub last_heartbeat_at: chrono::DateTime<chrono::Utc>,
    pub active: bool,
    pub current_task_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Reviewer {
    pub fn new(id: String, role: Role) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            role,
            presence: Presence::Offline,
            warnings: 0,
            violations: 0,
            tasks_completed: 0,
            avg_completion_seconds: 0.0,
            last_heartbeat_at: now,
            active: true,
            current_task_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this reviewer can be handed a new task right now.
    pub fn eligible_for_assignment(
        &self,
        presence_ttl: chrono::Duration,
        violations_before_suspension: u8,
        now: chrono::DateTime<chrono::Utc>,
    ) -> bool {
        self.presence == Presence::Available
            && self.active
            && self.current_task_id.is_none()
            && now - self.last_heartbeat_at <= presence_ttl
            && self.violations < violations_before_suspension
    }

    /// Transition into `busy` holding `task_id`. Caller must hold the
    /// reviewer row's lock: a `busy` reviewer always has exactly one
    /// `current_task_id` pointing at the task that put it there.
    pub fn start_task(&mut self, task_id: String) {
        self.presence = Presence::Busy;
        self.current_task_id = Some(task_id);
        self.updated_at = chrono::Utc::now();
    }

    /// Record a completed task and update the running average completion
    /// time via an incremental mean.
    pub fn record_completion(&mut self, completion_seconds: f64) {
        self.current_task_id = None;
        self.tasks_completed += 1;
        self.avg_completion_seconds = (self.avg_completion_seconds
            * (self.tasks_completed - 1) as f64
            + completion_seconds)
            / self.tasks_completed as f64;
        if self.active {
            self.presence = Presence::Available;
        }
        self.updated_at = chrono::Utc::now();
    }

    /// Release the held task without crediting a completion (explicit
    /// reviewer-declared failure, or a requeue by the deadline monitor).
    pub fn release_task(&mut self) {
        self.current_task_id = None;
        if self.active {
            self.presence = Presence::Available;
        }
        self.updated_at = chrono::Utc::now();
    }

    /// Apply the strike machine. Returns the incident kind recorded as a
    /// result; a violation may also trigger a suspension.
    ///
    /// `warnings_before_violation` counts lapses, not the warning field
    /// itself: with the default of 3, the first two lapses accrue warnings
    /// and the third promotes to a violation and resets the count.
    pub fn apply_strike(
        &mut self,
        warnings_before_violation: u8,
        violations_before_suspension: u8,
    ) -> IncidentKind {
        let kind = if self.warnings + 1 < warnings_before_violation {
            self.warnings += 1;
            IncidentKind::Warning
        } else {
            self.warnings = 0;
            self.violations += 1;
            IncidentKind::Violation
        };

        if self.violations >= violations_before_suspension {
            self.active = false;
            self.presence = Presence::Offline;
        }

        self.updated_at = chrono::Utc::now();
        kind
    }

    /// Explicit admin reset: clears the strike counters and re-activates a
    /// suspended reviewer. Nothing else may flip `active` back to `true`.
    pub fn admin_reset(&mut self) {
        self.warnings = 0;
        self.violations = 0;
        self.active = true;
        self.presence = Presence::Offline;
        self.current_task_id = None;
        self.updated_at = chrono::Utc::now();
    }
}

/// Immutable audit row written for every strike, suspension, or reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub reviewer_id: String,
    pub kind: IncidentKind,
    pub reason: String,
    pub task_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Incident {
    pub fn new(
        reviewer_id: String,
        kind: IncidentKind,
        reason: String,
        task_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            reviewer_id,
            kind,
            reason,
            task_id,
            created_at: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    Warning,
    Violation,
    Suspension,
    AdminReset,
    RetriesExhausted,
}

/// Produced on task completion; `(candidate_id, job_id)` is unique and a
/// re-completion updates the row in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub candidate_id: String,
    pub job_id: String,
    pub resume_url: String,
    pub ats_score_at_submission: f64,
    pub auto_submitted: bool,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
}
