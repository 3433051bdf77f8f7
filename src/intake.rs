//! C3 Intake API — the three collaborator-facing write paths ahead of the
//! Task Store: `enqueue_task`, `set_presence`, and the `ingest_score`
//! convenience split. Each is a thin validated wrapper that delegates to
//! the store and then publishes on success.
use crate::bus::{DispatchEvent, EventBus};
use crate::error::{DispatchError, Result};
use crate::models::{Presence, Task};
use crate::store::TaskStore;
use crate::validation::ContentValidator;
use std::sync::Arc;

pub struct IntakeApi {
    store: Arc<TaskStore>,
    bus: Arc<EventBus>,
    validator: ContentValidator,
    score_threshold: f64,
}

impl IntakeApi {
    pub fn new(store: Arc<TaskStore>, bus: Arc<EventBus>, score_threshold: f64) -> Result<Self> {
        Ok(Self {
            store,
            bus,
            validator: ContentValidator::new()?,
            score_threshold,
        })
    }

    /// `enqueue_task`. Not idempotent: every call creates a new task, even
    /// for a repeated `(candidate_id, job_id)` pair — deduplication is the
    /// collaborator's responsibility.
    pub async fn enqueue_task(
        &self,
        candidate_id: String,
        job_id: String,
        ats_score: f64,
        old_resume_url: Option<String>,
        missing_keywords: Vec<String>,
        suggestions: Vec<String>,
    ) -> Result<Task> {
        if candidate_id.trim().is_empty() || job_id.trim().is_empty() {
            return Err(DispatchError::Validation(
                "candidate_id and job_id are required".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&ats_score) {
            return Err(DispatchError::Validation(
                "ats_score must be within [0, 1]".to_string(),
            ));
        }
        if ats_score >= self.score_threshold {
            return Err(DispatchError::Validation(format!(
                "ScoreAboveThreshold: {ats_score} >= {}",
                self.score_threshold
            )));
        }

        let missing_keywords = self.validator.sanitize_notes(missing_keywords)?;
        let suggestions = self.validator.sanitize_notes(suggestions)?;

        let task = self
            .store
            .enqueue(
                candidate_id,
                job_id,
                ats_score,
                old_resume_url,
                missing_keywords,
                suggestions,
            )
            .await?;

        self.bus.publish(DispatchEvent::TaskEnqueued {
            task_id: task.id.clone(),
        });
        Ok(task)
    }

    /// `ingest_score`: splits on the score threshold. Below it, this is
    /// exactly `enqueue_task`. At or above it, the Task Store is never
    /// touched — the caller forwards straight to the auto-apply
    /// collaborator, which is out of scope for this core.
    pub async fn ingest_score(
        &self,
        candidate_id: String,
        job_id: String,
        ats_score: f64,
        old_resume_url: Option<String>,
        missing_keywords: Vec<String>,
        suggestions: Vec<String>,
    ) -> Result<IngestOutcome> {
        if ats_score >= self.score_threshold {
            return Ok(IngestOutcome::AutoApply);
        }
        let task = self
            .enqueue_task(
                candidate_id,
                job_id,
                ats_score,
                old_resume_url,
                missing_keywords,
                suggestions,
            )
            .await?;
        Ok(IngestOutcome::Queued(task))
    }

    /// `set_presence`. Idempotent: stores the latest value.
    pub async fn set_presence(&self, reviewer_id: &str, presence: Presence) -> Result<()> {
        let reviewer = self.store.set_presence(reviewer_id, presence).await?;
        self.bus.publish(DispatchEvent::ReviewerPresence {
            reviewer_id: reviewer.id,
            presence: reviewer.presence,
        });
        Ok(())
    }
}

/// Result of `ingest_score`: either the task was queued for human review,
/// or the score cleared the threshold and bypasses this core entirely.
pub enum IngestOutcome {
    Queued(Task),
    AutoApply,
}
