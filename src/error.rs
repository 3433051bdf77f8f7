use thiserror::Error;

/// Convenience type alias for Results with [`DispatchError`].
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Main error type for the Task Dispatch & SLA Enforcement Core.
///
/// `Validation`, `NotOwner`, `IllegalTransition`, `Transient`, `Suspended`,
/// and `Fatal` each carry a distinct surfacing/retry policy documented on
/// the variant itself.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Bad input to intake or gateway. Surfaced to the caller, never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Gateway action on a task not held by the calling reviewer. Surfaced, not retried.
    #[error("reviewer {reviewer_id} does not own task {task_id}")]
    NotOwner { task_id: String, reviewer_id: String },

    /// E.g. completing a `queued` task. Surfaced; indicates a client bug.
    #[error("illegal transition on task {task_id}: {message}")]
    IllegalTransition { task_id: String, message: String },

    /// Database timeout, lock wait timeout, or bus publish failure.
    /// Retried by the owning component with exponential backoff capped at
    /// 10s; surfaced to the caller only if the retry budget is exhausted.
    #[error("transient error: {0}")]
    Transient(String),

    /// Any reviewer action while `active=false`. Surfaced; the gateway
    /// should drop the session.
    #[error("reviewer {0} is suspended")]
    Suspended(String),

    /// Schema drift or an invariant violation was detected. Logged, an
    /// incident is written, and the owning component halts.
    #[error("fatal invariant violation: {0}")]
    Fatal(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl DispatchError {
    /// Whether the component that raised this error should retry on the
    /// next tick rather than surface it.
    pub fn is_transient(&self) -> bool {
        matches!(self, DispatchError::Transient(_))
    }
}
