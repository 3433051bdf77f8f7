//! System-wide default values for the Task Dispatch & SLA Enforcement Core.
//! These are the fallbacks `config::Config` applies when the corresponding
//! environment variable is unset.

use chrono::Duration;

// DISPATCH / SLA DEFAULTS

/// Per-task completion deadline once assigned.
/// Why: 20 minutes covers a realistic resume edit (read suggestions, rewrite
/// a few bullet points, re-check against missing keywords) without letting a
/// slow reviewer hold a task so long the queue backs up behind them.
/// Alternative: 10 min (rejected: not enough time for a non-trivial edit,
/// would inflate the warning rate for reviewers doing real work), 60 min
/// (rejected: a stuck/afk reviewer would sit on a task for an hour before
/// anyone else could pick it up).
pub const DEFAULT_SLA_MINUTES: i64 = 20;

/// Pre-warning marks, in minutes-remaining-until-deadline.
/// Why: three marks give a reviewer an early nudge (5 min), a clear signal
/// work needs to wrap up now (3 min), and a last call before the strike
/// machine fires (1 min).
/// Alternative: a single mark at 5 min (rejected: no escalation, easy to
/// miss one notification), marks denser than 1-minute apart (rejected: spam
/// without a correspondingly faster deadline sweep to observe them).
/// Evaluated most-urgent last so a single sweep emits at most one warning
/// per tick even if several marks are crossed at once.
pub const DEFAULT_WARNING_MARKS: [i64; 3] = [5, 3, 1];

/// How stale a reviewer's heartbeat may be before it is treated as offline.
/// Why: 90s tolerates a couple of missed heartbeat intervals (network
/// hiccup, GC pause) without the assigner routing work to a reviewer who
/// has actually dropped off.
/// Alternative: 30s (rejected: false positives from ordinary jitter), 5 min
/// (rejected: a genuinely dead session would keep absorbing assignment
/// eligibility long after it's gone).
pub const DEFAULT_PRESENCE_TTL_SECS: u64 = 90;

/// Assigner tick interval.
/// Why: 5s keeps the queue draining close to real time without every tick
/// re-scanning the full task/reviewer tables on an idle system.
/// Alternative: 1s (rejected: unnecessary churn when the queue is empty,
/// tick is also triggered event-driven on enqueue/presence anyway), 30s
/// (rejected: visibly sluggish pickup for a human watching the queue).
pub const DEFAULT_ASSIGN_TICK_SECS: u64 = 5;

/// Deadline monitor / pre-warning sweep interval.
/// Why: 60s is granular enough that the 1-minute warning mark and a 20-min
/// SLA don't drift by more than a sweep's worth of slack, without sweeping
/// the full task table every few seconds.
/// Alternative: 10s (rejected: ten times the sweep cost for no material
/// improvement in warning accuracy at minute granularity), 5 min (rejected:
/// a task could sit expired for minutes before the strike machine notices).
pub const DEFAULT_DEADLINE_TICK_SECS: u64 = 60;

/// Retry cap before a task is abandoned with `status=timeout`.
/// Why: three requeues give a task a fair shot across different reviewers
/// before concluding it is unassignable (bad data, impossible job) rather
/// than a one-off reviewer failure.
/// Alternative: 1 (rejected: a single unlucky assignment would abandon
/// otherwise-completable work), unbounded (rejected: a permanently
/// unassignable task would cycle through the queue forever).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Lapses before a violation: the reviewer accrues warnings for the first
/// `DEFAULT_WARNINGS_BEFORE_VIOLATION - 1` lapses; the next one promotes
/// to a violation and resets the warning count.
/// Why: two warnings treat a missed deadline as recoverable (illness,
/// one-off overload); the third compounds into a violation, a more serious
/// audit record than a warning alone.
/// Alternative: 1 (rejected: punishes a single lapse as harshly as a
/// pattern), 5 (rejected: dilutes the violation signal past usefulness).
pub const DEFAULT_WARNINGS_BEFORE_VIOLATION: u8 = 3;

/// Violations tolerated before a reviewer is suspended.
/// Why: three violations (nine total lapses) is a clear pattern, not an
/// unlucky streak, and warrants pulling the reviewer offline pending human
/// admin review rather than continuing to route work to them.
/// Alternative: 1 (rejected: suspends on what could still be a fluke), 10
/// (rejected: lets a chronically unreliable reviewer keep absorbing tasks
/// far past the point the pattern is obvious).
pub const DEFAULT_VIOLATIONS_BEFORE_SUSPENSION: u8 = 3;

/// ATS match score below which a task is queued for human review.
/// Why: 0.90 is the line the upstream scorer and the product have settled
/// on for "confident enough to auto-apply without a human editing pass."
/// Alternative: a lower bar (rejected: would auto-apply with weaker matches
/// than reviewers would accept), a higher bar (rejected: would route
/// confidently-good matches into the human queue for no benefit).
pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.90;

// STORE / RETRY TUNING

/// Backoff cap a real backing store's retry policy would observe for
/// `DispatchError::Transient` (lock-wait/connection timeouts).
/// Why: 10s bounds worst-case retry latency to something a caller's own
/// timeout would tolerate, while still giving a contended lock several
/// chances to clear.
/// Alternative: no cap (rejected: exponential backoff without one can stall
/// a caller far longer than any reasonable request timeout).
/// The in-process store cannot itself time out, so C4/C5 currently retry on
/// their next tick rather than against this cap directly.
pub const TRANSIENT_BACKOFF_CAP_SECS: u64 = 10;

// MEMORY-BOUND AMBIENT CONCERNS
// Sizing is generous enough for a single-process deployment, small enough
// to bound worst-case RAM.

/// Queued tasks awaiting assignment. Past this, intake rejects new tasks
/// with `DispatchError::Transient` rather than grow unbounded.
/// Why: 1000 queued tasks already indicates reviewers can't keep pace;
/// continuing to accept more just delays the inevitable backpressure signal
/// upstream collaborators need.
/// Alternative: 10_000 (rejected: hides a capacity problem for far longer
/// before anything pushes back), no bound (rejected: an unthrottled
/// upstream producer could grow the table without limit).
pub const MAX_QUEUE_SIZE: usize = 1000;

/// Total tasks (any status) retained in memory before the cleanup sweep
/// evicts the oldest terminal rows.
/// Why: 10,000 rows is enough audit/history depth for a single process's
/// working set without the map growing unbounded across a long uptime.
/// Alternative: 1,000 (rejected: too little history for incident review),
/// unbounded (rejected: memory grows forever on a long-lived process).
pub const MAX_STORED_TASKS: usize = 10_000;

/// Total incidents retained before the cleanup sweep evicts the oldest.
/// Why: incidents are smaller and rarer than tasks (one per strike, not per
/// task), so a larger cap than `MAX_STORED_TASKS` still costs less memory
/// while preserving more of the audit trail the strike machine relies on.
/// Alternative: same cap as tasks (rejected: incidents are cheaper to keep,
/// no reason to evict them as eagerly).
pub const MAX_STORED_INCIDENTS: usize = 20_000;

/// How often the cleanup sweep runs.
/// Why: 5 minutes is infrequent enough that the sweep cost is negligible,
/// frequent enough that the store never sits far past its bounds.
/// Alternative: every tick (rejected: wasted scan when nothing is over
/// bound), once an hour (rejected: lets memory overshoot its cap for too
/// long between sweeps).
pub const CLEANUP_INTERVAL_SECS: u64 = 300;

/// Event bus channel capacity (`tokio::sync::broadcast`); a subscriber
/// that falls this far behind is lagged and drops events rather than
/// stalling publishers.
/// Why: 1024 buffered events tolerates a slow UI client through a burst of
/// assignments without ever blocking the publisher, which must never stall
/// on a commit-path event.
/// Alternative: a small buffer like 64 (rejected: an ordinary reconnect
/// burst would lag a client almost immediately), unbounded (rejected:
/// `tokio::sync::broadcast` has no unbounded mode and a slow subscriber
/// would otherwise grow memory without limit).
pub const EVENT_BUS_CHANNEL_CAPACITY: usize = 1024;

/// Default SLA as a [`chrono::Duration`], for call sites that need the
/// unparsed default rather than a loaded `Config`.
pub fn default_sla() -> Duration {
    Duration::minutes(DEFAULT_SLA_MINUTES)
}

/// Default presence TTL as a [`chrono::Duration`].
pub fn default_presence_ttl() -> Duration {
    Duration::seconds(DEFAULT_PRESENCE_TTL_SECS as i64)
}
