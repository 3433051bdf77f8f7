//! End-to-end scenarios threading C1-C7 together, independent of the HTTP
//! transport. Each test (S1-S6) drives the same `TaskStore`/`Assigner`/
//! `DeadlineMonitor`/`ReviewerSession` seams the running service composes
//! in `main.rs`.
use crate::assigner::Assigner;
use crate::bus::EventBus;
use crate::config::DispatchConfig;
use crate::deadline_monitor::DeadlineMonitor;
use crate::gateway::ReviewerSession;
use crate::intake::IntakeApi;
use crate::models::{Presence, Role, TaskStatus};
use crate::store::TaskStore;
use std::sync::Arc;
use std::time::Duration;

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

struct Harness {
    store: Arc<TaskStore>,
    bus: Arc<EventBus>,
    intake: IntakeApi,
    assigner: Assigner,
    monitor: DeadlineMonitor,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(TaskStore::new(test_config()));
        let bus = Arc::new(EventBus::new());
        let intake = IntakeApi::new(store.clone(), bus.clone(), test_config().score_threshold).unwrap();
        let assigner = Assigner::new(store.clone(), bus.clone(), Duration::from_secs(5), test_config().max_retries);
        let monitor = DeadlineMonitor::new(
            store.clone(),
            bus.clone(),
            Duration::from_secs(60),
            test_config().warning_marks,
        );
        Self {
            store,
            bus,
            intake,
            assigner,
            monitor,
        }
    }

    async fn register(&self, reviewer_id: &str) {
        self.store.ensure_reviewer(reviewer_id, Role::Employee).await;
        self.store.set_presence(reviewer_id, Presence::Available).await.unwrap();
    }

    async fn session(&self, reviewer_id: &str) -> ReviewerSession {
        ReviewerSession::connect(
            self.store.clone(),
            self.bus.clone(),
            reviewer_id.to_string(),
            Role::Employee,
            Duration::from_secs(90),
        )
        .await
        .unwrap()
    }

    async fn force_expired(&self, task_id: &str) {
        let mut tasks = self.store.tasks_for_test().lock().await;
        tasks.get_mut(task_id).unwrap().deadline_at = Some(chrono::Utc::now() - chrono::Duration::minutes(1));
    }
}

/// S1: happy path. Task queued, assigned, started, completed; reviewer
/// counters and the resulting Application row reflect the completion.
#[tokio::test]
async fn s1_happy_path() {
    let h = Harness::new();
    h.register("r1").await;

    let task = h
        .intake
        .enqueue_task("cand1".into(), "job1".into(), 0.82, Some("u1".into()), vec![], vec![])
        .await
        .unwrap();

    assert!(h.assigner.assign_one().await.unwrap());
    let assigned = h.store.get_task(&task.id).await.unwrap();
    assert_eq!(assigned.status, TaskStatus::Assigned);
    assert_eq!(assigned.assigned_to.as_deref(), Some("r1"));

    let session = h.session("r1").await;
    session.start(&task.id).await.unwrap();
    let completed = session.complete(&task.id, "u2".to_string(), None).await.unwrap();

    assert_eq!(completed.status, TaskStatus::Completed);
    assert_eq!(completed.new_resume_url.as_deref(), Some("u2"));

    let reviewer = h.store.get_reviewer("r1").await.unwrap();
    assert_eq!(reviewer.tasks_completed, 1);
    assert_eq!(reviewer.presence, Presence::Available);
}

/// S2: deadline expiry produces exactly one warning and requeues the task.
#[tokio::test]
async fn s2_deadline_expiry_warning() {
    let h = Harness::new();
    h.register("r1").await;
    let task = h
        .intake
        .enqueue_task("cand1".into(), "job1".into(), 0.5, None, vec![], vec![])
        .await
        .unwrap();
    h.assigner.assign_one().await.unwrap();
    h.force_expired(&task.id).await;

    h.monitor.sweep_once().await;

    let requeued = h.store.get_task(&task.id).await.unwrap();
    assert_eq!(requeued.status, TaskStatus::Queued);
    assert_eq!(requeued.retry_count, 1);

    let reviewer = h.store.get_reviewer("r1").await.unwrap();
    assert_eq!(reviewer.warnings, 1);
    assert_eq!(reviewer.violations, 0);
    assert_eq!(reviewer.presence, Presence::Available);
}

/// S3: a reviewer already at warnings=2/violations=1 promotes to a
/// violation rather than a third warning, and is not suspended.
#[tokio::test]
async fn s3_warning_promotes_to_violation() {
    let h = Harness::new();
    h.register("r1").await;
    {
        let mut reviewers = h.store.reviewers_for_test().lock().await;
        let reviewer = reviewers.get_mut("r1").unwrap();
        reviewer.warnings = 2;
        reviewer.violations = 1;
    }
    let task = h
        .intake
        .enqueue_task("cand1".into(), "job1".into(), 0.5, None, vec![], vec![])
        .await
        .unwrap();
    h.assigner.assign_one().await.unwrap();
    h.force_expired(&task.id).await;

    h.monitor.sweep_once().await;

    let reviewer = h.store.get_reviewer("r1").await.unwrap();
    assert_eq!(reviewer.warnings, 0);
    assert_eq!(reviewer.violations, 2);
    assert!(reviewer.active);
}

/// S4: the third violation suspends the reviewer, and a subsequent
/// `set_presence(available)` is rejected once suspended.
#[tokio::test]
async fn s4_third_violation_suspends() {
    let h = Harness::new();
    h.register("r1").await;
    {
        let mut reviewers = h.store.reviewers_for_test().lock().await;
        let reviewer = reviewers.get_mut("r1").unwrap();
        reviewer.warnings = 2;
        reviewer.violations = 2;
    }
    let task = h
        .intake
        .enqueue_task("cand1".into(), "job1".into(), 0.5, None, vec![], vec![])
        .await
        .unwrap();
    h.assigner.assign_one().await.unwrap();
    h.force_expired(&task.id).await;

    h.monitor.sweep_once().await;

    let reviewer = h.store.get_reviewer("r1").await.unwrap();
    assert_eq!(reviewer.violations, 3);
    assert_eq!(reviewer.warnings, 0);
    assert!(!reviewer.active);
    assert_eq!(reviewer.presence, Presence::Offline);

    let err = h.store.set_presence("r1", Presence::Available).await.unwrap_err();
    assert!(matches!(err, crate::error::DispatchError::Suspended(_)));
}

/// S5: fairness — the least-loaded of two available reviewers gets the
/// next task; once it is busy, the other takes the next one.
#[tokio::test]
async fn s5_fairness_prefers_least_loaded() {
    let h = Harness::new();
    h.register("ra").await;
    h.register("rb").await;
    {
        let mut reviewers = h.store.reviewers_for_test().lock().await;
        reviewers.get_mut("ra").unwrap().tasks_completed = 10;
        reviewers.get_mut("rb").unwrap().tasks_completed = 3;
    }

    let t1 = h
        .intake
        .enqueue_task("c1".into(), "j1".into(), 0.5, None, vec![], vec![])
        .await
        .unwrap();
    let t2 = h
        .intake
        .enqueue_task("c2".into(), "j2".into(), 0.5, None, vec![], vec![])
        .await
        .unwrap();
    let t3 = h
        .intake
        .enqueue_task("c3".into(), "j3".into(), 0.5, None, vec![], vec![])
        .await
        .unwrap();

    assert!(h.assigner.assign_one().await.unwrap());
    let first = h.store.get_task(&t1.id).await.unwrap();
    assert_eq!(first.assigned_to.as_deref(), Some("rb"));

    assert!(h.assigner.assign_one().await.unwrap());
    let second = h.store.get_task(&t2.id).await.unwrap();
    assert_eq!(second.assigned_to.as_deref(), Some("ra"));

    assert!(!h.assigner.assign_one().await.unwrap());
    let third = h.store.get_task(&t3.id).await.unwrap();
    assert_eq!(third.status, TaskStatus::Queued);
}

/// S6: a reviewer dropping mid-task does not fail it or free it early;
/// the task stays held until the deadline monitor requeues it.
#[tokio::test]
async fn s6_reviewer_drop_mid_task_waits_for_deadline() {
    let h = Harness::new();
    h.register("r1").await;
    let task = h
        .intake
        .enqueue_task("cand1".into(), "job1".into(), 0.5, None, vec![], vec![])
        .await
        .unwrap();
    h.assigner.assign_one().await.unwrap();

    let session = h.session("r1").await;
    session.start(&task.id).await.unwrap();
    session.disconnect().await.unwrap();

    let held = h.store.get_task(&task.id).await.unwrap();
    assert_eq!(held.status, TaskStatus::InProgress);
    let reviewer = h.store.get_reviewer("r1").await.unwrap();
    assert_eq!(reviewer.presence, Presence::Offline);

    h.force_expired(&task.id).await;
    h.monitor.sweep_once().await;

    let requeued = h.store.get_task(&task.id).await.unwrap();
    assert_eq!(requeued.status, TaskStatus::Queued);
    assert_eq!(requeued.retry_count, 1);
    let reviewer = h.store.get_reviewer("r1").await.unwrap();
    assert_eq!(reviewer.warnings, 1);
}
