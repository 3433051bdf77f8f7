//! HTTP/WebSocket transport: `ApiServer`/`build_router` wire the same
//! middleware stack, `ErrorResponse` shape, and `health_check` convention
//! across this core's own routes. Layering is outermost-first: `trace` →
//! `cors` wrap the whole router, then the `protected` sub-stack applies
//! `rate_limit` → `auth` in front of the routes that need them, so a
//! request actually passes through trace → cors → rate_limit → auth →
//! handler.
use crate::assigner::Assigner;
use crate::auth::{auth_middleware, create_auth_state};
use crate::bus::{DispatchEvent, EventBus};
use crate::config::{ApiConfig, Config};
use crate::deadline_monitor::DeadlineMonitor;
use crate::error::{DispatchError, Result};
use crate::gateway::ReviewerSession;
use crate::intake::IntakeApi;
use crate::models::{Presence, Reviewer, Task};
use crate::monitoring::SystemMonitor;
use crate::rate_limit::{rate_limit_middleware, RateLimitConfig};
use crate::store::TaskStore;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    middleware,
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "task-dispatch-core";
const SERVICE_VERSION: &str = "0.1.0";

const ROUTE_HEALTH: &str = "/health";
const ROUTE_TASKS: &str = "/tasks";
const ROUTE_TASK_BY_ID: &str = "/tasks/{task_id}";
const ROUTE_INGEST_SCORE: &str = "/ingest-score";
const ROUTE_REVIEWER_BY_ID: &str = "/reviewers/{reviewer_id}";
const ROUTE_REVIEWER_PRESENCE: &str = "/reviewers/{reviewer_id}/presence";
const ROUTE_REVIEWER_ACTIONS: &str = "/reviewers/{reviewer_id}/actions";
const ROUTE_REVIEWER_HEARTBEAT: &str = "/reviewers/{reviewer_id}/heartbeat";
const ROUTE_REVIEWER_RESET: &str = "/reviewers/{reviewer_id}/reset";
const ROUTE_SYSTEM_STATUS: &str = "/system/status";
const ROUTE_EVENTS: &str = "/events";

#[derive(Clone)]
pub struct ApiServer {
    config: ApiConfig,
    store: Arc<TaskStore>,
    bus: Arc<EventBus>,
    intake: Arc<IntakeApi>,
    monitor: Arc<SystemMonitor>,
    presence_ttl: Duration,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}

type ApiResult<T> = std::result::Result<T, (StatusCode, Json<ErrorResponse>)>;

/// Maps each error kind's surfacing policy onto an HTTP status code.
/// `Transient`/`Fatal` never reach a handler directly — C4/C5 retry or
/// halt internally — but the mapping is exhaustive in case a future
/// caller (e.g. an admin endpoint) surfaces one.
fn error_response(err: DispatchError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
        DispatchError::NotOwner { .. } => StatusCode::FORBIDDEN,
        DispatchError::IllegalTransition { .. } => StatusCode::CONFLICT,
        DispatchError::Suspended(_) => StatusCode::FORBIDDEN,
        DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
        DispatchError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        DispatchError::Unauthorized => StatusCode::UNAUTHORIZED,
        DispatchError::Configuration(_) | DispatchError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        DispatchError::Serialization(_) | DispatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            details: None,
        }),
    )
}

impl ApiServer {
    pub fn new(config: Config, store: Arc<TaskStore>, bus: Arc<EventBus>) -> Result<Self> {
        let intake = Arc::new(IntakeApi::new(
            store.clone(),
            bus.clone(),
            config.dispatch.score_threshold,
        )?);
        let monitor = Arc::new(SystemMonitor::new(store.clone(), bus.clone()));
        let presence_ttl = Duration::from_secs(config.dispatch.presence_ttl_secs);
        Ok(Self {
            config: config.api,
            store,
            bus,
            intake,
            monitor,
            presence_ttl,
        })
    }

    pub async fn run(&self) -> Result<()> {
        let app = self.build_router();
        let listener = tokio::net::TcpListener::bind(format!("{}:{}", self.config.host, self.config.port))
            .await
            .map_err(|e| DispatchError::Internal(e.into()))?;

        info!("API server listening on {}:{}", self.config.host, self.config.port);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .await
        .map_err(|e| DispatchError::Internal(e.into()))?;

        Ok(())
    }

    /// Order matters: trace -> CORS -> rate limit -> auth -> routes. The
    /// outer `ServiceBuilder` (trace, CORS) wraps the merged router, so it
    /// runs before the `protected` sub-stack's own layers (rate limit,
    /// auth) ever see the request. `/health` is deliberately outside the
    /// `protected` stack: liveness probes must not depend on API-key
    /// configuration, though trace/CORS still apply to it.
    pub fn build_router(&self) -> Router {
        let auth_state = create_auth_state(self.config.clone());
        let rate_limit_config = RateLimitConfig::new();
        let cors_layer = CorsLayer::new()
            .allow_origin(
                self.config
                    .allowed_origins
                    .iter()
                    .filter_map(|origin| origin.parse().ok())
                    .collect::<Vec<_>>(),
            )
            .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::header::AUTHORIZATION,
                axum::http::HeaderName::from_static("x-api-key"),
            ])
            .max_age(Duration::from_secs(3600));

        let protected = Router::new()
            .route(ROUTE_TASKS, post(enqueue_task))
            .route(ROUTE_TASK_BY_ID, get(get_task))
            .route(ROUTE_INGEST_SCORE, post(ingest_score))
            .route(ROUTE_REVIEWER_BY_ID, get(get_reviewer))
            .route(ROUTE_REVIEWER_PRESENCE, post(set_presence))
            .route(ROUTE_REVIEWER_ACTIONS, post(reviewer_action))
            .route(ROUTE_REVIEWER_HEARTBEAT, post(reviewer_heartbeat))
            .route(ROUTE_REVIEWER_RESET, post(admin_reset_reviewer))
            .route(ROUTE_SYSTEM_STATUS, get(system_status))
            .route(ROUTE_EVENTS, get(events_ws))
            .layer(
                ServiceBuilder::new()
                    .layer(middleware::from_fn_with_state(rate_limit_config, rate_limit_middleware))
                    .layer(middleware::from_fn_with_state(auth_state, auth_middleware)),
            );

        Router::new()
            .route(ROUTE_HEALTH, get(health_check))
            .merge(protected)
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors_layer))
            .with_state(self.clone())
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": SERVICE_VERSION,
    }))
}

// --- C3 Intake -------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct EnqueueTaskRequest {
    pub candidate_id: String,
    pub job_id: String,
    pub ats_score: f64,
    #[serde(default)]
    pub missing_keywords: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    pub old_resume_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnqueueTaskResponse {
    pub task_id: String,
}

/// Queues a task for human review.
async fn enqueue_task(
    State(api): State<ApiServer>,
    Json(req): Json<EnqueueTaskRequest>,
) -> ApiResult<(StatusCode, Json<EnqueueTaskResponse>)> {
    let task = api
        .intake
        .enqueue_task(
            req.candidate_id,
            req.job_id,
            req.ats_score,
            req.old_resume_url,
            req.missing_keywords,
            req.suggestions,
        )
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(EnqueueTaskResponse { task_id: task.id })))
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestScoreResponse {
    Queued { task_id: String },
    AutoApply,
}

/// Convenience split on the score threshold ahead of `enqueue_task`.
async fn ingest_score(
    State(api): State<ApiServer>,
    Json(req): Json<EnqueueTaskRequest>,
) -> ApiResult<Json<IngestScoreResponse>> {
    let outcome = api
        .intake
        .ingest_score(
            req.candidate_id,
            req.job_id,
            req.ats_score,
            req.old_resume_url,
            req.missing_keywords,
            req.suggestions,
        )
        .await
        .map_err(error_response)?;
    Ok(Json(match outcome {
        crate::intake::IngestOutcome::Queued(task) => IngestScoreResponse::Queued { task_id: task.id },
        crate::intake::IngestOutcome::AutoApply => IngestScoreResponse::AutoApply,
    }))
}

async fn get_task(State(api): State<ApiServer>, Path(task_id): Path<String>) -> ApiResult<Json<Task>> {
    let task = api.store.get_task(&task_id).await.map_err(error_response)?;
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
pub struct PresenceRequest {
    pub presence: Presence,
}

/// Sets a reviewer's presence.
async fn set_presence(
    State(api): State<ApiServer>,
    Path(reviewer_id): Path<String>,
    Json(req): Json<PresenceRequest>,
) -> ApiResult<StatusCode> {
    api.intake
        .set_presence(&reviewer_id, req.presence)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_reviewer(State(api): State<ApiServer>, Path(reviewer_id): Path<String>) -> ApiResult<Json<Reviewer>> {
    let reviewer = api.store.get_reviewer(&reviewer_id).await.map_err(error_response)?;
    Ok(Json(reviewer))
}

async fn reviewer_heartbeat(State(api): State<ApiServer>, Path(reviewer_id): Path<String>) -> ApiResult<StatusCode> {
    api.store.heartbeat(&reviewer_id).await.map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub reviewer: Reviewer,
}

/// Administrative reset: clears a reviewer's strike counters and
/// restores them to active duty.
async fn admin_reset_reviewer(
    State(api): State<ApiServer>,
    Path(reviewer_id): Path<String>,
) -> ApiResult<Json<ResetResponse>> {
    let reviewer = api.store.admin_reset_reviewer(&reviewer_id).await.map_err(error_response)?;
    Ok(Json(ResetResponse { reviewer }))
}

// --- C7 Reviewer Gateway ----------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewerActionKind {
    Start,
    Complete,
    Fail,
}

#[derive(Debug, Deserialize)]
pub struct ReviewerActionRequest {
    pub action: ReviewerActionKind,
    pub task_id: String,
    pub new_resume_url: Option<String>,
    pub notes: Option<String>,
    pub reason: Option<String>,
}

/// Dispatches a reviewer action through the ownership-checked gateway.
/// Every call attaches a fresh [`ReviewerSession`] rather than holding
/// one across requests — this transport has no persistent connection,
/// so there is nothing to cache and nothing to leak between requests.
async fn reviewer_action(
    State(api): State<ApiServer>,
    Path(reviewer_id): Path<String>,
    Json(req): Json<ReviewerActionRequest>,
) -> ApiResult<Json<Task>> {
    let session = ReviewerSession::attach(api.store.clone(), api.bus.clone(), reviewer_id, api.presence_ttl)
        .map_err(error_response)?;

    let task = match req.action {
        ReviewerActionKind::Start => session.start(&req.task_id).await,
        ReviewerActionKind::Complete => {
            let new_resume_url = req.new_resume_url.ok_or_else(|| {
                DispatchError::Validation("new_resume_url is required for complete".to_string())
            });
            match new_resume_url {
                Ok(url) => session.complete(&req.task_id, url, req.notes).await,
                Err(e) => Err(e),
            }
        }
        ReviewerActionKind::Fail => {
            let reason = req.reason.unwrap_or_else(|| "no reason given".to_string());
            session.fail(&req.task_id, reason).await
        }
    }
    .map_err(error_response)?;

    Ok(Json(task))
}

// --- Ambient observability ---------------------------------------------------

async fn system_status(State(api): State<ApiServer>) -> Json<crate::monitoring::SystemStatus> {
    Json(api.monitor.status().await)
}

/// `GET /events`: every connection subscribes independently to the
/// `EventBus` and receives the same `DispatchEvent` stream UI clients and
/// C7 sessions observe in-process. A lagging client is dropped from the
/// broadcast rather than stalling publishers.
async fn events_ws(ws: WebSocketUpgrade, State(api): State<ApiServer>) -> Response {
    ws.on_upgrade(move |socket| stream_events(socket, api.bus.clone()))
}

async fn stream_events(mut socket: WebSocket, bus: Arc<EventBus>) {
    let mut rx = bus.subscribe();
    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        let Ok(payload) = serde_json::to_string(&event) else { continue };
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            return;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "events websocket client lagged, dropping buffered events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Err(e)) => {
                        error!(error = %e, "events websocket read error");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Wires the two background loops (C4 Assigner, C5/C6 Deadline Monitor)
/// into the given set of cooperating tasks, composed via `tokio::select!`
/// in `main.rs`.
pub fn spawn_background_loops(
    store: Arc<TaskStore>,
    bus: Arc<EventBus>,
    dispatch_config: &crate::config::DispatchConfig,
) -> (tokio::task::JoinHandle<Result<()>>, tokio::task::JoinHandle<Result<()>>) {
    let assigner = Assigner::new(
        store.clone(),
        bus.clone(),
        Duration::from_secs(dispatch_config.assign_tick_secs),
        dispatch_config.max_retries,
    );
    let monitor = DeadlineMonitor::new(
        store,
        bus,
        Duration::from_secs(dispatch_config.deadline_tick_secs),
        dispatch_config.warning_marks.clone(),
    );

    let assigner_handle = tokio::spawn(async move { assigner.run().await });
    let monitor_handle = tokio::spawn(async move { monitor.run().await });
    (assigner_handle, monitor_handle)
}

/// Presence watchdog: a fifth background loop alongside the assigner,
/// deadline monitor, and cleanup sweep. A gateway session that vanishes
/// without a clean `disconnect` (crash, dropped connection, client that
/// stops sending heartbeats) never calls `set_presence` itself, so a dead
/// reviewer would otherwise stay `available`/`busy` forever. Every
/// `presence_ttl` interval this sweeps `stale_reviewer_ids` and flips each
/// one to `offline`, publishing `reviewer.presence` exactly like a
/// session's own `disconnect` does.
pub fn spawn_presence_watchdog(
    store: Arc<TaskStore>,
    bus: Arc<EventBus>,
    presence_ttl: Duration,
) -> tokio::task::JoinHandle<Result<()>> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(presence_ttl);
        loop {
            ticker.tick().await;
            for reviewer_id in store.stale_reviewer_ids().await {
                match store.set_presence(&reviewer_id, Presence::Offline).await {
                    Ok(reviewer) => {
                        bus.publish(DispatchEvent::ReviewerPresence {
                            reviewer_id: reviewer.id,
                            presence: reviewer.presence,
                        });
                    }
                    Err(e) => {
                        warn!(reviewer_id = %reviewer_id, error = %e, "presence watchdog failed to mark reviewer offline");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use tower::ServiceExt;

    fn test_config() -> Config {
        Config {
            dispatch: DispatchConfig {
                sla_minutes: 20,
                warning_marks: vec![5, 3, 1],
                presence_ttl_secs: 90,
                assign_tick_secs: 5,
                deadline_tick_secs: 60,
                max_retries: 3,
                warnings_before_violation: 3,
                violations_before_suspension: 3,
                score_threshold: 0.90,
            },
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                api_key: Some("a".repeat(32)),
                enable_auth: true,
                allowed_origins: vec!["http://localhost:3000".to_string()],
            },
        }
    }

    #[tokio::test]
    async fn health_check_does_not_require_auth() {
        let store = Arc::new(TaskStore::new(test_config().dispatch));
        let bus = Arc::new(EventBus::new());
        let api = ApiServer::new(test_config(), store, bus).unwrap();
        let router = api.build_router();

        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri(ROUTE_HEALTH)
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_route_rejects_missing_api_key() {
        let store = Arc::new(TaskStore::new(test_config().dispatch));
        let bus = Arc::new(EventBus::new());
        let api = ApiServer::new(test_config(), store, bus).unwrap();
        let router = api.build_router();

        let body = serde_json::json!({
            "candidate_id": "c1",
            "job_id": "j1",
            "ats_score": 0.5,
        });
        // `.oneshot()` bypasses `into_make_service_with_connect_info`, so the
        // rate limiter's `ConnectInfo` extractor needs its extension seeded
        // by hand, matching axum's own testing idiom for this.
        let peer = std::net::SocketAddr::from(([127, 0, 0, 1], 0));
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri(ROUTE_TASKS)
                    .header("content-type", "application/json")
                    .extension(axum::extract::ConnectInfo(peer))
                    .body(axum::body::Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
