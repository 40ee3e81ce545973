// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admin/Ops HTTP API.
//!
//! Every request body is a closed schema (unknown fields → 422), every
//! path parameter carrying an id passes the identifier guard, and every
//! error is a JSON `{error:{kind,message,detail?}}` body, never a bare
//! 500 and never a partial body.

use crate::state::{AppState, RoutingFlags};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sl_control::{FlowPolicy, RoutePolicy};
use sl_core::{validate_job_id, Clock, CoreError, JobId, JobKind, RunId, SystemClock};
use sl_engine::{OrchestrateRequest, RunStage};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// JSON error envelope.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: CoreError,
}

impl ApiError {
    fn new(status: StatusCode, error: CoreError) -> Self {
        Self { status, error }
    }

    /// Closed-schema violations and unparseable bodies map to 422.
    fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::invalid_input(message),
        )
    }
}

impl From<CoreError> for ApiError {
    fn from(error: CoreError) -> Self {
        let status = StatusCode::from_u16(error.kind.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self { status, error }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "kind": self.error.kind,
                "message": self.error.message,
                "detail": self.error.detail,
            }
        });
        (self.status, Json(body)).into_response()
    }
}

/// Shorthand used by all handlers.
type ApiResult<T> = Result<Json<T>, ApiError>;

/// Extract a validated id from a path parameter.
fn guarded_id(raw: &str) -> Result<JobId, ApiError> {
    validate_job_id(raw).map_err(ApiError::from)?;
    Ok(JobId::new(raw))
}

/// Unwrap a closed-schema JSON body, mapping rejections to 422.
fn closed_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(ApiError::unprocessable(rejection.body_text())),
    }
}

/// Build the full route table.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/experiment/run", post(experiment_run))
        .route("/experiment/status/:job_id", get(experiment_status))
        .route("/experiment/logs/:job_id", get(experiment_logs))
        .route("/experiment/cancel/:job_id", post(experiment_cancel))
        .route("/experiment/jobs", get(experiment_jobs))
        .route("/orchestrate/run", post(orchestrate_run))
        .route("/orchestrate/status", get(orchestrate_status))
        .route("/orchestrate/report", get(orchestrate_report))
        .route("/ops/control/policy", post(control_policy))
        .route("/ops/control/status", get(control_status))
        .route("/ops/routing/flags", post(routing_flags))
        .route("/ops/routing/status", get(routing_status))
        .route("/ops/summary", get(ops_summary))
        .route("/metrics/window60s", get(metrics_window))
        .route("/metrics/series60s", get(metrics_series))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Unmatched routes still answer with the JSON error envelope.
async fn not_found() -> ApiError {
    ApiError::from(CoreError::not_found("no such endpoint"))
}

// ── experiment ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExperimentRunRequest {
    kind: String,
    dataset_name: String,
}

#[derive(Debug, Serialize)]
struct ExperimentRunResponse {
    job_id: JobId,
    status: sl_core::JobStatus,
}

async fn experiment_run(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ExperimentRunRequest>, JsonRejection>,
) -> ApiResult<ExperimentRunResponse> {
    let request = closed_body(body)?;
    let kind: JobKind = request
        .kind
        .parse()
        .map_err(|e: CoreError| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e))?;

    let orchestrate = OrchestrateRequest {
        kind,
        dataset_name: request.dataset_name,
        mode: sl_engine::RunMode::Sim,
        qps: 12.0,
        concurrency: 8,
        window_sec: 30,
        rounds: 2,
        warmup_sec: 5,
        recall_sample: 0.25,
        seed: 42,
        tag: None,
    };
    let (outcome, _plan) = state.orchestrator.commit(&orchestrate).await?;
    Ok(Json(ExperimentRunResponse {
        job_id: outcome.job_id,
        status: outcome.status,
    }))
}

#[derive(Debug, Serialize)]
struct JobView {
    job_id: JobId,
    kind: JobKind,
    status: sl_core::JobStatus,
    queued_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finished_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    queue_position: Option<u32>,
    #[serde(skip_serializing_if = "std::collections::HashMap::is_empty")]
    artifacts: std::collections::HashMap<String, String>,
}

impl JobView {
    fn from_job(job: sl_core::Job, queue_position: Option<u32>) -> Self {
        Self {
            job_id: job.id,
            kind: job.kind,
            status: job.status,
            queued_at_ms: job.queued_at_ms,
            started_at_ms: job.started_at_ms,
            finished_at_ms: job.finished_at_ms,
            reason: job.reason,
            queue_position,
            artifacts: job.artifacts,
        }
    }
}

async fn experiment_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<JobView> {
    let id = guarded_id(&job_id)?;
    let detail = state.manager.detail(&id)?;
    Ok(Json(JobView::from_job(detail.job, detail.queue_position)))
}

#[derive(Debug, Deserialize)]
struct TailQuery {
    #[serde(default = "default_tail")]
    tail: usize,
}

fn default_tail() -> usize {
    100
}

async fn experiment_logs(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Query(query): Query<TailQuery>,
) -> ApiResult<sl_engine::manager::LogsTail> {
    let id = guarded_id(&job_id)?;
    Ok(Json(state.manager.logs(&id, query.tail)?))
}

async fn experiment_cancel(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<sl_engine::manager::CancelOutcome> {
    let id = guarded_id(&job_id)?;
    Ok(Json(state.manager.cancel(&id).await?))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

async fn experiment_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<JobView>> {
    let jobs = state
        .manager
        .list(query.limit.clamp(1, 500))
        .into_iter()
        .map(|job| {
            let position = state.store.queue_position(&job.id);
            JobView::from_job(job, position)
        })
        .collect();
    Ok(Json(jobs))
}

// ── orchestrate ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CommitQuery {
    #[serde(default)]
    commit: bool,
}

async fn orchestrate_run(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CommitQuery>,
    body: Result<Json<OrchestrateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = closed_body(body)?;

    if !query.commit {
        let plan = state.orchestrator.dry_run(&request)?;
        return Ok(Json(json!({"committed": false, "plan": plan})).into_response());
    }

    let (outcome, plan) = state.orchestrator.commit(&request).await?;
    let queue_position = state.store.queue_position(&outcome.job_id);
    Ok(Json(json!({
        "committed": true,
        "run_id": outcome.job_id,
        "status": outcome.status,
        "deduplicated": outcome.deduplicated,
        "queue_position": queue_position,
        "fingerprint": plan.fingerprint,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
struct RunIdQuery {
    run_id: String,
}

#[derive(Debug, Serialize)]
struct OrchestrateStatusResponse {
    run_id: RunId,
    status: sl_core::JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<RunStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    queue_position: Option<u32>,
}

async fn orchestrate_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RunIdQuery>,
) -> ApiResult<OrchestrateStatusResponse> {
    validate_job_id(&query.run_id)?;
    let run_id = RunId::new(&query.run_id);
    let (status, stage, queue_position) = state.orchestrator.status(&run_id)?;
    Ok(Json(OrchestrateStatusResponse {
        run_id,
        status,
        stage,
        queue_position,
    }))
}

async fn orchestrate_report(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RunIdQuery>,
) -> ApiResult<serde_json::Value> {
    validate_job_id(&query.run_id)?;
    let id = JobId::new(&query.run_id);
    let job = state.manager.status(&id)?;

    if job.artifacts.is_empty() {
        return Err(ApiError::from(
            CoreError::not_found(format!("run {id} has no artifacts yet"))
                .with_detail(format!("status is {}", job.status)),
        ));
    }

    // Inline the verdict from winners.json when present. The relative
    // artifact path comes from persisted state, so it passes the path
    // guard before any read.
    let verdict = job
        .artifacts
        .get("winners")
        .and_then(|rel| {
            let rel = std::path::Path::new(rel)
                .strip_prefix("reports")
                .unwrap_or_else(|_| std::path::Path::new(rel));
            sl_core::validate_path(state.orchestrator.reports_root(), rel).ok()
        })
        .and_then(|path| std::fs::read(path).ok())
        .and_then(|raw| serde_json::from_slice::<serde_json::Value>(&raw).ok())
        .map(|winners| winners["verdict"].clone());

    Ok(Json(json!({
        "run_id": id,
        "status": job.status,
        "artifacts": job.artifacts,
        "verdict": verdict,
    })))
}

// ── ops ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ControlPolicyRequest {
    policy: FlowPolicy,
}

async fn control_policy(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ControlPolicyRequest>, JsonRejection>,
) -> ApiResult<serde_json::Value> {
    let request = closed_body(body)?;
    state.flow.lock().set_policy(request.policy);
    Ok(Json(json!({"policy": request.policy})))
}

async fn control_status(State(state): State<Arc<AppState>>) -> ApiResult<serde_json::Value> {
    let flow = state.flow.lock();
    Ok(Json(json!({
        "policy": flow.policy(),
        "decisions": flow.decisions(),
        "metrics_seen": flow.metrics_seen(),
        "recommendation": flow.recommend(),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RoutingFlagsRequest {
    enabled: bool,
    mode: RoutePolicy,
    #[serde(default)]
    manual_backend: Option<sl_control::Backend>,
}

async fn routing_flags(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RoutingFlagsRequest>, JsonRejection>,
) -> ApiResult<RoutingFlags> {
    let request = closed_body(body)?;
    let flags = RoutingFlags {
        enabled: request.enabled,
        mode: request.mode,
        manual_backend: request.manual_backend,
    };
    *state.routing_flags.lock() = flags;
    state.router.lock().set_policy(request.mode);
    Ok(Json(flags))
}

async fn routing_status(State(state): State<Arc<AppState>>) -> ApiResult<serde_json::Value> {
    let flags = *state.routing_flags.lock();
    let stats = state.router.lock().stats();
    Ok(Json(json!({
        "flags": flags,
        "stats": stats,
    })))
}

async fn ops_summary(State(state): State<Arc<AppState>>) -> ApiResult<serde_json::Value> {
    let now_ms = SystemClock.epoch_ms();
    let window = state.hub.window_60s(now_ms);
    let series = state.hub.series_60s(now_ms);
    let running = state.store.running().ok().flatten();
    Ok(Json(json!({
        "ok": true,
        "uptime_sec": state.uptime_sec(),
        "window60s": window,
        "series60s": {
            "buckets": series.buckets.len(),
            "non_empty": series.meta.non_empty_buckets,
            "step_sec": series.step_sec,
        },
        "running_job": running.map(|j| j.id),
        "queued_jobs": state.store.queued().len(),
    })))
}

// ── metrics ─────────────────────────────────────────────────────────────────

async fn metrics_window(State(state): State<Arc<AppState>>) -> ApiResult<sl_engine::WindowSnapshot> {
    Ok(Json(state.hub.window_60s(SystemClock.epoch_ms())))
}

async fn metrics_series(State(state): State<Arc<AppState>>) -> ApiResult<sl_engine::SeriesSnapshot> {
    Ok(Json(state.hub.series_60s(SystemClock.epoch_ms())))
}

// ── health ──────────────────────────────────────────────────────────────────

async fn healthz(State(state): State<Arc<AppState>>) -> ApiResult<serde_json::Value> {
    Ok(Json(json!({"ok": true, "uptime_sec": state.uptime_sec()})))
}

async fn readyz(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    if state.ready.load(Ordering::SeqCst) {
        Ok(Json(json!({"ready": true})).into_response())
    } else {
        Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"ready": false})),
        )
            .into_response())
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
