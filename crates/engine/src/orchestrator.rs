// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run orchestration: plan → commit → execute → report.
//!
//! Planning is pure; commit persists a queued job through the manager;
//! execution is a linear state machine driving the load generator through
//! warmup and alternating A/B phases, then aggregation, winner selection,
//! and artifact reporting. Cancellation is observed before every phase.

use crate::error::EngineError;
use crate::loadgen::{
    build_plan, LoadGenerator, PhaseSpec, PhaseReport, SearchBackend, SimBackend, SimProfile,
    TopkMix,
};
use crate::manager::{JobManager, SubmitOutcome};
use crate::metrics::MetricsHub;
use crate::registry::{DatasetEntry, DatasetRegistry};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sl_control::bandit::{
    ab_alignment, apply_reward, compute_reward, drift_audit, select_arm, AbMeasurement,
    ArmMetrics, RewardInput, RewardWeights, SelectConfig, UpdateConfig,
};
use sl_control::winners::{pick_gated_winners, pick_winners, Candidate, SweepGates, WinnerSet};
use sl_control::{FlowController, FlowMetrics, Router};
use sl_core::{
    Clock, CoreError, JobKind, JobStatus, Phase, RunEvent, RunEventKind, RunId, SystemClock,
};
use sl_storage::{BanditStore, EventLog, PolicyCatalog, SlaPolicyStore};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Which backend the run drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Simulated backend, explicitly selected by the operator.
    Sim,
    /// Live backend at `RAG_API_BASE`.
    Http,
}

impl Default for RunMode {
    fn default() -> Self {
        RunMode::Sim
    }
}

/// Orchestration request. The wire schema is closed: unknown fields are
/// rejected at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestrateRequest {
    pub kind: JobKind,
    pub dataset_name: String,
    #[serde(default)]
    pub mode: RunMode,
    #[serde(default = "default_qps")]
    pub qps: f64,
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    #[serde(default = "default_window_sec")]
    pub window_sec: u32,
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    #[serde(default = "default_warmup_sec")]
    pub warmup_sec: u32,
    #[serde(default = "default_recall_sample")]
    pub recall_sample: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

fn default_qps() -> f64 {
    12.0
}
fn default_concurrency() -> u32 {
    8
}
fn default_window_sec() -> u32 {
    30
}
fn default_rounds() -> u32 {
    2
}
fn default_warmup_sec() -> u32 {
    5
}
fn default_recall_sample() -> f64 {
    0.25
}
fn default_seed() -> u64 {
    42
}

impl OrchestrateRequest {
    /// Clamp every field into its valid range. Idempotent, so planning a
    /// planned request is a fixpoint.
    pub fn normalized(&self) -> Self {
        Self {
            kind: self.kind,
            dataset_name: self.dataset_name.trim().to_string(),
            mode: self.mode,
            qps: self.qps.clamp(0.1, 500.0),
            concurrency: self.concurrency.clamp(1, 256),
            window_sec: self.window_sec.clamp(1, 600),
            rounds: self.rounds.clamp(1, 10),
            warmup_sec: self.warmup_sec.min(120),
            recall_sample: self.recall_sample.clamp(0.0, 1.0),
            seed: self.seed,
            tag: self
                .tag
                .as_ref()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        }
    }
}

/// Result of planning a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPlan {
    pub request: OrchestrateRequest,
    pub dataset: DatasetEntry,
    pub fingerprint: String,
    pub phases: Vec<String>,
    pub estimated_requests: u64,
    pub estimated_duration_sec: u64,
}

/// Execution stages of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStage {
    Pending,
    Warmup,
    PhaseA,
    PhaseB,
    Aggregate,
    Winners,
    Report,
    Done,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStage::Pending => "PENDING",
            RunStage::Warmup => "WARMUP",
            RunStage::PhaseA => "PHASE_A",
            RunStage::PhaseB => "PHASE_B",
            RunStage::Aggregate => "AGGREGATE",
            RunStage::Winners => "WINNERS",
            RunStage::Report => "REPORT",
            RunStage::Done => "DONE",
        }
    }
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared run-stage map for the status endpoint.
#[derive(Debug, Clone, Default)]
pub struct StageTracker {
    inner: Arc<Mutex<HashMap<String, RunStage>>>,
}

impl StageTracker {
    pub fn set(&self, run_id: &RunId, stage: RunStage) {
        self.inner
            .lock()
            .insert(run_id.as_str().to_string(), stage);
    }

    pub fn get(&self, run_id: &RunId) -> Option<RunStage> {
        self.inner.lock().get(run_id.as_str()).copied()
    }
}

/// Orchestrator tunables.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub reports_dir: PathBuf,
    pub run_tag: Option<String>,
    pub target_p95_ms: f64,
    pub reward_weights: RewardWeights,
    pub select: SelectConfig,
    pub update: UpdateConfig,
    /// Estimated per-query cost for the baseline and variant sides.
    pub cost_per_query_a: f64,
    pub cost_per_query_b: f64,
    /// Live backend base URL (`RAG_API_BASE`); required for http mode.
    pub rag_api_base: Option<String>,
    /// Per-request deadline against the live backend.
    pub request_deadline: Duration,
    /// Run sim phases without real latency sleeps (tests).
    pub sim_instant: bool,
}

impl OrchestratorConfig {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
            run_tag: None,
            target_p95_ms: 120.0,
            reward_weights: RewardWeights::default(),
            select: SelectConfig::default(),
            update: UpdateConfig::default(),
            cost_per_query_a: 3e-5,
            cost_per_query_b: 5e-5,
            rag_api_base: None,
            request_deadline: Duration::from_secs(5),
            sim_instant: false,
        }
    }
}

/// The orchestrator owns the router and controllers; the load generator
/// reads router decisions, and the ops API swaps policies through the
/// shared cells.
pub struct Orchestrator {
    registry: DatasetRegistry,
    manager: Arc<JobManager>,
    events: Arc<EventLog>,
    hub: Arc<MetricsHub>,
    flow: Arc<Mutex<FlowController>>,
    router: Arc<Mutex<Router>>,
    bandit: Arc<BanditStore>,
    catalog: PolicyCatalog,
    sla_store: Arc<SlaPolicyStore>,
    stages: StageTracker,
    config: OrchestratorConfig,
    plans: Mutex<HashMap<String, RunPlan>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: DatasetRegistry,
        manager: Arc<JobManager>,
        events: Arc<EventLog>,
        hub: Arc<MetricsHub>,
        flow: Arc<Mutex<FlowController>>,
        router: Arc<Mutex<Router>>,
        bandit: Arc<BanditStore>,
        catalog: PolicyCatalog,
        sla_store: Arc<SlaPolicyStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            manager,
            events,
            hub,
            flow,
            router,
            bandit,
            catalog,
            sla_store,
            stages: StageTracker::default(),
            config,
            plans: Mutex::new(HashMap::new()),
        }
    }

    pub fn stages(&self) -> &StageTracker {
        &self.stages
    }

    pub fn reports_root(&self) -> &std::path::Path {
        &self.config.reports_dir
    }

    pub fn manager(&self) -> &Arc<JobManager> {
        &self.manager
    }

    /// Pure planning: normalize, resolve the dataset, fingerprint, and
    /// estimate the run.
    pub fn plan(&self, request: &OrchestrateRequest) -> Result<RunPlan, CoreError> {
        let request = request.normalized();
        if request.mode == RunMode::Http && self.config.rag_api_base.is_none() {
            return Err(CoreError::invalid_input(
                "http mode requires RAG_API_BASE to be configured",
            ));
        }
        let dataset = self.registry.resolve(&request.dataset_name)?.clone();

        let params = serde_json::to_value(&request)
            .map_err(|e| CoreError::invalid_input(format!("unserializable request: {e}")))?;
        let fingerprint = crate::manager::fingerprint(request.kind, &params);

        let mut phases = vec![RunStage::Warmup.as_str().to_string()];
        for _ in 0..request.rounds {
            phases.push(RunStage::PhaseA.as_str().to_string());
            phases.push(RunStage::PhaseB.as_str().to_string());
        }

        let phase_count = (request.rounds * 2) as u64;
        let estimated_requests =
            (request.qps * request.window_sec as f64).ceil() as u64 * phase_count;
        let estimated_duration_sec =
            request.warmup_sec as u64 + request.window_sec as u64 * phase_count;

        Ok(RunPlan {
            request,
            dataset,
            fingerprint,
            phases,
            estimated_requests,
            estimated_duration_sec,
        })
    }

    /// Plan without committing; emits a `DRY_RUN_PLAN` event.
    pub fn dry_run(&self, request: &OrchestrateRequest) -> Result<RunPlan, CoreError> {
        let plan = self.plan(request)?;
        let run_id = RunId::new(format!("dryrun-{}", plan.fingerprint));
        self.events.append(&RunEvent::new(
            run_id,
            SystemClock.epoch_ms(),
            RunEventKind::DryRunPlan {
                plan: serde_json::to_value(&plan)
                    .map_err(|e| CoreError::fatal(format!("plan serialize: {e}")))?,
            },
        ))?;
        Ok(plan)
    }

    /// Commit a run: persist the queued job and remember the plan.
    pub async fn commit(
        &self,
        request: &OrchestrateRequest,
    ) -> Result<(SubmitOutcome, RunPlan), CoreError> {
        let plan = self.plan(request)?;
        let params = serde_json::to_value(&plan.request)
            .map_err(|e| CoreError::invalid_input(format!("unserializable request: {e}")))?;

        let outcome = self.manager.submit(plan.request.kind, params).await?;
        self.plans
            .lock()
            .insert(outcome.job_id.as_str().to_string(), plan.clone());
        if !outcome.deduplicated {
            self.stages
                .set(&RunId::for_job(&outcome.job_id), RunStage::Pending);
        }
        Ok((outcome, plan))
    }

    /// Recover a committed plan, re-deriving it from the persisted argv
    /// after a daemon restart.
    fn plan_for(&self, run_id: &RunId) -> Result<RunPlan, CoreError> {
        if let Some(plan) = self.plans.lock().get(run_id.as_str()) {
            return Ok(plan.clone());
        }
        let job = self.manager.status(&sl_core::JobId::new(run_id.as_str()))?;
        let raw = job
            .cmd
            .iter()
            .skip_while(|a| a.as_str() != "--params")
            .nth(1)
            .ok_or_else(|| CoreError::not_found(format!("no plan recorded for run {run_id}")))?;
        let request: OrchestrateRequest = serde_json::from_str(raw)
            .map_err(|e| CoreError::fatal(format!("persisted params unparseable: {e}")))?;
        self.plan(&request)
    }

    fn backend_for(
        &self,
        phase: Phase,
        round: u32,
        plan: &RunPlan,
    ) -> Result<Arc<dyn SearchBackend>, EngineError> {
        if plan.request.mode == RunMode::Http {
            let base = self.config.rag_api_base.clone().ok_or_else(|| {
                EngineError::Backend("http mode requires RAG_API_BASE".into())
            })?;
            let backend = crate::loadgen::HttpBackend::new(base, self.config.request_deadline)?;
            return Ok(Arc::new(backend));
        }

        let profile = match phase {
            Phase::Warmup | Phase::A => SimProfile::balanced(),
            Phase::B => SimProfile::quality(),
        };
        let seed = plan
            .request
            .seed
            .wrapping_add(phase as u64)
            .wrapping_add(round as u64 * 101);
        let backend = SimBackend::new(profile, seed);
        let backend = if self.config.sim_instant {
            backend.instant()
        } else {
            backend
        };
        Ok(Arc::new(backend))
    }

    /// Execute a committed run to completion.
    ///
    /// Returning `Ok` with the cancel flag set lets the worker loop record
    /// CANCELLED; any error surfaces as RUN_FAILED with the failing stage
    /// in the reason.
    pub async fn execute(
        &self,
        run_id: &RunId,
        cancel: Arc<AtomicBool>,
    ) -> Result<(), EngineError> {
        let plan = self
            .plan_for(run_id)
            .map_err(|e| stage_error(RunStage::Pending, &e.to_string()))?;

        info!(run_id = %run_id, kind = %plan.request.kind, dataset = %plan.dataset.collection, "run starting");
        self.stages.set(run_id, RunStage::Pending);

        if plan.request.kind == JobKind::BanditRound {
            return self.execute_bandit_round(run_id, &plan, &cancel).await;
        }

        let load_plan = build_plan(
            plan.request.seed,
            &TopkMix::default(),
            ((plan.request.qps * plan.request.window_sec as f64).ceil() as usize).clamp(1, 10_000),
        );

        // Warmup: no scoring, primes caches and the pacer.
        if cancel.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.stages.set(run_id, RunStage::Warmup);
        if plan.request.warmup_sec > 0 {
            let report = self
                .run_one_phase(run_id, &plan, &load_plan, Phase::Warmup, 0, &cancel)
                .await?;
            self.emit_stage(run_id, RunStage::Warmup, &report)?;
        }

        // Alternating measured phases.
        let mut a_reports: Vec<PhaseReport> = Vec::new();
        let mut b_reports: Vec<PhaseReport> = Vec::new();
        for round in 0..plan.request.rounds {
            for phase in [Phase::A, Phase::B] {
                if cancel.load(Ordering::SeqCst) {
                    info!(run_id = %run_id, "cancel observed before phase");
                    return Ok(());
                }
                let stage = match phase {
                    Phase::A => RunStage::PhaseA,
                    _ => RunStage::PhaseB,
                };
                self.stages.set(run_id, stage);
                let report = self
                    .run_one_phase(run_id, &plan, &load_plan, phase, round, &cancel)
                    .await?;

                // Controllers consume each phase's latency/error telemetry.
                let rec = self.flow.lock().update(
                    SystemClock.epoch_ms(),
                    FlowMetrics {
                        p95_ms: report.p95_ms,
                        qps: report.qps_actual,
                        err_rate: report.error_rate,
                        queue_depth: 0,
                    },
                );
                self.emit_stage(run_id, stage, &report)?;
                info!(
                    run_id = %run_id,
                    phase = %phase,
                    p95_ms = report.p95_ms,
                    action = %rec.action,
                    "phase complete"
                );
                match phase {
                    Phase::A => a_reports.push(report),
                    _ => b_reports.push(report),
                }
            }
        }

        if cancel.load(Ordering::SeqCst) {
            return Ok(());
        }

        // Aggregate over the metrics window.
        self.stages.set(run_id, RunStage::Aggregate);
        let window = self.hub.window_60s(SystemClock.epoch_ms());
        self.events.append(&RunEvent::new(
            run_id.clone(),
            SystemClock.epoch_ms(),
            RunEventKind::Stage {
                stage: RunStage::Aggregate.as_str().to_string(),
                summary: serde_json::to_value(&window)
                    .map_err(|e| stage_error(RunStage::Aggregate, &e.to_string()))?,
            },
        ))?;

        // Winners and verdict.
        self.stages.set(run_id, RunStage::Winners);
        let candidate_a = self.candidate("A", &a_reports, self.config.cost_per_query_a);
        let candidate_b = self.candidate("B", &b_reports, self.config.cost_per_query_b);
        let candidates = vec![candidate_a.clone(), candidate_b.clone()];

        let winners = if plan.request.kind == JobKind::Sweep {
            pick_gated_winners(&candidates, &SweepGates::default())
        } else {
            pick_winners(&candidates)
        };

        let verdict_input = ab_verdict_input(
            &a_reports,
            &b_reports,
            &candidate_a,
            &candidate_b,
        );
        let verdict = sl_control::sla::evaluate(&verdict_input);

        self.events.append(&RunEvent::new(
            run_id.clone(),
            SystemClock.epoch_ms(),
            RunEventKind::Winner {
                winners: serde_json::to_value(&winners)
                    .map_err(|e| stage_error(RunStage::Winners, &e.to_string()))?,
            },
        ))?;
        self.events.append(&RunEvent::new(
            run_id.clone(),
            SystemClock.epoch_ms(),
            RunEventKind::SlaVerdict {
                verdict: verdict.overall.to_string(),
                detail: serde_json::to_value(verdict)
                    .map_err(|e| stage_error(RunStage::Winners, &e.to_string()))?,
            },
        ))?;

        // Report: artifacts plus SLA auto-tune from the balanced winner.
        self.stages.set(run_id, RunStage::Report);
        self.write_report(
            run_id,
            &plan,
            &candidates,
            &winners,
            &verdict,
            &verdict_input,
        )
        .map_err(|e| stage_error(RunStage::Report, &e.to_string()))?;

        if let Some(balanced) = &winners.balanced {
            let policy = self
                .sla_store
                .load()
                .map_err(|e| stage_error(RunStage::Report, &e.to_string()))?;
            let tuned = policy.autotune(balanced.recall_at_10, balanced.p95_ms);
            self.sla_store
                .save(&tuned)
                .map_err(|e| stage_error(RunStage::Report, &e.to_string()))?;
            info!(
                run_id = %run_id,
                recall_min = tuned.recall_at_10_min,
                p95_max = tuned.p95_ms_max,
                "SLA policy auto-tuned from balanced winner"
            );
        }

        self.stages.set(run_id, RunStage::Done);
        Ok(())
    }

    async fn run_one_phase(
        &self,
        run_id: &RunId,
        plan: &RunPlan,
        load_plan: &crate::loadgen::LoadPlan,
        phase: Phase,
        round: u32,
        cancel: &Arc<AtomicBool>,
    ) -> Result<PhaseReport, EngineError> {
        let backend = self.backend_for(phase, round, plan)?;
        let generator = LoadGenerator::new(backend, Arc::clone(&self.hub))
            .with_router(Arc::clone(&self.router));

        let window = if phase == Phase::Warmup {
            Duration::from_secs(plan.request.warmup_sec as u64)
        } else {
            Duration::from_secs(plan.request.window_sec as u64)
        };

        let spec = PhaseSpec {
            phase,
            window,
            qps: plan.request.qps,
            concurrency: plan.request.concurrency as usize,
            recall_sample: plan.request.recall_sample,
        };
        let report = generator.run_phase(load_plan, &spec, cancel).await;
        if report.sent == 0 && !cancel.load(Ordering::SeqCst) && phase.is_scored() {
            warn!(run_id = %run_id, phase = %phase, "phase produced no samples");
        }
        Ok(report)
    }

    fn emit_stage(
        &self,
        run_id: &RunId,
        stage: RunStage,
        report: &PhaseReport,
    ) -> Result<(), EngineError> {
        self.events.append(&RunEvent::new(
            run_id.clone(),
            SystemClock.epoch_ms(),
            RunEventKind::Stage {
                stage: stage.as_str().to_string(),
                summary: json!({
                    "phase": report.phase,
                    "sent": report.sent,
                    "errors": report.errors,
                    "p95_ms": report.p95_ms,
                    "mean_ms": report.mean_ms,
                    "recall_mean": report.recall_mean,
                    "qps": report.qps_actual,
                }),
            },
        ))?;
        Ok(())
    }

    fn candidate(&self, name: &str, reports: &[PhaseReport], cost: f64) -> Candidate {
        let n = reports.len().max(1) as f64;
        Candidate {
            name: name.to_string(),
            recall_at_10: reports
                .iter()
                .filter_map(|r| r.recall_mean)
                .sum::<f64>()
                / reports.iter().filter(|r| r.recall_mean.is_some()).count().max(1) as f64,
            p95_ms: reports.iter().map(|r| r.p95_ms).sum::<f64>() / n,
            cost,
            qps: reports.iter().map(|r| r.qps_actual).sum::<f64>() / n,
        }
    }

    /// Bandit round: select an arm, measure it, update persisted state,
    /// and self-audit for drift.
    async fn execute_bandit_round(
        &self,
        run_id: &RunId,
        plan: &RunPlan,
        cancel: &Arc<AtomicBool>,
    ) -> Result<(), EngineError> {
        let arms = self.catalog.arm_names();
        let state = self
            .bandit
            .snapshot()
            .map_err(|e| stage_error(RunStage::Pending, &e.to_string()))?;

        let mut rng = StdRng::seed_from_u64(plan.request.seed);
        let selection = select_arm(&arms, &state, &self.config.select, &mut rng)
            .map_err(|e| stage_error(RunStage::Pending, &e.to_string()))?;

        self.events.append(&RunEvent::new(
            run_id.clone(),
            SystemClock.epoch_ms(),
            RunEventKind::Stage {
                stage: "SELECT".to_string(),
                summary: serde_json::to_value(&selection)
                    .map_err(|e| stage_error(RunStage::Pending, &e.to_string()))?,
            },
        ))?;

        if cancel.load(Ordering::SeqCst) {
            return Ok(());
        }

        // Measure the picked arm with one paced window.
        self.stages.set(run_id, RunStage::PhaseA);
        let load_plan = build_plan(
            plan.request.seed,
            &TopkMix::default(),
            ((plan.request.qps * plan.request.window_sec as f64).ceil() as usize).clamp(1, 10_000),
        );
        let report = self
            .run_one_phase(run_id, plan, &load_plan, Phase::A, 0, cancel)
            .await?;
        self.emit_stage(run_id, RunStage::PhaseA, &report)?;

        if cancel.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.stages.set(run_id, RunStage::Winners);
        let recall = report.recall_mean.unwrap_or(0.0);
        let reward = compute_reward(
            &RewardInput {
                recall,
                p95_ms: report.p95_ms,
                error_rate: report.error_rate,
                cost_per_query: self.config.cost_per_query_a,
            },
            &self.config.reward_weights,
            self.config.target_p95_ms,
        );

        let updated_at = chrono::Utc::now().to_rfc3339();
        let metrics = ArmMetrics {
            p95_ms: report.p95_ms,
            recall_at_10: recall,
            error_rate: report.error_rate,
            cost: self.config.cost_per_query_a,
            samples: report.sent,
            updated_at,
        };

        // Strict win: reward must beat every other arm's stored average.
        let won = state
            .arms
            .iter()
            .filter(|(name, _)| name.as_str() != selection.picked)
            .all(|(_, arm)| reward > arm.avg_reward.unwrap_or(f64::NEG_INFINITY));

        let picked = selection.picked.clone();
        let update_cfg = self.config.update;
        let new_state = self
            .bandit
            .update(move |s| {
                let arm = s.arms.entry(picked).or_default();
                apply_reward(arm, reward, Some(won), metrics, &update_cfg);
            })
            .map_err(|e| stage_error(RunStage::Winners, &e.to_string()))?;

        let drift = drift_audit(
            &new_state,
            &self.config.reward_weights,
            self.config.target_p95_ms,
        );
        let mut ab = BTreeMap::new();
        ab.insert(
            selection.picked.clone(),
            AbMeasurement {
                p95_ms: report.p95_ms,
                recall_at_10: recall,
                error_rate: report.error_rate,
                cost: self.config.cost_per_query_a,
            },
        );
        let alignment = ab_alignment(
            &new_state,
            &ab,
            &self.config.reward_weights,
            self.config.target_p95_ms,
        );

        self.events.append(&RunEvent::new(
            run_id.clone(),
            SystemClock.epoch_ms(),
            RunEventKind::Winner {
                winners: json!({
                    "picked": selection.picked,
                    "reward": reward,
                    "won": won,
                    "drift": drift,
                    "ab_alignment": alignment,
                }),
            },
        ))?;

        self.stages.set(run_id, RunStage::Report);
        let round_report = json!({
            "run_id": run_id.as_str(),
            "selection": selection,
            "reward": reward,
            "won": won,
            "report": report,
            "drift": drift,
            "ab_alignment": alignment,
            "state": new_state,
        });
        let dir = self.config.reports_dir.join(run_id.as_str());
        let body = serde_json::to_vec_pretty(&round_report)
            .map_err(|e| stage_error(RunStage::Report, &e.to_string()))?;
        sl_storage::write_atomic(&dir.join("bandit_round.json"), &body)?;
        self.record_artifact(run_id, "bandit_round", "bandit_round.json")?;

        self.stages.set(run_id, RunStage::Done);
        Ok(())
    }

    fn write_report(
        &self,
        run_id: &RunId,
        plan: &RunPlan,
        candidates: &[Candidate],
        winners: &WinnerSet,
        verdict: &sl_control::Verdict,
        verdict_input: &sl_control::VerdictInput,
    ) -> Result<(), EngineError> {
        let dir = self.config.reports_dir.join(run_id.as_str());
        let generated_at = chrono::Utc::now().to_rfc3339();

        let winners_json = json!({
            "run_id": run_id.as_str(),
            "tag": plan.request.tag.clone().or_else(|| self.config.run_tag.clone()),
            "dataset": plan.dataset,
            "candidates": candidates,
            "winners": winners,
            "verdict": verdict,
            "verdict_input": verdict_input,
            "generated_at": generated_at,
        });
        sl_storage::write_atomic(
            &dir.join("winners.json"),
            &serde_json::to_vec_pretty(&winners_json)
                .map_err(|e| stage_error(RunStage::Report, &e.to_string()))?,
        )?;
        self.record_artifact(run_id, "winners", "winners.json")?;

        let mut md = String::new();
        md.push_str(&format!("# Winners — {run_id}\n\n"));
        md.push_str("| category | name | recall@10 | p95_ms | cost | qps |\n");
        md.push_str("| --- | --- | ---:| ---:| ---:| ---:|\n");
        for (category, winner) in [
            ("quality", &winners.quality),
            ("latency", &winners.latency),
            ("balanced", &winners.balanced),
        ] {
            match winner {
                Some(c) => md.push_str(&format!(
                    "| {category} | {} | {:.4} | {:.1} | {:.6} | {:.1} |\n",
                    c.name, c.recall_at_10, c.p95_ms, c.cost, c.qps
                )),
                None => md.push_str(&format!("| {category} | - | - | - | - | - |\n")),
            }
        }
        md.push_str(&format!("\nOverall verdict: **{}**\n", verdict.overall));
        sl_storage::write_atomic(&dir.join("winners.md"), md.as_bytes())?;
        self.record_artifact(run_id, "winners_md", "winners.md")?;

        let mut summary = String::new();
        summary.push_str(&format!("# Run summary — {run_id}\n\n"));
        summary.push_str(&format!(
            "- kind: {}\n- dataset: {} ({})\n- phases: {}\n- estimated requests: {}\n",
            plan.request.kind,
            plan.request.dataset_name,
            plan.dataset.collection,
            plan.phases.join(" → "),
            plan.estimated_requests,
        ));
        summary.push_str(&format!(
            "- ΔRecall: {:+.4}\n- ΔP95: {:+.1} ms\n- p-value: {:.3}\n- verdict: {}\n",
            verdict_input.delta_recall,
            verdict_input.delta_p95_ms,
            verdict_input.p_value,
            verdict.overall,
        ));
        sl_storage::write_atomic(&dir.join("RUN_SUMMARY.md"), summary.as_bytes())?;
        self.record_artifact(run_id, "summary", "RUN_SUMMARY.md")?;

        Ok(())
    }

    fn record_artifact(&self, run_id: &RunId, role: &str, file: &str) -> Result<(), EngineError> {
        let rel = format!("reports/{run_id}/{file}");
        self.manager
            .store()
            .update(&sl_core::JobId::new(run_id.as_str()), |job| {
                job.record_artifact(role, rel.clone());
                Ok(())
            })?;
        Ok(())
    }

    /// Stage + queue position for the status endpoint.
    pub fn status(&self, run_id: &RunId) -> Result<(JobStatus, Option<RunStage>, Option<u32>), CoreError> {
        let job = self.manager.status(&sl_core::JobId::new(run_id.as_str()))?;
        let stage = self.stages.get(run_id);
        let position = self.manager.store().queue_position(&job.id);
        Ok((job.status, stage, position))
    }
}

fn stage_error(stage: RunStage, reason: &str) -> EngineError {
    EngineError::Worker(format!("{}: {}", stage.as_str(), reason))
}

/// A/B statistics feeding the verdict: per-side aggregates plus an
/// effect-size-based p-value approximation.
fn ab_verdict_input(
    a_reports: &[PhaseReport],
    b_reports: &[PhaseReport],
    candidate_a: &Candidate,
    candidate_b: &Candidate,
) -> sl_control::VerdictInput {
    let mean = |rs: &[PhaseReport]| {
        let n = rs.len().max(1) as f64;
        rs.iter().map(|r| r.mean_ms).sum::<f64>() / n
    };
    let pooled_std = {
        let std_a = a_reports.iter().map(|r| r.std_ms).sum::<f64>()
            / a_reports.len().max(1) as f64;
        let std_b = b_reports.iter().map(|r| r.std_ms).sum::<f64>()
            / b_reports.len().max(1) as f64;
        ((std_a.powi(2) + std_b.powi(2)) / 2.0).sqrt()
    };

    let samples_a: u64 = a_reports.iter().map(|r| r.sent).sum();
    let samples_b: u64 = b_reports.iter().map(|r| r.sent).sum();

    let p_value = if samples_a >= 10 && samples_b >= 10 {
        let effect = if pooled_std > 0.0 {
            (mean(a_reports) - mean(b_reports)).abs() / pooled_std
        } else {
            0.0
        };
        if effect > 0.8 && samples_a > 30 {
            0.01
        } else if effect > 0.5 && samples_a > 20 {
            0.05
        } else if effect > 0.3 {
            0.10
        } else {
            0.50
        }
    } else {
        1.0
    };

    let total_b: u64 = b_reports.iter().map(|r| r.sent).sum();
    let ok_b: u64 = b_reports.iter().map(|r| r.ok).sum();

    sl_control::VerdictInput {
        delta_recall: candidate_b.recall_at_10 - candidate_a.recall_at_10,
        p_value,
        buckets: (a_reports.len() + b_reports.len()) as u32 * 6,
        delta_p95_ms: candidate_b.p95_ms - candidate_a.p95_ms,
        safety_rate: 1.0
            - b_reports
                .iter()
                .map(|r| r.error_rate)
                .fold(0.0, f64::max),
        apply_rate: if total_b == 0 {
            0.0
        } else {
            ok_b as f64 / total_b as f64
        },
        cost_per_query: candidate_b.cost,
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
