// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown, recovery.

use crate::state::{AppState, RoutingFlags};
use parking_lot::Mutex;
use sl_control::{
    CostRouterConfig, FlowController, FlowPolicy, RoutePolicy, Router, RulesConfig,
};
use sl_control::bandit::RewardWeights;
use sl_core::{Clock, RunEvent, RunEventKind, RunId, SystemClock};
use sl_engine::worker::TaskWorker;
use sl_engine::{
    DatasetRegistry, EngineError, EnvConfig, JobManager, ManagerConfig, MetricsHub, Orchestrator,
    OrchestratorConfig,
};
use sl_storage::{BanditStore, EventLog, JobStore, KillPidProbe, PolicyCatalog, SlaPolicyStore};
use std::fs::File;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use fs2::FileExt;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ./.searchlab)
    pub state_dir: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to jobs.json
    pub jobs_path: PathBuf,
    /// Directory of per-run event logs
    pub events_dir: PathBuf,
    /// Reports tree root
    pub reports_dir: PathBuf,
    /// Path to bandit_state.json
    pub bandit_path: PathBuf,
    /// Path to sla_policy.toml
    pub sla_policy_path: PathBuf,
    /// Path to policies.toml (arm catalog)
    pub policies_path: PathBuf,
    /// Path to datasets.toml (dataset registry)
    pub datasets_path: PathBuf,
    /// Per-job stdout/stderr files
    pub logs_dir: PathBuf,
    /// HTTP bind address
    pub http_addr: SocketAddr,
}

impl Config {
    /// Build configuration from the environment and an optional state-dir
    /// override.
    pub fn load(env: &EnvConfig, state_dir: Option<PathBuf>) -> Self {
        let state_dir = state_dir.unwrap_or_else(|| PathBuf::from(".searchlab"));
        let reports_dir = env
            .runs_dir
            .clone()
            .unwrap_or_else(|| state_dir.join("reports"));
        let bandit_path = env
            .bandit_state
            .clone()
            .unwrap_or_else(|| state_dir.join("bandit_state.json"));

        Self {
            lock_path: state_dir.join("daemon.pid"),
            jobs_path: state_dir.join("jobs.json"),
            events_dir: state_dir.join("events"),
            reports_dir,
            bandit_path,
            sla_policy_path: state_dir.join("sla_policy.toml"),
            policies_path: state_dir.join("policies.toml"),
            datasets_path: state_dir.join("datasets.toml"),
            logs_dir: state_dir.join("logs"),
            http_addr: ([127, 0, 0, 1], 8088).into(),
            state_dir,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.http_addr = addr;
        self
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind {0}: {1}")]
    BindFailed(SocketAddr, std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("{0}")]
    Core(#[from] sl_core::CoreError),
}

/// Daemon state during operation.
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub app: Arc<AppState>,
}

impl DaemonState {
    /// Shutdown the daemon gracefully.
    pub fn shutdown(&mut self) {
        info!("Shutting down daemon...");
        self.app.ready.store(false, Ordering::SeqCst);

        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!("Failed to remove PID file: {}", e);
            }
        }
        info!("Daemon shutdown complete");
    }
}

/// Result of daemon startup.
pub struct StartupResult {
    pub daemon: DaemonState,
    pub listener: TcpListener,
}

impl std::fmt::Debug for StartupResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupResult").finish_non_exhaustive()
    }
}

/// Start the daemon
pub async fn startup(config: Config) -> Result<StartupResult, LifecycleError> {
    let lock_path = config.lock_path.clone();
    match startup_inner(config).await {
        Ok(result) => Ok(result),
        Err(e) => {
            // Don't clean up on lock failure; those files belong to the
            // running daemon.
            if !matches!(e, LifecycleError::LockFailed(_)) && lock_path.exists() {
                let _ = std::fs::remove_file(&lock_path);
            }
            Err(e)
        }
    }
}

async fn startup_inner(config: Config) -> Result<StartupResult, LifecycleError> {
    // 1. Create state directories
    std::fs::create_dir_all(&config.state_dir)?;
    std::fs::create_dir_all(&config.events_dir)?;
    std::fs::create_dir_all(&config.reports_dir)?;
    std::fs::create_dir_all(&config.logs_dir)?;

    // 2. Acquire lock file FIRST - prevents races.
    // Avoid truncating before we hold the lock, which would wipe the
    // running daemon's PID.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    // 3. Load persisted state
    let env = EnvConfig::from_env();
    let store = Arc::new(JobStore::load(&config.jobs_path).map_err(EngineError::from)?);
    let events = Arc::new(EventLog::new(&config.events_dir));
    info!(jobs = store.list().len(), "loaded job store");

    // 4. Reconcile: rewrite RUNNING jobs with dead pids to ABORTED,
    // journaling the repair before the store is touched.
    let clock = SystemClock;
    let now_ms = clock.epoch_ms();
    let events_for_reconcile = Arc::clone(&events);
    let reaped = store
        .reconcile_on_boot(&KillPidProbe, now_ms, |job| {
            let event = RunEvent::new(
                RunId::for_job(&job.id),
                now_ms,
                RunEventKind::RunFailed {
                    stage: None,
                    reason: "zombie_reaped".to_string(),
                },
            );
            if let Err(e) = events_for_reconcile.append(&event) {
                warn!(job_id = %job.id, error = %e, "failed to journal zombie repair");
            }
        })
        .map_err(EngineError::from)?;
    if !reaped.is_empty() {
        info!(count = reaped.len(), "reaped zombie jobs on boot");
    }

    // 5. Controllers, router, stores
    let target_p95 = env.effective_target_p95(120.0);
    let flow = Arc::new(Mutex::new(FlowController::new(FlowPolicy::Aimd, target_p95)));
    let router = Arc::new(Mutex::new(Router::new(
        RoutePolicy::Rules,
        RulesConfig::default(),
        CostRouterConfig::default(),
    )));
    let bandit = Arc::new(BanditStore::new(&config.bandit_path));
    let sla_store = Arc::new(SlaPolicyStore::new(&config.sla_policy_path));
    let catalog = PolicyCatalog::load(&config.policies_path).map_err(EngineError::from)?;
    let registry = DatasetRegistry::load(&config.datasets_path)?;
    let hub = Arc::new(MetricsHub::new());

    let reward_weights = match env.reward_weights.as_deref() {
        Some(spec) => RewardWeights::parse(spec)?,
        None => RewardWeights::default(),
    };

    // 6. Manager with an in-process worker that drives the orchestrator.
    // The orchestrator needs the manager and vice versa, so the factory
    // resolves it through a cell filled in below.
    let orchestrator_cell: Arc<Mutex<Option<Arc<Orchestrator>>>> = Arc::new(Mutex::new(None));
    let factory_cell = Arc::clone(&orchestrator_cell);
    let manager = JobManager::new(
        Arc::clone(&store),
        Arc::clone(&events),
        clock,
        ManagerConfig::new(&config.logs_dir),
        Arc::new(move |job: &sl_core::Job| {
            let run_id = RunId::for_job(&job.id);
            let cell = Arc::clone(&factory_cell);
            Box::new(TaskWorker::new(move |cancel| {
                tokio::spawn(async move {
                    let orchestrator = cell
                        .lock()
                        .clone()
                        .ok_or_else(|| EngineError::Worker("orchestrator not wired".into()))?;
                    orchestrator.execute(&run_id, cancel).await
                })
            }))
        }),
    );

    let mut orch_config = OrchestratorConfig::new(&config.reports_dir);
    orch_config.run_tag = env.run_tag.clone();
    orch_config.target_p95_ms = target_p95;
    orch_config.reward_weights = reward_weights;
    orch_config.rag_api_base = env.rag_api_base.clone();
    if let Some(alpha) = env.bandit_alpha {
        orch_config.update.alpha = alpha.clamp(0.0, 1.0);
    }

    let orchestrator = Arc::new(Orchestrator::new(
        registry,
        Arc::clone(&manager),
        Arc::clone(&events),
        Arc::clone(&hub),
        Arc::clone(&flow),
        Arc::clone(&router),
        Arc::clone(&bandit),
        catalog,
        Arc::clone(&sla_store),
        orch_config,
    ));
    *orchestrator_cell.lock() = Some(Arc::clone(&orchestrator));

    // 7. Start the worker loop and requeue anything left QUEUED.
    manager.spawn_worker_loop();
    manager.requeue_persisted().await?;

    // 8. Bind HTTP (LAST - only after all validation passes)
    let listener = TcpListener::bind(config.http_addr)
        .await
        .map_err(|e| LifecycleError::BindFailed(config.http_addr, e))?;

    let app = Arc::new(AppState {
        manager,
        orchestrator,
        hub,
        flow,
        router,
        routing_flags: Mutex::new(RoutingFlags::default()),
        store,
        events,
        sla_store,
        bandit,
        started_at: Instant::now(),
        ready: AtomicBool::new(true),
    });

    info!(addr = %config.http_addr, "Daemon started");

    Ok(StartupResult {
        daemon: DaemonState {
            config,
            lock_file,
            app,
        },
        listener,
    })
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
