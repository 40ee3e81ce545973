// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture: a fully wired in-process engine over a temp directory.

use parking_lot::Mutex;
use sl_control::{
    CostRouterConfig, FlowController, FlowPolicy, RoutePolicy, Router, RulesConfig,
};
use sl_core::{JobId, RunId, SystemClock};
use sl_engine::worker::TaskWorker;
use sl_engine::{
    DatasetRegistry, EngineError, JobManager, ManagerConfig, MetricsHub, OrchestrateRequest,
    Orchestrator, OrchestratorConfig, RunMode,
};
use sl_storage::{BanditStore, EventLog, JobStore, PolicyCatalog, SlaPolicyStore};
use std::sync::Arc;
use std::time::Duration;

pub struct Engine {
    pub orchestrator: Arc<Orchestrator>,
    pub events: Arc<EventLog>,
    pub store: Arc<JobStore>,
    pub dir: tempfile::TempDir,
}

pub fn engine() -> Engine {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(JobStore::load(dir.path().join("jobs.json")).expect("job store"));
    let events = Arc::new(EventLog::new(dir.path().join("events")));
    let cell: Arc<Mutex<Option<Arc<Orchestrator>>>> = Arc::new(Mutex::new(None));

    let factory_cell = Arc::clone(&cell);
    let manager = JobManager::new(
        Arc::clone(&store),
        Arc::clone(&events),
        SystemClock,
        ManagerConfig::new(dir.path().join("logs")),
        Arc::new(move |job: &sl_core::Job| {
            let run_id = RunId::new(job.id.as_str());
            let cell = Arc::clone(&factory_cell);
            Box::new(TaskWorker::new(move |cancel| {
                tokio::spawn(async move {
                    let orchestrator = cell
                        .lock()
                        .clone()
                        .ok_or_else(|| EngineError::Worker("orchestrator unset".into()))?;
                    orchestrator.execute(&run_id, cancel).await
                })
            }))
        }),
    );
    manager.spawn_worker_loop();

    let mut config = OrchestratorConfig::new(dir.path().join("reports"));
    config.sim_instant = true;

    let orchestrator = Arc::new(Orchestrator::new(
        DatasetRegistry::default(),
        manager,
        Arc::clone(&events),
        Arc::new(MetricsHub::new()),
        Arc::new(Mutex::new(FlowController::new(FlowPolicy::Aimd, 120.0))),
        Arc::new(Mutex::new(Router::with_seed(
            RoutePolicy::Rules,
            RulesConfig::default(),
            CostRouterConfig::default(),
            7,
        ))),
        Arc::new(BanditStore::new(dir.path().join("bandit_state.json"))),
        PolicyCatalog::default(),
        Arc::new(SlaPolicyStore::new(dir.path().join("sla_policy.toml"))),
        config,
    ));
    *cell.lock() = Some(Arc::clone(&orchestrator));

    Engine {
        orchestrator,
        events,
        store,
        dir,
    }
}

pub fn quick_ab() -> OrchestrateRequest {
    OrchestrateRequest {
        kind: sl_core::JobKind::Ab,
        dataset_name: "fiqa".into(),
        mode: RunMode::Sim,
        qps: 40.0,
        concurrency: 8,
        window_sec: 1,
        rounds: 1,
        warmup_sec: 0,
        recall_sample: 0.5,
        seed: 42,
        tag: None,
    }
}

pub async fn wait_terminal(engine: &Engine, id: &str) -> sl_core::Job {
    let id = JobId::new(id);
    for _ in 0..2_000 {
        let job = engine
            .orchestrator
            .manager()
            .status(&id)
            .expect("job exists");
        if job.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never reached a terminal state");
}
