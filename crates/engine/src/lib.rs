// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sl-engine: job execution and run orchestration.
//!
//! The job manager serializes all job execution through a single worker
//! loop; the orchestrator drives plan → commit → execute → report on top
//! of it, feeding the load generator, metrics aggregator, and controllers.

pub mod env;
pub mod error;
pub mod loadgen;
pub mod manager;
pub mod metrics;
pub mod orchestrator;
pub mod registry;
pub mod worker;

pub use env::EnvConfig;
pub use error::EngineError;
pub use loadgen::{
    build_plan, LoadGenerator, LoadPlan, PhaseReport, PlannedQuery, SearchBackend, SearchOutcome,
    SimBackend, SimProfile, TopkMix,
};
pub use manager::{JobManager, ManagerConfig, SubmitOutcome, WorkerFactory};
pub use metrics::{BucketPoint, MetricsHub, SeriesSnapshot, WindowSnapshot};
pub use orchestrator::{
    OrchestrateRequest, Orchestrator, OrchestratorConfig, RunMode, RunPlan, RunStage, StageTracker,
};
pub use registry::{DatasetEntry, DatasetRegistry};
pub use worker::{JobWorker, SubprocessWorker, TaskWorker, WorkerOutcome, WorkerStatus};
