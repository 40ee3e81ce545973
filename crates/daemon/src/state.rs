// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency-injected daemon state shared with every HTTP handler.
//!
//! There are no process-wide singletons: everything a handler touches is
//! constructed at startup and reached through this struct.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sl_control::{Backend, FlowController, RoutePolicy, Router};
use sl_engine::{JobManager, MetricsHub, Orchestrator};
use sl_storage::{BanditStore, EventLog, JobStore, SlaPolicyStore};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

/// Runtime routing configuration set through the ops API.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutingFlags {
    pub enabled: bool,
    pub mode: RoutePolicy,
    /// Force every decision to one backend, overriding the policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_backend: Option<Backend>,
}

impl Default for RoutingFlags {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: RoutePolicy::Rules,
            manual_backend: None,
        }
    }
}

/// Shared daemon state.
pub struct AppState {
    pub manager: Arc<JobManager>,
    pub orchestrator: Arc<Orchestrator>,
    pub hub: Arc<MetricsHub>,
    pub flow: Arc<Mutex<FlowController>>,
    pub router: Arc<Mutex<Router>>,
    pub routing_flags: Mutex<RoutingFlags>,
    pub store: Arc<JobStore>,
    pub events: Arc<EventLog>,
    pub sla_store: Arc<SlaPolicyStore>,
    pub bandit: Arc<BanditStore>,
    pub started_at: Instant,
    pub ready: AtomicBool,
}

impl AppState {
    pub fn uptime_sec(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
