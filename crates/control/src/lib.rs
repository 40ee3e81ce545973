// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sl-control: pure tuning logic for the searchlab platform.
//!
//! Controllers, the backend router, the bandit selector, and the SLA
//! evaluator live here. Nothing in this crate performs I/O or reads a
//! clock; callers pass `now_ms` and persist state through `sl-storage`.

pub mod bandit;
pub mod flow;
pub mod router;
pub mod sla;
pub mod winners;

pub use bandit::{
    apply_reward, compute_reward, drift_audit, select_arm, ArmMetrics, ArmState, BanditState,
    DriftStatus, RewardInput, RewardWeights, SelectConfig, Selection, UpdateConfig,
};
pub use flow::{
    AimdConfig, AimdController, FlowAction, FlowController, FlowMetrics, FlowPolicy, FlowRecommendation,
    PidConfig, PidController,
};
pub use router::{
    Backend, BackendLoad, CostRouter, CostRouterConfig, QueryContext, RouteDecision, RoutePolicy,
    Router, RouterStats, RulesConfig, RulesRouter,
};
pub use sla::{BreachLevel, Color, Overall, SlaMonitor, SlaPolicy, SlaTargets, Verdict, VerdictInput};
pub use winners::{Candidate, SweepGates, WinnerSet};
