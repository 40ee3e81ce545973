// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-query backend routing: rules policy and cost policy.
//!
//! Queries ineligible for the dense backend (filters, fulltext, oversized
//! topk, unhealthy backend) are forced to the rich backend with no fallback;
//! sampling never overrides ineligibility.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Bounded decision history length.
const MAX_HISTORY: usize = 100;

/// Query context for a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryContext {
    pub topk: u32,
    pub has_filter: bool,
    #[serde(default)]
    pub has_fulltext: bool,
    /// 0-1 scale, currently informational only.
    #[serde(default)]
    pub complexity: f64,
}

/// Load snapshot for one backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackendLoad {
    pub cpu_pct: f64,
    pub qps: f64,
    pub p95_ms: f64,
    pub healthy: bool,
}

impl Default for BackendLoad {
    fn default() -> Self {
        Self {
            cpu_pct: 0.0,
            qps: 0.0,
            p95_ms: 0.0,
            healthy: true,
        }
    }
}

/// The two search backends: ANN-only vs filter-capable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Dense,
    Rich,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Dense => "dense",
            Backend::Rich => "rich",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rule produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RouteRule {
    FiltersToRich,
    LargeTopkToRich,
    UnhealthyFallback,
    LoadShedding,
    Sampling { eligible_for_dense: bool },
    DefaultToDense,
    CostForced,
    CostOptimized { dense_cost: f64, rich_cost: f64 },
}

/// Routing decision result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub backend: Backend,
    pub reason: String,
    pub confidence: f64,
    pub fallback_available: bool,
    pub metadata: RouteRule,
}

/// Per-backend decision counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteCounters {
    pub dense: u64,
    pub rich: u64,
    pub sampling: u64,
}

/// Rules policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Max topk the dense backend serves.
    pub topk_threshold: u32,
    /// Fraction of dense-eligible queries sampled to rich for validation.
    pub sampling_pct: f64,
    /// Dense backend load-shedding threshold.
    pub cpu_shed_pct: f64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            topk_threshold: 32,
            sampling_pct: 0.05,
            cpu_shed_pct: 0.85,
        }
    }
}

/// Rules-based router; rules are evaluated top-to-bottom, first match wins.
#[derive(Debug)]
pub struct RulesRouter {
    config: RulesConfig,
    rng: StdRng,
    counters: RouteCounters,
    total: u64,
}

impl RulesRouter {
    pub fn new(config: RulesConfig) -> Self {
        Self::with_seed(config, rand::rng().random())
    }

    /// Deterministic construction for reproducible runs and tests.
    pub fn with_seed(config: RulesConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            counters: RouteCounters::default(),
            total: 0,
        }
    }

    pub fn route(
        &mut self,
        query: &QueryContext,
        dense_load: &BackendLoad,
        _rich_load: &BackendLoad,
    ) -> RouteDecision {
        self.total += 1;

        // Rule 1: filters and fulltext only exist on the rich backend.
        if query.has_filter || query.has_fulltext {
            self.counters.rich += 1;
            let reason = if query.has_filter {
                "has_filter"
            } else {
                "has_fulltext"
            };
            return RouteDecision {
                backend: Backend::Rich,
                reason: reason.into(),
                confidence: 1.0,
                fallback_available: false,
                metadata: RouteRule::FiltersToRich,
            };
        }

        // Rule 2: oversized topk.
        if query.topk > self.config.topk_threshold {
            self.counters.rich += 1;
            return RouteDecision {
                backend: Backend::Rich,
                reason: format!("topk={}>{}", query.topk, self.config.topk_threshold),
                confidence: 0.95,
                fallback_available: true,
                metadata: RouteRule::LargeTopkToRich,
            };
        }

        // Rule 3: dense backend unhealthy.
        if !dense_load.healthy {
            self.counters.rich += 1;
            return RouteDecision {
                backend: Backend::Rich,
                reason: "dense_unhealthy".into(),
                confidence: 0.9,
                fallback_available: false,
                metadata: RouteRule::UnhealthyFallback,
            };
        }

        // Rule 4: dense backend overloaded.
        if dense_load.cpu_pct > self.config.cpu_shed_pct {
            self.counters.rich += 1;
            return RouteDecision {
                backend: Backend::Rich,
                reason: format!("dense_overloaded (cpu={:.0}%)", dense_load.cpu_pct * 100.0),
                confidence: 0.85,
                fallback_available: false,
                metadata: RouteRule::LoadShedding,
            };
        }

        // Rule 5: validation sampling; the query stays dense-eligible.
        if self.rng.random::<f64>() < self.config.sampling_pct {
            self.counters.sampling += 1;
            return RouteDecision {
                backend: Backend::Rich,
                reason: "sampling_recheck".into(),
                confidence: 0.5,
                fallback_available: true,
                metadata: RouteRule::Sampling {
                    eligible_for_dense: true,
                },
            };
        }

        self.counters.dense += 1;
        RouteDecision {
            backend: Backend::Dense,
            reason: format!(
                "topk<={}, no_filter, healthy",
                self.config.topk_threshold
            ),
            confidence: 0.9,
            fallback_available: true,
            metadata: RouteRule::DefaultToDense,
        }
    }

    pub fn counters(&self) -> RouteCounters {
        self.counters
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn reset_stats(&mut self) {
        self.counters = RouteCounters::default();
        self.total = 0;
    }
}

/// Cost policy configuration. Price constants are deployment-specific and
/// always supplied through this struct.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostRouterConfig {
    pub dense_price_per_1k: f64,
    pub rich_price_per_1k: f64,
    /// Weight of latency vs price in the cost function (0-1).
    pub latency_weight: f64,
    pub dense_baseline_ms: f64,
    pub rich_baseline_ms: f64,
    pub topk_threshold: u32,
}

impl Default for CostRouterConfig {
    fn default() -> Self {
        Self {
            dense_price_per_1k: 0.01,
            rich_price_per_1k: 0.05,
            latency_weight: 0.6,
            dense_baseline_ms: 10.0,
            rich_baseline_ms: 50.0,
            topk_threshold: 32,
        }
    }
}

/// Cost-based router: eligibility gate, then lower estimated cost wins.
#[derive(Debug)]
pub struct CostRouter {
    config: CostRouterConfig,
    total: u64,
    cost_saved: f64,
}

impl CostRouter {
    pub fn new(config: CostRouterConfig) -> Self {
        Self {
            config,
            total: 0,
            cost_saved: 0.0,
        }
    }

    fn estimate(&self, baseline_ms: f64, price_per_1k: f64, load: &BackendLoad) -> f64 {
        let latency = baseline_ms * (1.0 + load.cpu_pct * 0.5);
        self.config.latency_weight * latency / 100.0
            + (1.0 - self.config.latency_weight) * price_per_1k
    }

    pub fn route(
        &mut self,
        query: &QueryContext,
        dense_load: &BackendLoad,
        rich_load: &BackendLoad,
    ) -> RouteDecision {
        self.total += 1;

        let dense_eligible = !query.has_filter
            && !query.has_fulltext
            && query.topk <= self.config.topk_threshold
            && dense_load.healthy;

        if !dense_eligible {
            return RouteDecision {
                backend: Backend::Rich,
                reason: "dense_ineligible".into(),
                confidence: 1.0,
                fallback_available: false,
                metadata: RouteRule::CostForced,
            };
        }

        let dense_cost = self.estimate(
            self.config.dense_baseline_ms,
            self.config.dense_price_per_1k,
            dense_load,
        );
        let rich_cost = self.estimate(
            self.config.rich_baseline_ms,
            self.config.rich_price_per_1k,
            rich_load,
        );

        if dense_cost < rich_cost {
            self.cost_saved += rich_cost - dense_cost;
            RouteDecision {
                backend: Backend::Dense,
                reason: format!("lower_cost (saving={:.4})", rich_cost - dense_cost),
                confidence: 0.8,
                fallback_available: true,
                metadata: RouteRule::CostOptimized {
                    dense_cost,
                    rich_cost,
                },
            }
        } else {
            RouteDecision {
                backend: Backend::Rich,
                reason: "lower_cost".into(),
                confidence: 0.8,
                fallback_available: true,
                metadata: RouteRule::CostOptimized {
                    dense_cost,
                    rich_cost,
                },
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn cost_saved(&self) -> f64 {
        self.cost_saved
    }
}

/// Routing policy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutePolicy {
    Rules,
    Cost,
}

impl fmt::Display for RoutePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutePolicy::Rules => f.write_str("rules"),
            RoutePolicy::Cost => f.write_str("cost"),
        }
    }
}

/// Aggregated router statistics for the ops surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterStats {
    pub policy: RoutePolicy,
    pub total_decisions: u64,
    pub dense_count: u64,
    pub rich_count: u64,
    pub sampling_count: u64,
    pub dense_pct: f64,
    pub rich_pct: f64,
    pub sampling_pct: f64,
}

/// Unified router front-end with a bounded decision history.
#[derive(Debug)]
pub struct Router {
    policy: RoutePolicy,
    rules: RulesRouter,
    cost: CostRouter,
    history: VecDeque<RouteDecision>,
}

impl Router {
    pub fn new(policy: RoutePolicy, rules: RulesConfig, cost: CostRouterConfig) -> Self {
        Self {
            policy,
            rules: RulesRouter::new(rules),
            cost: CostRouter::new(cost),
            history: VecDeque::new(),
        }
    }

    /// Deterministic construction for reproducible runs and tests.
    pub fn with_seed(policy: RoutePolicy, rules: RulesConfig, cost: CostRouterConfig, seed: u64) -> Self {
        Self {
            policy,
            rules: RulesRouter::with_seed(rules, seed),
            cost: CostRouter::new(cost),
            history: VecDeque::new(),
        }
    }

    pub fn policy(&self) -> RoutePolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: RoutePolicy) {
        self.policy = policy;
    }

    pub fn route(
        &mut self,
        query: &QueryContext,
        dense_load: &BackendLoad,
        rich_load: &BackendLoad,
    ) -> RouteDecision {
        let decision = match self.policy {
            RoutePolicy::Rules => self.rules.route(query, dense_load, rich_load),
            RoutePolicy::Cost => self.cost.route(query, dense_load, rich_load),
        };
        self.history.push_back(decision.clone());
        if self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
        decision
    }

    pub fn history(&self) -> impl Iterator<Item = &RouteDecision> {
        self.history.iter()
    }

    pub fn stats(&self) -> RouterStats {
        let counters = self.rules.counters();
        let total = match self.policy {
            RoutePolicy::Rules => self.rules.total(),
            RoutePolicy::Cost => self.cost.total(),
        };
        let pct = |n: u64| {
            if total == 0 {
                0.0
            } else {
                n as f64 / total as f64 * 100.0
            }
        };
        RouterStats {
            policy: self.policy,
            total_decisions: total,
            dense_count: counters.dense,
            rich_count: counters.rich,
            sampling_count: counters.sampling,
            dense_pct: pct(counters.dense),
            rich_pct: pct(counters.rich),
            sampling_pct: pct(counters.sampling),
        }
    }

    pub fn reset(&mut self) {
        self.rules.reset_stats();
        self.history.clear();
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
