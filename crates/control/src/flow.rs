// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AIMD and PID-lite flow controllers.
//!
//! Both controllers are pure functions of history and config: callers pass
//! `now_ms` with each update and receive a clamped recommendation. Error
//! rate and queue depth are accepted in [`FlowMetrics`] but unused by the
//! current contract.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Hard bounds for the throughput multiplier.
const MULTIPLIER_MIN: f64 = 0.1;
const MULTIPLIER_MAX: f64 = 2.0;

/// Bounded metrics history retained for introspection.
const MAX_HISTORY: usize = 100;

/// Current flow metrics fed into a controller update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowMetrics {
    pub p95_ms: f64,
    pub qps: f64,
    #[serde(default)]
    pub err_rate: f64,
    #[serde(default)]
    pub queue_depth: u32,
}

/// Direction of a controller decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowAction {
    Increase,
    Decrease,
    Hold,
}

impl fmt::Display for FlowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlowAction::Increase => "increase",
            FlowAction::Decrease => "decrease",
            FlowAction::Hold => "hold",
        };
        f.write_str(s)
    }
}

/// Concrete parameter recommendation emitted by either controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecommendation {
    pub concurrency: u32,
    pub batch_size: u32,
    /// Retrieval depth suggestion derived from the same multiplier.
    pub top_k: u32,
    /// ANN search width suggestion derived from the same multiplier.
    pub ef_search: u32,
    pub action: FlowAction,
    pub reason: String,
    pub confidence: f64,
}

/// Base values and bounds the multiplier is projected onto.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamBase {
    pub concurrency: u32,
    pub batch_size: u32,
    pub top_k: u32,
    pub top_k_min: u32,
    pub top_k_max: u32,
    pub ef_search: u32,
    pub ef_search_min: u32,
    pub ef_search_max: u32,
}

impl Default for ParamBase {
    fn default() -> Self {
        Self {
            concurrency: 20,
            batch_size: 10,
            top_k: 80,
            top_k_min: 20,
            top_k_max: 100,
            ef_search: 128,
            ef_search_min: 16,
            ef_search_max: 256,
        }
    }
}

impl ParamBase {
    fn project(&self, multiplier: f64, action: FlowAction, reason: String, confidence: f64) -> FlowRecommendation {
        let scale = |base: u32| (base as f64 * multiplier).round() as u32;
        FlowRecommendation {
            concurrency: scale(self.concurrency).max(1),
            batch_size: scale(self.batch_size).max(1),
            top_k: scale(self.top_k).clamp(self.top_k_min, self.top_k_max),
            ef_search: scale(self.ef_search).clamp(self.ef_search_min, self.ef_search_max),
            action,
            reason,
            confidence,
        }
    }
}

/// AIMD configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AimdConfig {
    pub target_p95_ms: f64,
    /// Decrease triggers when `p95 > target * threshold_factor`.
    pub threshold_factor: f64,
    /// Additive increase step (0.05 = +5%).
    pub increase_step: f64,
    /// Multiplicative decrease factor.
    pub decrease_factor: f64,
    /// No further decrease within this window after one fires.
    pub cooldown_ms: u64,
    pub base: ParamBase,
}

impl AimdConfig {
    pub fn with_target(target_p95_ms: f64) -> Self {
        Self {
            target_p95_ms,
            ..Self::default()
        }
    }
}

impl Default for AimdConfig {
    fn default() -> Self {
        Self {
            target_p95_ms: 100.0,
            threshold_factor: 1.2,
            increase_step: 0.05,
            decrease_factor: 0.7,
            cooldown_ms: 30_000,
            base: ParamBase::default(),
        }
    }
}

/// Additive-increase / multiplicative-decrease controller.
#[derive(Debug, Clone)]
pub struct AimdController {
    config: AimdConfig,
    multiplier: f64,
    last_decrease_ms: Option<u64>,
    decisions: u64,
}

impl AimdController {
    pub fn new(config: AimdConfig) -> Self {
        Self {
            config,
            multiplier: 1.0,
            last_decrease_ms: None,
            decisions: 0,
        }
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn decisions(&self) -> u64 {
        self.decisions
    }

    /// Feed new metrics and produce a recommendation.
    pub fn update(&mut self, now_ms: u64, metrics: &FlowMetrics) -> FlowRecommendation {
        self.decisions += 1;

        let threshold = self.config.target_p95_ms * self.config.threshold_factor;
        let in_cooldown = self
            .last_decrease_ms
            .is_some_and(|t| now_ms.saturating_sub(t) < self.config.cooldown_ms);

        let (action, reason, confidence) = if metrics.p95_ms > threshold {
            if in_cooldown {
                let remaining_ms = self.config.cooldown_ms
                    - now_ms.saturating_sub(self.last_decrease_ms.unwrap_or(now_ms));
                (
                    FlowAction::Hold,
                    format!("cooldown ({}s remaining)", remaining_ms.div_ceil(1000)),
                    0.5,
                )
            } else {
                self.last_decrease_ms = Some(now_ms);
                self.multiplier *= self.config.decrease_factor;
                (
                    FlowAction::Decrease,
                    format!("p95={:.1}ms > {:.1}ms", metrics.p95_ms, threshold),
                    0.9,
                )
            }
        } else if metrics.p95_ms < self.config.target_p95_ms * 0.8 {
            self.multiplier *= 1.0 + self.config.increase_step;
            (
                FlowAction::Increase,
                format!(
                    "p95={:.1}ms < {:.1}ms",
                    metrics.p95_ms, self.config.target_p95_ms
                ),
                0.85,
            )
        } else {
            (
                FlowAction::Hold,
                format!("p95={:.1}ms in acceptable range", metrics.p95_ms),
                0.7,
            )
        };

        self.multiplier = self.multiplier.clamp(MULTIPLIER_MIN, MULTIPLIER_MAX);
        self.config.base.project(self.multiplier, action, reason, confidence)
    }

    pub fn reset(&mut self) {
        self.multiplier = 1.0;
        self.last_decrease_ms = None;
        self.decisions = 0;
    }
}

/// PID-lite configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidConfig {
    pub target_p95_ms: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Output clamp per step (0.3 = ±30%).
    pub max_adjustment: f64,
    pub base: ParamBase,
}

impl PidConfig {
    pub fn with_target(target_p95_ms: f64) -> Self {
        Self {
            target_p95_ms,
            ..Self::default()
        }
    }
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            target_p95_ms: 100.0,
            kp: 0.5,
            ki: 0.1,
            kd: 0.2,
            max_adjustment: 0.3,
            base: ParamBase::default(),
        }
    }
}

/// Deadband below which a PID step is classified as `hold`.
const PID_DEADBAND: f64 = 0.02;

/// Proportional-integral-derivative controller, lite variant.
#[derive(Debug, Clone)]
pub struct PidController {
    config: PidConfig,
    integral: f64,
    last_error: f64,
    last_ms: Option<u64>,
    multiplier: f64,
    decisions: u64,
}

impl PidController {
    pub fn new(config: PidConfig) -> Self {
        Self {
            config,
            integral: 0.0,
            last_error: 0.0,
            last_ms: None,
            multiplier: 1.0,
            decisions: 0,
        }
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn decisions(&self) -> u64 {
        self.decisions
    }

    pub fn update(&mut self, now_ms: u64, metrics: &FlowMetrics) -> FlowRecommendation {
        self.decisions += 1;

        // Error is positive when under target, negative when over.
        let error = (self.config.target_p95_ms - metrics.p95_ms) / self.config.target_p95_ms;

        let dt = match self.last_ms {
            None => 1.0,
            Some(last) => ((now_ms.saturating_sub(last)) as f64 / 1000.0).max(0.1),
        };

        // Integral with anti-windup.
        self.integral = (self.integral + error * dt).clamp(-2.0, 2.0);
        let derivative = (error - self.last_error) / dt;

        let output = (self.config.kp * error + self.config.ki * self.integral
            + self.config.kd * derivative)
            .clamp(-self.config.max_adjustment, self.config.max_adjustment);

        self.multiplier = (self.multiplier * (1.0 + output)).clamp(MULTIPLIER_MIN, MULTIPLIER_MAX);
        self.last_error = error;
        self.last_ms = Some(now_ms);

        let (action, reason, confidence) = if output > PID_DEADBAND {
            (
                FlowAction::Increase,
                format!("PID: error={error:.3}, output=+{output:.3}"),
                0.85,
            )
        } else if output < -PID_DEADBAND {
            (
                FlowAction::Decrease,
                format!("PID: error={error:.3}, output={output:.3}"),
                0.9,
            )
        } else {
            (FlowAction::Hold, format!("PID: error={error:.3}, stable"), 0.7)
        };

        self.config.base.project(self.multiplier, action, reason, confidence)
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = 0.0;
        self.last_ms = None;
        self.multiplier = 1.0;
        self.decisions = 0;
    }
}

/// Which controller a [`FlowController`] delegates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowPolicy {
    Aimd,
    Pid,
}

impl fmt::Display for FlowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowPolicy::Aimd => f.write_str("aimd"),
            FlowPolicy::Pid => f.write_str("pid"),
        }
    }
}

/// Unified controller front-end with runtime policy swap and a bounded
/// metrics history for introspection.
#[derive(Debug, Clone)]
pub struct FlowController {
    policy: FlowPolicy,
    aimd: AimdController,
    pid: PidController,
    history: VecDeque<FlowMetrics>,
    last: Option<FlowRecommendation>,
}

impl FlowController {
    pub fn new(policy: FlowPolicy, target_p95_ms: f64) -> Self {
        Self {
            policy,
            aimd: AimdController::new(AimdConfig::with_target(target_p95_ms)),
            pid: PidController::new(PidConfig::with_target(target_p95_ms)),
            history: VecDeque::new(),
            last: None,
        }
    }

    pub fn policy(&self) -> FlowPolicy {
        self.policy
    }

    /// Swap the active policy. The inactive controller keeps its state so a
    /// swap back does not lose accumulated history.
    pub fn set_policy(&mut self, policy: FlowPolicy) {
        self.policy = policy;
    }

    pub fn update(&mut self, now_ms: u64, metrics: FlowMetrics) -> FlowRecommendation {
        self.history.push_back(metrics);
        if self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }

        let rec = match self.policy {
            FlowPolicy::Aimd => self.aimd.update(now_ms, &metrics),
            FlowPolicy::Pid => self.pid.update(now_ms, &metrics),
        };
        self.last = Some(rec.clone());
        rec
    }

    /// Latest recommendation, or conservative defaults before any update.
    pub fn recommend(&self) -> FlowRecommendation {
        self.last.clone().unwrap_or_else(|| {
            let base = ParamBase::default();
            FlowRecommendation {
                concurrency: base.concurrency,
                batch_size: base.batch_size,
                top_k: base.top_k,
                ef_search: base.ef_search,
                action: FlowAction::Hold,
                reason: "no_metrics_yet".into(),
                confidence: 0.0,
            }
        })
    }

    pub fn decisions(&self) -> u64 {
        match self.policy {
            FlowPolicy::Aimd => self.aimd.decisions(),
            FlowPolicy::Pid => self.pid.decisions(),
        }
    }

    pub fn metrics_seen(&self) -> usize {
        self.history.len()
    }

    pub fn reset(&mut self) {
        self.aimd.reset();
        self.pid.reset();
        self.history.clear();
        self.last = None;
    }
}

#[cfg(test)]
#[path = "flow_tests.rs"]
mod tests;
