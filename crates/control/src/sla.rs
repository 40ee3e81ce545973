// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SLA verdicts, threshold auto-tuning, and the sliding-window breach
//! monitor that feeds the controllers during canary runs.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Schema version for the persisted policy file.
pub const SLA_POLICY_VERSION: u32 = 1;

/// Persisted SLA thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlaPolicy {
    #[serde(default = "default_policy_version")]
    pub schema_version: u32,
    pub recall_at_10_min: f64,
    pub p95_ms_max: f64,
    pub cost_max: f64,
}

fn default_policy_version() -> u32 {
    SLA_POLICY_VERSION
}

impl Default for SlaPolicy {
    fn default() -> Self {
        Self {
            schema_version: SLA_POLICY_VERSION,
            recall_at_10_min: 0.30,
            p95_ms_max: 1500.0,
            cost_max: 5.0,
        }
    }
}

impl SlaPolicy {
    /// Rewrite thresholds from an observed winner with safety margins.
    ///
    /// `recall_at_10_min = clamp(0.9 * recall, 0.30, 0.99)`,
    /// `p95_ms_max = max(50, 1.10 * p95)`; `cost_max` is preserved.
    pub fn autotune(&self, observed_recall: f64, observed_p95_ms: f64) -> SlaPolicy {
        let recall_min = if observed_recall > 0.0 {
            (0.9 * observed_recall).clamp(0.30, 0.99)
        } else {
            0.30
        };
        let p95_max = if observed_p95_ms > 0.0 {
            (1.10 * observed_p95_ms).max(50.0)
        } else {
            self.p95_ms_max
        };
        SlaPolicy {
            schema_version: SLA_POLICY_VERSION,
            recall_at_10_min: recall_min,
            p95_ms_max: p95_max,
            cost_max: self.cost_max,
        }
    }
}

/// Sub-verdict color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Green,
    Yellow,
    Red,
}

/// Overall verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Overall {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for Overall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Overall::Pass => "PASS",
            Overall::Warn => "WARN",
            Overall::Fail => "FAIL",
        };
        f.write_str(s)
    }
}

/// Measurements a verdict is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerdictInput {
    pub delta_recall: f64,
    pub p_value: f64,
    /// Number of comparison buckets behind the statistics.
    pub buckets: u32,
    pub delta_p95_ms: f64,
    pub safety_rate: f64,
    pub apply_rate: f64,
    pub cost_per_query: f64,
}

/// Three-color verdict over one configuration measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub quality: Color,
    pub sla: Color,
    pub cost: Color,
    pub overall: Overall,
}

/// Quality: green needs significance (p < 0.05, ≥ 10 buckets) and no
/// meaningful recall loss; a loss beyond 1% is red regardless of
/// significance, weak evidence without loss is yellow.
fn quality_color(input: &VerdictInput) -> Color {
    if input.delta_recall < -0.01 {
        return Color::Red;
    }
    if input.p_value < 0.05 && input.buckets >= 10 {
        Color::Green
    } else {
        Color::Yellow
    }
}

/// SLA: green within 5 ms regression at high safety/apply rates; yellow up
/// to 50 ms with safety ≥ 0.95; red beyond.
fn sla_color(input: &VerdictInput) -> Color {
    if input.delta_p95_ms <= 5.0 && input.safety_rate >= 0.99 && input.apply_rate >= 0.95 {
        Color::Green
    } else if input.delta_p95_ms <= 50.0 && input.safety_rate >= 0.95 {
        Color::Yellow
    } else {
        Color::Red
    }
}

/// Cost: green ≤ $5e-5 per query, yellow ≤ $1e-4, red above.
fn cost_color(input: &VerdictInput) -> Color {
    if input.cost_per_query <= 5e-5 {
        Color::Green
    } else if input.cost_per_query <= 1e-4 {
        Color::Yellow
    } else {
        Color::Red
    }
}

/// Evaluate the three sub-verdicts and fold them into an overall verdict:
/// PASS iff all green, FAIL iff any red, WARN otherwise.
pub fn evaluate(input: &VerdictInput) -> Verdict {
    let quality = quality_color(input);
    let sla = sla_color(input);
    let cost = cost_color(input);

    let colors = [quality, sla, cost];
    let overall = if colors.iter().any(|c| *c == Color::Red) {
        Overall::Fail
    } else if colors.iter().all(|c| *c == Color::Green) {
        Overall::Pass
    } else {
        Overall::Warn
    };

    Verdict {
        quality,
        sla,
        cost,
        overall,
    }
}

/// Breach level reported by the sliding-window monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreachLevel {
    None,
    Soft,
    Hard,
}

/// Monitor targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlaTargets {
    pub p95_target_ms: f64,
    pub p99_hard_ms: f64,
    pub window_ms: u64,
    pub min_samples: usize,
    pub enabled: bool,
}

impl Default for SlaTargets {
    fn default() -> Self {
        Self {
            p95_target_ms: 120.0,
            p99_hard_ms: 250.0,
            window_ms: 30_000,
            min_samples: 30,
            enabled: true,
        }
    }
}

/// Result of one monitor evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreachReport {
    pub level: BreachLevel,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub samples: usize,
}

/// Sliding-window latency monitor with soft (p95) and hard (p99) breach
/// levels. Disabled monitors skip sampling entirely.
#[derive(Debug, Clone)]
pub struct SlaMonitor {
    targets: SlaTargets,
    buf: VecDeque<(u64, f64)>,
}

impl SlaMonitor {
    pub fn new(targets: SlaTargets) -> Self {
        Self {
            targets,
            buf: VecDeque::new(),
        }
    }

    pub fn targets(&self) -> &SlaTargets {
        &self.targets
    }

    /// Record one latency sample at `ts_ms`, evicting anything outside the
    /// window.
    pub fn feed(&mut self, ts_ms: u64, latency_ms: f64) {
        if !self.targets.enabled {
            return;
        }
        self.buf.push_back((ts_ms, latency_ms));
        let cutoff = ts_ms.saturating_sub(self.targets.window_ms);
        while self.buf.front().is_some_and(|(t, _)| *t < cutoff) {
            self.buf.pop_front();
        }
    }

    /// Evaluate the current window. Returns `None` level until
    /// `min_samples` are present.
    pub fn evaluate(&self) -> BreachReport {
        if !self.targets.enabled {
            return BreachReport {
                level: BreachLevel::None,
                p95_ms: 0.0,
                p99_ms: 0.0,
                samples: 0,
            };
        }
        let samples = self.buf.len();
        if samples < self.targets.min_samples {
            return BreachReport {
                level: BreachLevel::None,
                p95_ms: 0.0,
                p99_ms: 0.0,
                samples,
            };
        }

        let mut values: Vec<f64> = self.buf.iter().map(|(_, v)| *v).collect();
        values.sort_by(|a, b| a.total_cmp(b));
        let p95 = percentile(&values, 0.95);
        let p99 = percentile(&values, 0.99);

        let level = if p99 >= self.targets.p99_hard_ms {
            BreachLevel::Hard
        } else if p95 >= self.targets.p95_target_ms {
            BreachLevel::Soft
        } else {
            BreachLevel::None
        };

        BreachReport {
            level,
            p95_ms: p95,
            p99_ms: p99,
            samples,
        }
    }
}

/// Nearest-rank percentile over a pre-sorted slice.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 * q) as usize).min(sorted.len() - 1);
    sorted[idx]
}

#[cfg(test)]
#[path = "sla_tests.rs"]
mod tests;
