// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Winner selection over candidate configurations.

use serde::{Deserialize, Serialize};

/// Weight of one p95 millisecond against recall in the balanced score.
pub const BALANCED_LATENCY_WEIGHT: f64 = 0.0005;

/// One measured configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub recall_at_10: f64,
    pub p95_ms: f64,
    pub cost: f64,
    pub qps: f64,
}

impl Candidate {
    /// Balanced score: `recall - 0.0005 * p95_ms`, higher wins.
    pub fn balanced_score(&self) -> f64 {
        self.recall_at_10 - BALANCED_LATENCY_WEIGHT * self.p95_ms
    }
}

/// Winners per category; a category is `None` when no candidate qualifies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WinnerSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balanced: Option<Candidate>,
}

impl WinnerSet {
    pub fn is_empty(&self) -> bool {
        self.quality.is_none() && self.latency.is_none() && self.balanced.is_none()
    }
}

/// Pick winners across the three categories with their tiebreaks.
pub fn pick_winners(candidates: &[Candidate]) -> WinnerSet {
    // Quality: max recall, tiebreak min p95.
    let quality = candidates
        .iter()
        .max_by(|a, b| {
            a.recall_at_10
                .total_cmp(&b.recall_at_10)
                .then(b.p95_ms.total_cmp(&a.p95_ms))
        })
        .cloned();

    // Latency: min p95 among measured (p95 > 0), tiebreak max recall.
    let latency = candidates
        .iter()
        .filter(|c| c.p95_ms > 0.0)
        .min_by(|a, b| {
            a.p95_ms
                .total_cmp(&b.p95_ms)
                .then(b.recall_at_10.total_cmp(&a.recall_at_10))
        })
        .cloned();

    // Balanced: max recall - 0.0005 * p95.
    let balanced = candidates
        .iter()
        .max_by(|a, b| a.balanced_score().total_cmp(&b.balanced_score()))
        .cloned();

    WinnerSet {
        quality,
        latency,
        balanced,
    }
}

/// Acceptance gates applied by the stricter sweep winner pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepGates {
    pub min_recall_at_10: f64,
    pub max_p95_ms: f64,
    /// Minimum recall gain a reranked variant must show over the baseline.
    pub min_delta_recall: f64,
    /// Maximum p95 regression a reranked variant may add.
    pub max_delta_p95_ms: f64,
}

impl Default for SweepGates {
    fn default() -> Self {
        Self {
            min_recall_at_10: 0.94,
            max_p95_ms: 1800.0,
            min_delta_recall: 0.01,
            max_delta_p95_ms: 200.0,
        }
    }
}

impl SweepGates {
    pub fn admits(&self, c: &Candidate) -> bool {
        c.recall_at_10 >= self.min_recall_at_10 && c.p95_ms <= self.max_p95_ms
    }

    /// Accept a reranked variant over its hybrid baseline only when the
    /// recall gain and latency regression both clear the gates.
    pub fn accepts_rerank(&self, rerank: &Candidate, hybrid_baseline: &Candidate) -> bool {
        let delta_recall = rerank.recall_at_10 - hybrid_baseline.recall_at_10;
        let delta_p95 = rerank.p95_ms - hybrid_baseline.p95_ms;
        delta_recall >= self.min_delta_recall && delta_p95 <= self.max_delta_p95_ms
    }
}

/// Winner pass for sweeps: gate first, then pick per category.
pub fn pick_gated_winners(candidates: &[Candidate], gates: &SweepGates) -> WinnerSet {
    let admitted: Vec<Candidate> = candidates
        .iter()
        .filter(|c| gates.admits(c))
        .cloned()
        .collect();
    pick_winners(&admitted)
}

#[cfg(test)]
#[path = "winners_tests.rs"]
mod tests;
