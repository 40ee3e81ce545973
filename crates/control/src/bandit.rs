// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bandit arm selection, reward computation, and state updates.
//!
//! Arms come from a fixed policy catalog; per-arm state is persisted by
//! `sl-storage` and passed in as a snapshot. All functions here are pure;
//! randomness for ε-greedy comes from a caller-supplied seeded rng.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sl_core::CoreError;
use std::collections::BTreeMap;

/// Schema version for `bandit_state.json`.
pub const BANDIT_STATE_VERSION: u32 = 1;

/// Reward weights; overridable via the `REWARD_WEIGHTS` spec string.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardWeights {
    pub recall: f64,
    pub latency: f64,
    pub error: f64,
    pub cost: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            recall: 1.0,
            latency: 0.7,
            error: 1.2,
            cost: 0.3,
        }
    }
}

impl RewardWeights {
    /// Parse a `recall=1.0,latency=0.7,error=1.2,cost=0.3` override string.
    ///
    /// Unknown keys and unparseable values are rejected; missing keys keep
    /// their defaults.
    pub fn parse(spec: &str) -> Result<Self, CoreError> {
        let mut weights = Self::default();
        for part in spec.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part.split_once('=').ok_or_else(|| {
                CoreError::invalid_input(format!("reward weight {part:?} is not k=v"))
            })?;
            let value: f64 = value.trim().parse().map_err(|_| {
                CoreError::invalid_input(format!("reward weight {key:?} has non-numeric value"))
            })?;
            match key.trim() {
                "recall" => weights.recall = value,
                "latency" => weights.latency = value,
                "error" => weights.error = value,
                "cost" => weights.cost = value,
                other => {
                    return Err(CoreError::invalid_input(format!(
                        "unknown reward weight key {other:?}"
                    ))
                    .with_detail("expected recall, latency, error, or cost"));
                }
            }
        }
        Ok(weights)
    }
}

/// Metrics captured alongside the most recent reward update for an arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmMetrics {
    pub p95_ms: f64,
    pub recall_at_10: f64,
    pub error_rate: f64,
    pub cost: f64,
    pub samples: u64,
    /// ISO-8601, supplied by the caller (this crate never reads a clock).
    pub updated_at: String,
}

/// Persisted state for one arm.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmState {
    pub counts: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_reward: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub streak: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_metrics: Option<ArmMetrics>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub window_stats: serde_json::Value,
}

/// Full persisted bandit state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanditState {
    pub schema_version: u32,
    #[serde(default)]
    pub arms: BTreeMap<String, ArmState>,
}

impl Default for BanditState {
    fn default() -> Self {
        Self {
            schema_version: BANDIT_STATE_VERSION,
            arms: BTreeMap::new(),
        }
    }
}

impl BanditState {
    pub fn arm(&self, name: &str) -> ArmState {
        self.arms.get(name).cloned().unwrap_or_default()
    }
}

/// Selection algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectAlgo {
    Ucb1,
    Epsilon,
}

/// Selection configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectConfig {
    pub algo: SelectAlgo,
    /// Exploration rate for ε-greedy.
    pub eps: f64,
    /// Per-round ε decay, reported in the selection reason.
    pub eps_decay: f64,
    /// Arms below this count are force-rotated before the main algorithm.
    pub min_samples: u64,
}

impl Default for SelectConfig {
    fn default() -> Self {
        Self {
            algo: SelectAlgo::Ucb1,
            eps: 0.10,
            eps_decay: 0.98,
            min_samples: 15,
        }
    }
}

/// How a selection was made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionKind {
    MinSampleRoundRobin,
    Ucb1 { total: u64 },
    EpsilonExplore { roll: f64 },
    EpsilonExploit { roll: f64 },
}

/// Result of one arm selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub picked: String,
    pub kind: SelectionKind,
    /// Per-arm index values the decision was made over.
    pub indices: BTreeMap<String, f64>,
    pub counts: BTreeMap<String, u64>,
}

/// Pick the next arm to play.
///
/// Under-sampled arms (counts < `min_samples`) are rotated first, lowest
/// count winning with name as tiebreak; unseen arms get a +∞ UCB index.
pub fn select_arm(
    arms: &[String],
    state: &BanditState,
    config: &SelectConfig,
    rng: &mut StdRng,
) -> Result<Selection, CoreError> {
    if arms.is_empty() {
        return Err(CoreError::invalid_input("arm catalog is empty"));
    }

    let counts: BTreeMap<String, u64> = arms
        .iter()
        .map(|a| (a.clone(), state.arm(a).counts))
        .collect();
    let rewards: BTreeMap<String, f64> = arms
        .iter()
        .map(|a| (a.clone(), state.arm(a).avg_reward.unwrap_or(0.0)))
        .collect();

    // Forced rotation until every arm has a minimum sample base.
    let mut under: Vec<&String> = arms
        .iter()
        .filter(|a| counts.get(*a).copied().unwrap_or(0) < config.min_samples)
        .collect();
    if !under.is_empty() {
        under.sort_by_key(|a| (counts.get(*a).copied().unwrap_or(0), (*a).clone()));
        return Ok(Selection {
            picked: under[0].clone(),
            kind: SelectionKind::MinSampleRoundRobin,
            indices: rewards,
            counts,
        });
    }

    match config.algo {
        SelectAlgo::Ucb1 => {
            let total: u64 = counts.values().sum();
            let mut indices = BTreeMap::new();
            let mut best: Option<(&String, f64)> = None;
            for arm in arms {
                let n = counts.get(arm).copied().unwrap_or(0);
                let index = if n == 0 || total == 0 {
                    f64::INFINITY
                } else {
                    let bonus = (2.0 * (total as f64).ln() / n as f64).sqrt();
                    rewards.get(arm).copied().unwrap_or(0.0) + bonus
                };
                indices.insert(arm.clone(), index);
                if best.is_none_or(|(_, b)| index > b) {
                    best = Some((arm, index));
                }
            }
            let picked = best
                .map(|(a, _)| a.clone())
                .ok_or_else(|| CoreError::invalid_input("arm catalog is empty"))?;
            Ok(Selection {
                picked,
                kind: SelectionKind::Ucb1 { total },
                indices,
                counts,
            })
        }
        SelectAlgo::Epsilon => {
            let eps = config.eps.clamp(0.0, 1.0);
            let roll: f64 = rng.random();
            let (picked, kind) = if roll < eps {
                let idx = rng.random_range(0..arms.len());
                (arms[idx].clone(), SelectionKind::EpsilonExplore { roll })
            } else {
                // Exploit: highest average, tiebreak lower counts then name.
                let mut best = arms[0].clone();
                for arm in &arms[1..] {
                    let (br, bc) = (
                        rewards.get(&best).copied().unwrap_or(0.0),
                        counts.get(&best).copied().unwrap_or(0),
                    );
                    let (ar, ac) = (
                        rewards.get(arm).copied().unwrap_or(0.0),
                        counts.get(arm).copied().unwrap_or(0),
                    );
                    if ar > br || (ar == br && ac < bc) {
                        best = arm.clone();
                    }
                }
                (best, SelectionKind::EpsilonExploit { roll })
            };
            Ok(Selection {
                picked,
                kind,
                indices: rewards,
                counts,
            })
        }
    }
}

/// Raw measurement a reward is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardInput {
    pub recall: f64,
    pub p95_ms: f64,
    pub error_rate: f64,
    pub cost_per_query: f64,
}

/// Scalar reward with simple, explainable normalization.
///
/// `recall` is clamped to [0,1]; `p95/target` to [0,2]; error and cost are
/// floored at 0. Higher is better.
pub fn compute_reward(input: &RewardInput, weights: &RewardWeights, target_p95: f64) -> f64 {
    let recall_norm = input.recall.clamp(0.0, 1.0);
    let target = if target_p95 > 0.0 {
        target_p95
    } else if input.p95_ms > 0.0 {
        input.p95_ms
    } else {
        1.0
    }
    .max(1e-6);
    let p95_norm = (input.p95_ms / target).clamp(0.0, 2.0);
    let error_norm = input.error_rate.max(0.0);
    let cost_norm = input.cost_per_query.max(0.0);

    weights.recall * recall_norm
        - weights.latency * p95_norm
        - weights.error * error_norm
        - weights.cost * cost_norm
}

/// EMA update configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// EMA smoothing factor (`BANDIT_ALPHA`).
    pub alpha: f64,
    /// Sample threshold for full EMA weighting.
    pub min_samples: u64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            min_samples: 15,
        }
    }
}

/// Apply one reward observation to an arm.
///
/// The effective EMA weight is damped while the measurement is
/// under-sampled: `weight = alpha * min(1, samples / min_samples)`.
/// `winner` drives the streak: a win increments, anything else (including
/// a tie) resets; `None` leaves the streak untouched.
pub fn apply_reward(
    arm: &mut ArmState,
    reward: f64,
    winner: Option<bool>,
    metrics: ArmMetrics,
    config: &UpdateConfig,
) {
    let samples = metrics.samples.max(1);
    let min_samples = config.min_samples.max(1);
    let alpha = config.alpha.clamp(0.0, 1.0);

    arm.counts += samples;

    arm.avg_reward = Some(match arm.avg_reward {
        None => reward,
        Some(prev) => {
            let weight = alpha * (samples as f64 / min_samples as f64).min(1.0);
            (1.0 - weight) * prev + weight * reward
        }
    });

    if let Some(won) = winner {
        arm.streak = if won { arm.streak + 1 } else { 0 };
    }

    arm.last_updated = Some(metrics.updated_at.clone());
    arm.last_metrics = Some(metrics);
}

/// Drift classification for one arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DriftStatus {
    Ok,
    Drift,
    #[serde(rename = "missing")]
    Missing,
}

/// One row of the post-round drift self-audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftRecord {
    pub arm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instant_reward: Option<f64>,
    pub state_avg: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abs_delta: Option<f64>,
    pub status: DriftStatus,
}

/// Allowed disagreement between instant reward and stored average.
pub const DRIFT_THRESHOLD: f64 = 0.1;

/// Recompute each arm's instant reward from its `last_metrics` and compare
/// against the stored average.
pub fn drift_audit(
    state: &BanditState,
    weights: &RewardWeights,
    target_p95: f64,
) -> Vec<DriftRecord> {
    state
        .arms
        .iter()
        .map(|(name, arm)| {
            let state_avg = arm.avg_reward.unwrap_or(0.0);
            match &arm.last_metrics {
                None => DriftRecord {
                    arm: name.clone(),
                    instant_reward: None,
                    state_avg,
                    abs_delta: None,
                    status: DriftStatus::Missing,
                },
                Some(m) => {
                    let instant = compute_reward(
                        &RewardInput {
                            recall: m.recall_at_10,
                            p95_ms: m.p95_ms,
                            error_rate: m.error_rate,
                            cost_per_query: m.cost,
                        },
                        weights,
                        target_p95,
                    );
                    let delta = (instant - state_avg).abs();
                    DriftRecord {
                        arm: name.clone(),
                        instant_reward: Some(instant),
                        state_avg,
                        abs_delta: Some(delta),
                        status: if delta <= DRIFT_THRESHOLD {
                            DriftStatus::Ok
                        } else {
                            DriftStatus::Drift
                        },
                    }
                }
            }
        })
        .collect()
}

/// Relative reward disagreement tolerated by the A/B alignment check.
pub const AB_TOLERANCE: f64 = 0.2;

/// Independent A/B measurement for one arm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbMeasurement {
    pub p95_ms: f64,
    pub recall_at_10: f64,
    pub error_rate: f64,
    pub cost: f64,
}

/// One row of the A/B alignment check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbAlignment {
    pub arm: String,
    pub calc_reward: f64,
    pub avg_reward: f64,
    pub consistent: bool,
}

/// Compare rewards recomputed from A/B measurements against stored
/// averages; arms without a measurement are skipped.
///
/// Consistency is judged by the relative difference
/// `|calc - avg| / max(|calc|, |avg|, 1e-6)`, so large rewards tolerate
/// proportionally more drift than rewards near zero.
pub fn ab_alignment(
    state: &BanditState,
    measurements: &BTreeMap<String, AbMeasurement>,
    weights: &RewardWeights,
    target_p95: f64,
) -> Vec<AbAlignment> {
    measurements
        .iter()
        .map(|(arm, m)| {
            let calc = compute_reward(
                &RewardInput {
                    recall: m.recall_at_10,
                    p95_ms: m.p95_ms,
                    error_rate: m.error_rate,
                    cost_per_query: m.cost,
                },
                weights,
                target_p95,
            );
            let avg = state.arm(arm).avg_reward.unwrap_or(0.0);
            let denom = calc.abs().max(avg.abs()).max(1e-6);
            AbAlignment {
                arm: arm.clone(),
                calc_reward: calc,
                avg_reward: avg,
                consistent: (calc - avg).abs() / denom <= AB_TOLERANCE,
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "bandit_tests.rs"]
mod tests;
