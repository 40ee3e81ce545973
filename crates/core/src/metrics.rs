// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-request measurement types shared by the load generator and the
//! metrics aggregator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named segment of a run. Warmup is never scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "warmup")]
    Warmup,
    A,
    B,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Warmup => "warmup",
            Phase::A => "A",
            Phase::B => "B",
        }
    }

    /// Whether samples from this phase participate in scoring.
    pub fn is_scored(&self) -> bool {
        !matches!(self, Phase::Warmup)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request outcome as recorded by the load generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub ts_ms: u64,
    pub phase: Phase,
    /// Position of the request in the deterministic query plan.
    pub query_seq: u64,
    pub topk: u32,
    pub latency_ms: f64,
    /// HTTP-style status code; timeouts record 0 with `error` set.
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Present only for the sampled fraction of requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall_at_k: Option<f64>,
    pub backend_used: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_hit: Option<bool>,
}

impl MetricSample {
    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.status == 0 || self.status >= 400
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
