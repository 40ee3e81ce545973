// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recognized environment variables. Unknown variables are ignored;
//! unparseable values fall back to `None` with a warning.

use std::path::PathBuf;
use tracing::warn;

/// Environment-derived configuration, read once at startup.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    /// Rich backend endpoint.
    pub qdrant_url: Option<String>,
    /// External search backend the load generator drives.
    pub rag_api_base: Option<String>,
    /// Override path for `bandit_state.json`.
    pub bandit_state: Option<PathBuf>,
    /// EMA smoothing factor override.
    pub bandit_alpha: Option<f64>,
    /// `k=v,k=v` reward weight overrides (parsed by `sl-control`).
    pub reward_weights: Option<String>,
    pub target_p95: Option<f64>,
    pub sla_p95: Option<f64>,
    /// Label attached to run summaries.
    pub run_tag: Option<String>,
    /// Root of the reports tree.
    pub runs_dir: Option<PathBuf>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            qdrant_url: read_string("QDRANT_URL"),
            rag_api_base: read_string("RAG_API_BASE"),
            bandit_state: read_string("BANDIT_STATE").map(PathBuf::from),
            bandit_alpha: read_f64("BANDIT_ALPHA"),
            reward_weights: read_string("REWARD_WEIGHTS"),
            target_p95: read_f64("TARGET_P95"),
            sla_p95: read_f64("SLA_P95"),
            run_tag: read_string("RUN_TAG"),
            runs_dir: read_string("RUNS_DIR").map(PathBuf::from),
        }
    }

    /// Effective p95 target: `TARGET_P95`, then `SLA_P95`, then the default.
    pub fn effective_target_p95(&self, default: f64) -> f64 {
        self.target_p95.or(self.sla_p95).unwrap_or(default)
    }
}

fn read_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn read_f64(name: &str) -> Option<f64> {
    let raw = read_string(name)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring unparseable env var");
            None
        }
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
