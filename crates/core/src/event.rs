// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run event types for the append-only audit trail.
//!
//! One event per line of `events/{run_id}.jsonl`. Serializes with
//! `{"ts_ms":..,"run_id":..,"event_type":"RUN_QUEUED",...fields}`.

use crate::job::JobId;
use crate::metrics::MetricSample;
use serde::{Deserialize, Serialize};

/// Unique identifier for an orchestrated run.
///
/// A committed run shares its identifier with the job that executes it
/// ([`RunId::for_job`]); the distinct type keeps run-scoped APIs (event
/// logs, reports) from accepting arbitrary job ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The run backing the given job.
    pub fn for_job(id: &JobId) -> Self {
        Self(id.as_str().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for RunId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// A single audit-trail entry scoped to one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub ts_ms: u64,
    pub run_id: RunId,
    #[serde(flatten)]
    pub kind: RunEventKind,
}

impl RunEvent {
    pub fn new(run_id: RunId, ts_ms: u64, kind: RunEventKind) -> Self {
        Self {
            ts_ms,
            run_id,
            kind,
        }
    }

    /// Whether this event closes the run's audit trail.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            RunEventKind::RunSucceeded {}
                | RunEventKind::RunFailed { .. }
                | RunEventKind::RunCancelled {}
        )
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }
}

/// Payload variants for [`RunEvent`], discriminated by `event_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum RunEventKind {
    #[serde(rename = "RUN_QUEUED")]
    RunQueued { kind: String, queue_position: u32 },

    #[serde(rename = "RUN_STARTED")]
    RunStarted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pid: Option<u32>,
    },

    /// Emitted instead of `RUN_QUEUED` when a plan request has `commit=false`.
    #[serde(rename = "DRY_RUN_PLAN")]
    DryRunPlan { plan: serde_json::Value },

    /// Compact per-stage summary emitted at every stage boundary.
    #[serde(rename = "STAGE")]
    Stage {
        stage: String,
        summary: serde_json::Value,
    },

    #[serde(rename = "METRIC_SAMPLE")]
    MetricSample { sample: MetricSample },

    #[serde(rename = "WINNER")]
    Winner { winners: serde_json::Value },

    #[serde(rename = "SLA_VERDICT")]
    SlaVerdict {
        verdict: String,
        detail: serde_json::Value,
    },

    #[serde(rename = "RUN_SUCCEEDED")]
    RunSucceeded {},

    #[serde(rename = "RUN_FAILED")]
    RunFailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
        reason: String,
    },

    #[serde(rename = "RUN_CANCELLED")]
    RunCancelled {},

    /// Emitted exactly once when a run exceeds its event budget; all
    /// further events for the run are dropped.
    #[serde(rename = "TRUNCATED")]
    Truncated { dropped_after: u32 },
}

impl RunEventKind {
    pub fn event_type(&self) -> &'static str {
        match self {
            RunEventKind::RunQueued { .. } => "RUN_QUEUED",
            RunEventKind::RunStarted { .. } => "RUN_STARTED",
            RunEventKind::DryRunPlan { .. } => "DRY_RUN_PLAN",
            RunEventKind::Stage { .. } => "STAGE",
            RunEventKind::MetricSample { .. } => "METRIC_SAMPLE",
            RunEventKind::Winner { .. } => "WINNER",
            RunEventKind::SlaVerdict { .. } => "SLA_VERDICT",
            RunEventKind::RunSucceeded {} => "RUN_SUCCEEDED",
            RunEventKind::RunFailed { .. } => "RUN_FAILED",
            RunEventKind::RunCancelled {} => "RUN_CANCELLED",
            RunEventKind::Truncated { .. } => "TRUNCATED",
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
