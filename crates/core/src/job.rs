// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job identifier, kind allow-list, and status state machine.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Unique identifier for a submitted job.
///
/// Matches `^[A-Za-z0-9_\-]{1,200}$`; enforced by
/// [`crate::guard::validate_job_id`] at every API boundary. Fresh ids are
/// minted with [`JobId::generate`], which keeps the kind visible in logs
/// and report paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh id of the form `{kind}-{8 hex chars}`.
    pub fn generate(kind: JobKind) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", kind.as_str(), &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for JobId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for JobId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Allow-listed experiment kinds. Unknown kinds are rejected at submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    #[serde(rename = "fiqa-fast")]
    FiqaFast,
    #[serde(rename = "canary")]
    Canary,
    #[serde(rename = "ab")]
    Ab,
    #[serde(rename = "sweep")]
    Sweep,
    #[serde(rename = "bandit-round")]
    BanditRound,
}

impl JobKind {
    pub const ALL: [JobKind; 5] = [
        JobKind::FiqaFast,
        JobKind::Canary,
        JobKind::Ab,
        JobKind::Sweep,
        JobKind::BanditRound,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::FiqaFast => "fiqa-fast",
            JobKind::Canary => "canary",
            JobKind::Ab => "ab",
            JobKind::Sweep => "sweep",
            JobKind::BanditRound => "bandit-round",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| {
                CoreError::invalid_input(format!("unknown job kind {s:?}"))
                    .with_detail("expected one of: fiqa-fast, canary, ab, sweep, bandit-round")
            })
    }
}

/// Job lifecycle status.
///
/// `QUEUED → RUNNING → (SUCCEEDED|FAILED|CANCELLED|ABORTED)`; a queued job
/// may also be cancelled directly. Terminal states are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Aborted,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Aborted
        )
    }

    /// Whether the state machine permits `self → to`.
    pub fn can_transition(&self, to: JobStatus) -> bool {
        match (self, to) {
            (JobStatus::Queued, JobStatus::Running) => true,
            (JobStatus::Queued, JobStatus::Cancelled) => true,
            // Worker failed to launch: the job never reaches RUNNING.
            (JobStatus::Queued, JobStatus::Failed) => true,
            (JobStatus::Running, JobStatus::Succeeded) => true,
            (JobStatus::Running, JobStatus::Failed) => true,
            (JobStatus::Running, JobStatus::Cancelled) => true,
            (JobStatus::Running, JobStatus::Aborted) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Aborted => "ABORTED",
        };
        f.write_str(s)
    }
}

/// Configuration for creating a new job.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub id: JobId,
    pub kind: JobKind,
    /// Resolved argv; never accepted raw from clients.
    pub cmd: Vec<String>,
    pub request_fingerprint: String,
    pub queued_at_ms: u64,
}

/// A job instance owned by the job state store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Resolved argv (internal; never accepted raw from clients).
    pub cmd: Vec<String>,
    /// OS process id while `RUNNING`, else `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub queued_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    /// Stable hash of the normalized request, for idempotent submission.
    pub request_fingerprint: String,
    /// Why a job ended in FAILED or ABORTED, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Role → relative path of produced artifacts (winners.json, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub artifacts: HashMap<String, String>,
}

impl Job {
    pub fn new(config: JobConfig) -> Self {
        Self {
            id: config.id,
            kind: config.kind,
            status: JobStatus::Queued,
            cmd: config.cmd,
            pid: None,
            queued_at_ms: config.queued_at_ms,
            started_at_ms: None,
            finished_at_ms: None,
            request_fingerprint: config.request_fingerprint,
            reason: None,
            artifacts: HashMap::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a status transition, updating timestamps and pid bookkeeping.
    ///
    /// Rejects transitions the state machine does not permit; terminal
    /// states never change.
    pub fn transition(&mut self, to: JobStatus, now_ms: u64) -> Result<(), CoreError> {
        if !self.status.can_transition(to) {
            return Err(CoreError::conflict(format!(
                "invalid transition {} -> {} for job {}",
                self.status, to, self.id
            )));
        }
        match to {
            JobStatus::Running => self.started_at_ms = Some(now_ms),
            _ if to.is_terminal() => {
                self.finished_at_ms = Some(now_ms);
                self.pid = None;
            }
            _ => {}
        }
        self.status = to;
        Ok(())
    }

    pub fn record_artifact(&mut self, role: impl Into<String>, rel_path: impl Into<String>) {
        self.artifacts.insert(role.into(), rel_path.into());
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
