// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable job state store backed by a single `jobs.json` snapshot.
//!
//! The store exclusively owns `Job` entries; everything else holds
//! immutable clones. Writes are sequenced through the internal mutex and
//! flushed as a full-document rewrite via temp-then-rename. On boot,
//! RUNNING entries whose pid is gone are rewritten to ABORTED.

use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sl_core::{CoreError, Job, JobId, JobStatus};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{info, warn};

/// Schema version for `jobs.json`.
pub const JOBS_SCHEMA_VERSION: u32 = 1;

/// Errors that can occur in job store operations
#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(#[from] CoreError),
}

impl From<JobStoreError> for CoreError {
    fn from(err: JobStoreError) -> Self {
        match err {
            JobStoreError::Invalid(e) => e,
            other => CoreError::fatal(format!("job store failure: {other}")),
        }
    }
}

/// On-disk document shape.
#[derive(Debug, Serialize, Deserialize)]
struct JobsDocument {
    #[serde(default = "default_schema_version")]
    schema_version: u32,
    jobs: Vec<Job>,
    updated_at: String,
}

fn default_schema_version() -> u32 {
    JOBS_SCHEMA_VERSION
}

/// Probe for OS process liveness.
pub trait PidProbe: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Production probe: `kill -0 <pid>`.
#[derive(Debug, Clone, Default)]
pub struct KillPidProbe;

impl PidProbe for KillPidProbe {
    fn is_alive(&self, pid: u32) -> bool {
        Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

/// Test probe with an explicit set of live pids.
#[derive(Debug, Clone, Default)]
pub struct FakePidProbe {
    live: std::collections::HashSet<u32>,
}

impl FakePidProbe {
    pub fn with_live(pids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            live: pids.into_iter().collect(),
        }
    }
}

impl PidProbe for FakePidProbe {
    fn is_alive(&self, pid: u32) -> bool {
        self.live.contains(&pid)
    }
}

/// Mutex-guarded job map with snapshot persistence.
pub struct JobStore {
    path: PathBuf,
    inner: Mutex<IndexMap<String, Job>>,
}

impl JobStore {
    /// Load the store, rotating a corrupt document to `.bak` and starting
    /// empty rather than refusing to boot.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, JobStoreError> {
        let path = path.into();
        let jobs = match std::fs::read(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IndexMap::new(),
            Err(e) => return Err(e.into()),
            Ok(raw) => match serde_json::from_slice::<JobsDocument>(&raw) {
                Ok(doc) => doc
                    .jobs
                    .into_iter()
                    .map(|j| (j.id.as_str().to_string(), j))
                    .collect(),
                Err(e) => {
                    let bak = crate::fsutil::rotate_bak_path(&path);
                    warn!(
                        error = %e,
                        path = %path.display(),
                        bak = %bak.display(),
                        "Corrupt jobs.json, moving to .bak and starting fresh",
                    );
                    std::fs::rename(&path, &bak)?;
                    IndexMap::new()
                }
            },
        };

        Ok(Self {
            path,
            inner: Mutex::new(jobs),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.inner.lock().get(id.as_str()).cloned()
    }

    /// All jobs, newest submission first.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.inner.lock().values().cloned().collect();
        jobs.sort_by(|a, b| b.queued_at_ms.cmp(&a.queued_at_ms));
        jobs
    }

    /// Most recent job carrying the given request fingerprint.
    pub fn find_by_fingerprint(&self, fingerprint: &str) -> Option<Job> {
        self.list()
            .into_iter()
            .find(|j| j.request_fingerprint == fingerprint)
    }

    /// The running job, if any. More than one RUNNING entry is an
    /// invariant violation surfaced as `Fatal`.
    pub fn running(&self) -> Result<Option<Job>, CoreError> {
        let inner = self.inner.lock();
        let mut running = inner.values().filter(|j| j.status == JobStatus::Running);
        let first = running.next().cloned();
        if running.next().is_some() {
            return Err(CoreError::fatal(
                "invariant violation: more than one RUNNING job",
            ));
        }
        Ok(first)
    }

    pub fn queued(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .inner
            .lock()
            .values()
            .filter(|j| j.status == JobStatus::Queued)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.queued_at_ms);
        jobs
    }

    /// Queue position of a QUEUED job (0 = next), `None` otherwise.
    pub fn queue_position(&self, id: &JobId) -> Option<u32> {
        self.queued()
            .iter()
            .position(|j| &j.id == id)
            .map(|p| p as u32)
    }

    /// Insert or replace a job and rewrite the snapshot.
    pub fn upsert(&self, job: Job) -> Result<(), JobStoreError> {
        let mut inner = self.inner.lock();
        inner.insert(job.id.as_str().to_string(), job);
        self.persist_locked(&inner)
    }

    /// Apply a mutation to one job under the store lock and persist.
    pub fn update<F>(&self, id: &JobId, f: F) -> Result<Job, JobStoreError>
    where
        F: FnOnce(&mut Job) -> Result<(), CoreError>,
    {
        let mut inner = self.inner.lock();
        let job = inner
            .get_mut(id.as_str())
            .ok_or_else(|| CoreError::not_found(format!("job {id} not found")))?;
        f(job)?;
        let updated = job.clone();
        self.persist_locked(&inner)?;
        Ok(updated)
    }

    /// Rewrite RUNNING entries with dead pids to ABORTED.
    ///
    /// `journal` runs for each zombie before its entry is mutated, so the
    /// repair event hits the audit log ahead of the state change.
    pub fn reconcile_on_boot<F>(
        &self,
        probe: &dyn PidProbe,
        now_ms: u64,
        mut journal: F,
    ) -> Result<Vec<Job>, JobStoreError>
    where
        F: FnMut(&Job),
    {
        let mut inner = self.inner.lock();
        let mut reaped = Vec::new();

        for job in inner.values_mut() {
            if job.status != JobStatus::Running {
                continue;
            }
            let alive = job.pid.is_some_and(|pid| probe.is_alive(pid));
            if alive {
                continue;
            }

            journal(job);
            job.transition(JobStatus::Aborted, now_ms)?;
            job.reason = Some("zombie_reaped".to_string());
            info!(job_id = %job.id, "reaped zombie job on boot");
            reaped.push(job.clone());
        }

        if !reaped.is_empty() {
            self.persist_locked(&inner)?;
        }
        Ok(reaped)
    }

    fn persist_locked(&self, inner: &IndexMap<String, Job>) -> Result<(), JobStoreError> {
        let doc = JobsDocument {
            schema_version: JOBS_SCHEMA_VERSION,
            jobs: inner.values().cloned().collect(),
            updated_at: Utc::now().to_rfc3339(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)?;
        crate::fsutil::write_atomic(&self.path, &bytes)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "job_store_tests.rs"]
mod tests;
