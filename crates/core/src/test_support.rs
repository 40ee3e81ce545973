// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::job::{Job, JobConfig, JobId, JobKind, JobStatus};

/// Build a queued job with deterministic defaults.
pub fn queued_job(id: &str) -> Job {
    Job::new(JobConfig {
        id: JobId::new(id),
        kind: JobKind::FiqaFast,
        cmd: vec!["sl-worker".into(), "--kind".into(), "fiqa-fast".into()],
        request_fingerprint: format!("fp-{id}"),
        queued_at_ms: 1_000_000,
    })
}

/// Build a job already in the given status.
///
/// Fields are set directly rather than via `transition` so helpers stay
/// usable even for states the machine would normally forbid reaching.
pub fn job_in_status(id: &str, status: JobStatus) -> Job {
    let mut job = queued_job(id);
    job.status = status;
    if status != JobStatus::Queued {
        job.started_at_ms = Some(1_000_100);
    }
    if status.is_terminal() {
        job.finished_at_ms = Some(1_000_200);
    }
    job
}

/// Build a RUNNING job claiming the given pid (for zombie-reap tests).
pub fn running_job_with_pid(id: &str, pid: u32) -> Job {
    let mut job = job_in_status(id, JobStatus::Running);
    job.pid = Some(pid);
    job
}
