// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job manager: idempotent submission and the single-concurrency worker
//! loop.
//!
//! Exactly one job runs at any instant; everything else waits in QUEUED
//! with a stable position. Every status transition is journaled to the
//! event log before the state store is rewritten.

use crate::error::EngineError;
use crate::worker::{JobWorker, WorkerOutcome, WorkerStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sl_core::{
    Clock, CoreError, Job, JobConfig, JobId, JobKind, JobStatus, RunEvent, RunEventKind, RunId,
    SystemClock,
};
use sl_storage::{EventLog, JobStore};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Builds a worker for a queued job.
pub type WorkerFactory = Arc<dyn Fn(&Job) -> Box<dyn JobWorker> + Send + Sync>;

/// Manager tunables.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Directory for per-job stdout/stderr files.
    pub logs_dir: PathBuf,
    /// Grace between cancel signal and forced termination.
    pub cancel_grace: Duration,
    /// Terminal jobs younger than this still satisfy idempotent resubmits.
    pub recent_fingerprint_window_ms: u64,
    /// Bounded queue capacity; a full queue rejects with `Transient`.
    pub queue_capacity: usize,
}

impl ManagerConfig {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
            cancel_grace: Duration::from_secs(10),
            recent_fingerprint_window_ms: 10 * 60 * 1000,
            queue_capacity: 64,
        }
    }
}

/// Result of a submit call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub job_id: JobId,
    pub status: JobStatus,
    /// True when an existing job satisfied the request (same fingerprint).
    pub deduplicated: bool,
}

/// Result of a cancel call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelOutcome {
    pub job_id: JobId,
    pub status: JobStatus,
    /// True when a running worker was signalled (final state comes later).
    pub signalled: bool,
}

/// Bounded log tail for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsTail {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

/// Job detail: snapshot plus queue position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub job: Job,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u32>,
}

/// Stable request fingerprint over the normalized submission.
///
/// serde_json maps are sorted, so serializing the params value is a
/// canonical form.
pub fn fingerprint(kind: JobKind, params: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(params.to_string().as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

/// The job manager. Shared as `Arc`; the worker loop is spawned once.
pub struct JobManager<C: Clock = SystemClock> {
    store: Arc<JobStore>,
    events: Arc<EventLog>,
    clock: C,
    config: ManagerConfig,
    factory: WorkerFactory,
    queue_tx: mpsc::Sender<JobId>,
    queue_rx: Mutex<Option<mpsc::Receiver<JobId>>>,
    cancels: Mutex<HashMap<String, watch::Sender<bool>>>,
}

impl<C: Clock + 'static> JobManager<C> {
    pub fn new(
        store: Arc<JobStore>,
        events: Arc<EventLog>,
        clock: C,
        config: ManagerConfig,
        factory: WorkerFactory,
    ) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
        Arc::new(Self {
            store,
            events,
            clock,
            config,
            factory,
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            cancels: Mutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    /// Re-enqueue QUEUED jobs found in the store (daemon restart).
    pub async fn requeue_persisted(&self) -> Result<usize, EngineError> {
        let queued = self.store.queued();
        let count = queued.len();
        for job in queued {
            self.queue_tx
                .send(job.id.clone())
                .await
                .map_err(|_| EngineError::Worker("worker loop gone".into()))?;
        }
        if count > 0 {
            info!(count, "requeued persisted jobs after restart");
        }
        Ok(count)
    }

    /// Idempotent submit: an in-flight or recent job with the same
    /// fingerprint satisfies the request.
    pub async fn submit(
        &self,
        kind: JobKind,
        params: serde_json::Value,
    ) -> Result<SubmitOutcome, CoreError> {
        let fp = fingerprint(kind, &params);
        let now_ms = self.clock.epoch_ms();

        if let Some(existing) = self.store.find_by_fingerprint(&fp) {
            let recent = existing.finished_at_ms.is_none_or(|finished| {
                now_ms.saturating_sub(finished) < self.config.recent_fingerprint_window_ms
            });
            if !existing.is_terminal() || recent {
                return Ok(SubmitOutcome {
                    job_id: existing.id.clone(),
                    status: existing.status,
                    deduplicated: true,
                });
            }
        }

        let job_id = JobId::generate(kind);
        let queue_position = self.store.queued().len() as u32;

        let job = Job::new(JobConfig {
            id: job_id.clone(),
            kind,
            cmd: vec![
                "sl-worker".to_string(),
                "--kind".to_string(),
                kind.as_str().to_string(),
                "--params".to_string(),
                params.to_string(),
            ],
            request_fingerprint: fp,
            queued_at_ms: now_ms,
        });

        // Journal before the store sees the job.
        self.events.append(&RunEvent::new(
            RunId::for_job(&job_id),
            now_ms,
            RunEventKind::RunQueued {
                kind: kind.as_str().to_string(),
                queue_position,
            },
        ))?;
        self.store.upsert(job).map_err(CoreError::from)?;

        self.queue_tx.try_send(job_id.clone()).map_err(|_| {
            CoreError::transient("job queue is full, retry later")
        })?;

        info!(job_id = %job_id, kind = %kind, queue_position, "job submitted");
        Ok(SubmitOutcome {
            job_id,
            status: JobStatus::Queued,
            deduplicated: false,
        })
    }

    pub fn status(&self, id: &JobId) -> Result<Job, CoreError> {
        self.store
            .get(id)
            .ok_or_else(|| CoreError::not_found(format!("job {id} not found")))
    }

    pub fn detail(&self, id: &JobId) -> Result<JobDetail, CoreError> {
        let job = self.status(id)?;
        let queue_position = self.store.queue_position(id);
        Ok(JobDetail {
            job,
            queue_position,
        })
    }

    pub fn list(&self, limit: usize) -> Vec<Job> {
        let mut jobs = self.store.list();
        jobs.truncate(limit);
        jobs
    }

    /// Bounded tail of the job's stdout/stderr files.
    pub fn logs(&self, id: &JobId, tail: usize) -> Result<LogsTail, CoreError> {
        // Surface NotFound for unknown jobs before touching the fs.
        self.status(id)?;
        let tail = tail.clamp(1, 1_000);
        let stdout = crate::worker::tail_lines(&self.stdout_path(id), tail)
            .map_err(|e| CoreError::fatal(format!("log read: {e}")))?;
        let stderr = crate::worker::tail_lines(&self.stderr_path(id), tail)
            .map_err(|e| CoreError::fatal(format!("log read: {e}")))?;
        Ok(LogsTail { stdout, stderr })
    }

    /// Cancel a job. Terminal jobs return their final state unchanged;
    /// queued jobs cancel immediately; running jobs are signalled and
    /// reach CANCELLED through the worker loop.
    pub async fn cancel(&self, id: &JobId) -> Result<CancelOutcome, CoreError> {
        let job = self.status(id)?;

        if job.is_terminal() {
            return Ok(CancelOutcome {
                job_id: id.clone(),
                status: job.status,
                signalled: false,
            });
        }

        if job.status == JobStatus::Queued {
            let now_ms = self.clock.epoch_ms();
            self.events.append(&RunEvent::new(
                RunId::for_job(id),
                now_ms,
                RunEventKind::RunCancelled {},
            ))?;
            let updated = self
                .store
                .update(id, |job| job.transition(JobStatus::Cancelled, now_ms))
                .map_err(CoreError::from)?;
            info!(job_id = %id, "cancelled queued job");
            return Ok(CancelOutcome {
                job_id: id.clone(),
                status: updated.status,
                signalled: false,
            });
        }

        // Running: flip the per-job cancel signal; the worker loop owns
        // the terminal transition.
        let signalled = {
            let cancels = self.cancels.lock();
            match cancels.get(id.as_str()) {
                Some(tx) => tx.send(true).is_ok(),
                None => false,
            }
        };
        if signalled {
            info!(job_id = %id, "cancel signalled to running worker");
        } else {
            warn!(job_id = %id, "running job has no cancel channel");
        }
        Ok(CancelOutcome {
            job_id: id.clone(),
            status: JobStatus::Running,
            signalled,
        })
    }

    fn stdout_path(&self, id: &JobId) -> PathBuf {
        self.config.logs_dir.join(format!("{id}.out.log"))
    }

    fn stderr_path(&self, id: &JobId) -> PathBuf {
        self.config.logs_dir.join(format!("{id}.err.log"))
    }

    /// Spawn the single worker loop. Called exactly once.
    pub fn spawn_worker_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        let mut rx = manager
            .queue_rx
            .lock()
            .take()
            .unwrap_or_else(|| mpsc::channel(1).1);

        tokio::spawn(async move {
            while let Some(job_id) = rx.recv().await {
                if let Err(e) = manager.process_one(&job_id).await {
                    error!(job_id = %job_id, error = %e, "job processing failed");
                }
            }
        })
    }

    async fn process_one(&self, id: &JobId) -> Result<(), EngineError> {
        let Some(job) = self.store.get(id) else {
            return Ok(());
        };
        // Cancelled while queued, or a stale queue entry.
        if job.status != JobStatus::Queued {
            return Ok(());
        }

        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        self.cancels
            .lock()
            .insert(id.as_str().to_string(), cancel_tx);

        let mut worker = (self.factory)(&job);
        let run_id = RunId::for_job(id);

        let outcome = match worker.start().await {
            Err(e) => {
                warn!(job_id = %id, error = %e, "worker failed to start");
                WorkerOutcome {
                    status: WorkerStatus::Failed {
                        exit_code: None,
                        reason: e.to_string(),
                    },
                    stdout_tail: Vec::new(),
                    stderr_tail: Vec::new(),
                }
            }
            Ok(pid) => {
                let now_ms = self.clock.epoch_ms();
                self.events.append(&RunEvent::new(
                    run_id.clone(),
                    now_ms,
                    RunEventKind::RunStarted { pid },
                ))?;
                self.store.update(id, |job| {
                    job.transition(JobStatus::Running, now_ms)?;
                    job.pid = pid;
                    Ok(())
                })?;

                let waited = tokio::select! {
                    outcome = worker.wait() => Some(outcome?),
                    _ = cancel_rx.changed() => None,
                };
                match waited {
                    Some(outcome) => outcome,
                    None => worker.cancel(self.config.cancel_grace).await?,
                }
            }
        };

        self.cancels.lock().remove(id.as_str());
        self.finalize(id, outcome).await
    }

    async fn finalize(&self, id: &JobId, outcome: WorkerOutcome) -> Result<(), EngineError> {
        let now_ms = self.clock.epoch_ms();
        let run_id = RunId::for_job(id);

        let (status, event, reason) = match outcome.status {
            WorkerStatus::Succeeded => (
                JobStatus::Succeeded,
                RunEventKind::RunSucceeded {},
                None,
            ),
            WorkerStatus::Failed { reason, .. } => {
                let (stage, message) = split_stage(&reason);
                (
                    JobStatus::Failed,
                    RunEventKind::RunFailed {
                        stage,
                        reason: message,
                    },
                    Some(reason),
                )
            }
            WorkerStatus::Cancelled => {
                (JobStatus::Cancelled, RunEventKind::RunCancelled {}, None)
            }
        };

        self.events
            .append(&RunEvent::new(run_id, now_ms, event))?;
        self.store.update(id, |job| {
            job.transition(status, now_ms)?;
            job.reason = reason.clone();
            Ok(())
        })?;
        info!(job_id = %id, status = %status, "job finished");
        Ok(())
    }
}

/// Split a `"STAGE: reason"` failure message produced by the orchestrator
/// into its stage and message parts.
fn split_stage(reason: &str) -> (Option<String>, String) {
    const STAGES: [&str; 8] = [
        "PENDING",
        "WARMUP",
        "PHASE_A",
        "PHASE_B",
        "AGGREGATE",
        "WINNERS",
        "REPORT",
        "DONE",
    ];
    if let Some((head, rest)) = reason.split_once(": ") {
        if STAGES.contains(&head) {
            return (Some(head.to_string()), rest.to_string());
        }
    }
    (None, reason.to_string())
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
