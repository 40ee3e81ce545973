// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker abstraction for running one job.
//!
//! The job manager only knows the `JobWorker` interface; a subprocess
//! implementation shells out to a resolved argv while the in-process task
//! implementation drives orchestrated runs and substitutes in tests.

use crate::error::EngineError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// Default grace period between a termination signal and a forced kill.
pub const CANCEL_GRACE: Duration = Duration::from_secs(10);

/// How much of each log file a wait result carries back.
const TAIL_LINES: usize = 50;

/// Terminal result of one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    Succeeded,
    Failed { exit_code: Option<i32>, reason: String },
    Cancelled,
}

/// Outcome returned by `wait` / `cancel`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOutcome {
    pub status: WorkerStatus,
    pub stdout_tail: Vec<String>,
    pub stderr_tail: Vec<String>,
}

impl WorkerOutcome {
    fn bare(status: WorkerStatus) -> Self {
        Self {
            status,
            stdout_tail: Vec::new(),
            stderr_tail: Vec::new(),
        }
    }
}

/// One job's executor.
#[async_trait]
pub trait JobWorker: Send {
    /// Launch the work. Returns the OS pid for subprocess workers.
    async fn start(&mut self) -> Result<Option<u32>, EngineError>;

    /// Wait for completion.
    async fn wait(&mut self) -> Result<WorkerOutcome, EngineError>;

    /// Request termination, escalating to a forced kill after `grace`.
    async fn cancel(&mut self, grace: Duration) -> Result<WorkerOutcome, EngineError>;
}

/// Worker that spawns a child process, piping stdout/stderr to per-job
/// log files.
pub struct SubprocessWorker {
    cmd: Vec<String>,
    stdout_path: PathBuf,
    stderr_path: PathBuf,
    child: Option<Child>,
}

impl SubprocessWorker {
    pub fn new(cmd: Vec<String>, stdout_path: PathBuf, stderr_path: PathBuf) -> Self {
        Self {
            cmd,
            stdout_path,
            stderr_path,
            child: None,
        }
    }

    fn tails(&self) -> (Vec<String>, Vec<String>) {
        (
            tail_lines(&self.stdout_path, TAIL_LINES).unwrap_or_default(),
            tail_lines(&self.stderr_path, TAIL_LINES).unwrap_or_default(),
        )
    }

    fn outcome(&self, status: WorkerStatus) -> WorkerOutcome {
        let (stdout_tail, stderr_tail) = self.tails();
        WorkerOutcome {
            status,
            stdout_tail,
            stderr_tail,
        }
    }
}

#[async_trait]
impl JobWorker for SubprocessWorker {
    async fn start(&mut self) -> Result<Option<u32>, EngineError> {
        let program = self
            .cmd
            .first()
            .ok_or_else(|| EngineError::Worker("empty argv".into()))?;

        if let Some(parent) = self.stdout_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stdout = std::fs::File::create(&self.stdout_path)?;
        let stderr = std::fs::File::create(&self.stderr_path)?;

        let child = Command::new(program)
            .args(&self.cmd[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| EngineError::Worker(format!("spawn {program}: {e}")))?;

        let pid = child.id();
        info!(cmd = %self.cmd.join(" "), pid, "spawned job worker");
        self.child = Some(child);
        Ok(pid)
    }

    async fn wait(&mut self) -> Result<WorkerOutcome, EngineError> {
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| EngineError::Worker("wait before start".into()))?;
        let status = child
            .wait()
            .await
            .map_err(|e| EngineError::Worker(format!("wait: {e}")))?;

        let worker_status = if status.success() {
            WorkerStatus::Succeeded
        } else {
            WorkerStatus::Failed {
                exit_code: status.code(),
                reason: format!("exit status {status}"),
            }
        };
        Ok(self.outcome(worker_status))
    }

    async fn cancel(&mut self, grace: Duration) -> Result<WorkerOutcome, EngineError> {
        let Some(child) = self.child.as_mut() else {
            return Ok(WorkerOutcome::bare(WorkerStatus::Cancelled));
        };

        if let Some(pid) = child.id() {
            signal(pid, "-15").await;
        }

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(EngineError::Worker(format!("wait after signal: {e}"))),
            Err(_elapsed) => {
                warn!("worker ignored SIGTERM, escalating to kill");
                if let Some(pid) = child.id() {
                    signal(pid, "-9").await;
                }
                let _ = child.wait().await;
            }
        }

        Ok(self.outcome(WorkerStatus::Cancelled))
    }
}

async fn signal(pid: u32, sig: &str) {
    let _ = Command::new("kill")
        .args([sig, &pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
}

/// In-process worker wrapping an async task.
///
/// The task receives a cancel flag it must observe at its own boundaries;
/// on cancel the worker flips the flag and waits out the grace period
/// before abandoning the task.
pub struct TaskWorker {
    cancel_flag: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<Result<(), EngineError>>>,
    spawn: Option<Box<dyn FnOnce(Arc<AtomicBool>) -> tokio::task::JoinHandle<Result<(), EngineError>> + Send>>,
}

impl TaskWorker {
    pub fn new<F>(spawn: F) -> Self
    where
        F: FnOnce(Arc<AtomicBool>) -> tokio::task::JoinHandle<Result<(), EngineError>>
            + Send
            + 'static,
    {
        Self {
            cancel_flag: Arc::new(AtomicBool::new(false)),
            handle: None,
            spawn: Some(Box::new(spawn)),
        }
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel_flag)
    }
}

#[async_trait]
impl JobWorker for TaskWorker {
    async fn start(&mut self) -> Result<Option<u32>, EngineError> {
        let spawn = self
            .spawn
            .take()
            .ok_or_else(|| EngineError::Worker("task already started".into()))?;
        self.handle = Some(spawn(Arc::clone(&self.cancel_flag)));
        Ok(None)
    }

    async fn wait(&mut self) -> Result<WorkerOutcome, EngineError> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| EngineError::Worker("wait before start".into()))?;
        match handle.await {
            Ok(Ok(())) => {
                if self.cancel_flag.load(Ordering::SeqCst) {
                    Ok(WorkerOutcome::bare(WorkerStatus::Cancelled))
                } else {
                    Ok(WorkerOutcome::bare(WorkerStatus::Succeeded))
                }
            }
            Ok(Err(e)) => Ok(WorkerOutcome::bare(WorkerStatus::Failed {
                exit_code: None,
                reason: e.to_string(),
            })),
            Err(join_err) => Ok(WorkerOutcome::bare(WorkerStatus::Failed {
                exit_code: None,
                reason: format!("task panicked: {join_err}"),
            })),
        }
    }

    async fn cancel(&mut self, grace: Duration) -> Result<WorkerOutcome, EngineError> {
        self.cancel_flag.store(true, Ordering::SeqCst);

        let Some(handle) = self.handle.take() else {
            return Ok(WorkerOutcome::bare(WorkerStatus::Cancelled));
        };

        match tokio::time::timeout(grace, handle).await {
            Ok(_) => Ok(WorkerOutcome::bare(WorkerStatus::Cancelled)),
            Err(_elapsed) => {
                warn!("task ignored cancel flag within grace, abandoning");
                Ok(WorkerOutcome::bare(WorkerStatus::Cancelled))
            }
        }
    }
}

/// Bounded tail read: last `n` lines without streaming the whole file.
pub fn tail_lines(path: &Path, n: usize) -> std::io::Result<Vec<String>> {
    const MAX_TAIL_BYTES: u64 = 256 * 1024;

    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    use std::io::{Read, Seek, SeekFrom};
    let mut file = std::fs::File::open(path)?;
    let start = meta.len().saturating_sub(MAX_TAIL_BYTES);
    file.seek(SeekFrom::Start(start))?;
    let mut buf = String::new();
    file.read_to_string(&mut buf)?;

    let mut lines: Vec<String> = buf.lines().map(str::to_string).collect();
    // Drop a partial first line when the read started mid-file.
    if start > 0 && !lines.is_empty() {
        lines.remove(0);
    }
    let skip = lines.len().saturating_sub(n);
    Ok(lines.split_off(skip))
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
