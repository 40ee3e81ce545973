// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only per-run JSONL audit logs.
//!
//! One file per `run_id` under the events directory; each write is a single
//! JSON line appended with `O_APPEND` semantics. Files rotate at a size cap
//! into zstd-compressed, UTC-stamped backups, and each run carries an event
//! budget: once exceeded, further events are dropped after a single
//! `TRUNCATED` marker.

use chrono::Utc;
use parking_lot::Mutex;
use sl_core::{RunEvent, RunEventKind, RunId};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Rotation threshold per log file.
pub const EVENT_LOG_ROTATE_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum events accepted per run before truncation.
pub const EVENT_BUDGET_PER_RUN: u32 = 2000;

/// Errors from event log operations
#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<EventLogError> for sl_core::CoreError {
    fn from(err: EventLogError) -> Self {
        // A journal that cannot be written is grounds to refuse new work.
        sl_core::CoreError::fatal(format!("event log failure: {err}"))
    }
}

/// Per-run bookkeeping kept in memory; rebuilt lazily after restart.
#[derive(Debug, Default, Clone)]
struct RunLogState {
    count: u32,
    truncated: bool,
    last_ts_ms: u64,
}

/// Writer/reader for all per-run event logs under one directory.
pub struct EventLog {
    dir: PathBuf,
    rotate_bytes: u64,
    budget: u32,
    runs: Mutex<HashMap<String, RunLogState>>,
}

impl EventLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            rotate_bytes: EVENT_LOG_ROTATE_BYTES,
            budget: EVENT_BUDGET_PER_RUN,
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Override rotation threshold and budget (used by tests).
    pub fn with_limits(mut self, rotate_bytes: u64, budget: u32) -> Self {
        self.rotate_bytes = rotate_bytes;
        self.budget = budget;
        self
    }

    /// Path of the active log file for a run.
    pub fn path_for(&self, run_id: &RunId) -> PathBuf {
        self.dir.join(format!("{run_id}.jsonl"))
    }

    /// Append one event.
    ///
    /// Timestamps are clamped to be monotonic-nondecreasing per run. Events
    /// past the run's budget are dropped after a single `TRUNCATED` marker.
    pub fn append(&self, event: &RunEvent) -> Result<(), EventLogError> {
        let path = self.path_for(&event.run_id);

        let mut runs = self.runs.lock();
        let state = match runs.entry(event.run_id.as_str().to_string()) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(Self::recover_state(&path)?)
            }
        };

        if state.truncated {
            return Ok(());
        }
        if state.count >= self.budget {
            state.truncated = true;
            let marker = RunEvent::new(
                event.run_id.clone(),
                event.ts_ms.max(state.last_ts_ms),
                RunEventKind::Truncated {
                    dropped_after: self.budget,
                },
            );
            warn!(run_id = %event.run_id, budget = self.budget, "event budget exceeded, truncating run log");
            self.write_line(&path, &marker, state)?;
            return Ok(());
        }

        let mut event = event.clone();
        event.ts_ms = event.ts_ms.max(state.last_ts_ms);
        self.write_line(&path, &event, state)?;
        state.count += 1;
        Ok(())
    }

    fn write_line(
        &self,
        path: &Path,
        event: &RunEvent,
        state: &mut RunLogState,
    ) -> Result<(), EventLogError> {
        fs::create_dir_all(&self.dir)?;
        self.maybe_rotate(path, event.run_id.as_str())?;

        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(&line)?;
        file.flush()?;

        state.last_ts_ms = event.ts_ms;
        Ok(())
    }

    /// Rotate the active file into a compressed, timestamped backup when it
    /// exceeds the size cap. Readers following by offset observe a fresh
    /// file afterwards.
    fn maybe_rotate(&self, path: &Path, run_id: &str) -> Result<(), EventLogError> {
        let size = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(()),
        };
        if size < self.rotate_bytes {
            return Ok(());
        }

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
        let backup = self.dir.join(format!("{run_id}.{stamp}.jsonl.zst"));

        let raw = fs::read(path)?;
        let compressed = zstd::encode_all(raw.as_slice(), 3)
            .map_err(|e| EventLogError::Io(io::Error::other(e.to_string())))?;
        crate::fsutil::write_atomic(&backup, &compressed)?;
        fs::remove_file(path)?;

        warn!(run_id, backup = %backup.display(), "rotated event log at size cap");
        Ok(())
    }

    /// Rebuild budget/timestamp bookkeeping from an existing file.
    fn recover_state(path: &Path) -> Result<RunLogState, EventLogError> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RunLogState::default()),
            Err(e) => return Err(e.into()),
        };

        let mut state = RunLogState::default();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RunEvent>(&line) {
                Ok(event) => {
                    state.last_ts_ms = state.last_ts_ms.max(event.ts_ms);
                    if matches!(event.kind, RunEventKind::Truncated { .. }) {
                        state.truncated = true;
                    } else {
                        state.count += 1;
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping corrupt event line");
                }
            }
        }
        Ok(state)
    }

    /// Read all events of a run from the active file.
    pub fn read_all(&self, run_id: &RunId) -> Result<Vec<RunEvent>, EventLogError> {
        Ok(self.read_from(run_id, 0)?.0)
    }

    /// Read events starting at a byte offset; returns the events and the
    /// offset to resume from. Corrupt lines are skipped.
    pub fn read_from(
        &self,
        run_id: &RunId,
        offset: u64,
    ) -> Result<(Vec<RunEvent>, u64), EventLogError> {
        let path = self.path_for(run_id);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(offset))?;

        let mut events = Vec::new();
        let mut current_offset = offset;
        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line)?;
            if bytes_read == 0 {
                break;
            }
            current_offset += bytes_read as u64;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<RunEvent>(trimmed) {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "skipping corrupt event line");
                }
            }
        }
        Ok((events, current_offset))
    }
}

#[cfg(test)]
#[path = "event_log_tests.rs"]
mod tests;
