// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error type, converging on the core taxonomy at the boundary.

use sl_core::CoreError;
use sl_storage::{EventLogError, JobStoreError, PolicyStoreError};
use thiserror::Error;

/// Errors raised while executing jobs and runs.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("job store error: {0}")]
    Store(#[from] JobStoreError),

    #[error("event log error: {0}")]
    EventLog(#[from] EventLogError),

    #[error("policy store error: {0}")]
    Policy(#[from] PolicyStoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker error: {0}")]
    Worker(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<EngineError> for CoreError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Core(e) => e,
            EngineError::Store(e) => e.into(),
            EngineError::EventLog(e) => e.into(),
            EngineError::Policy(e) => e.into(),
            EngineError::Io(e) => CoreError::fatal(format!("IO error: {e}")),
            EngineError::Worker(msg) => CoreError::fatal(format!("worker error: {msg}")),
            EngineError::Backend(msg) => CoreError::transient(msg),
        }
    }
}
