// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stable error taxonomy shared by every surface of the platform.
//!
//! I/O layers translate OS and backend failures into one of the five kinds
//! at the earliest boundary; pure decision functions return typed results
//! and never construct `Fatal` themselves.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of every user-visible or operator-visible failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Validation failure: malformed id, unknown kind, extra fields.
    InvalidInput,
    /// Job, run, or artifact unknown.
    NotFound,
    /// Idempotency or state conflict (e.g. cancel on a terminal job).
    Conflict,
    /// Downstream 429/5xx or timeout; retried locally before surfacing.
    Transient,
    /// Persisted-state corruption or invariant violation; the system
    /// refuses new work until repaired.
    Fatal,
}

impl ErrorKind {
    /// HTTP status code this kind maps to by default.
    ///
    /// `InvalidInput` maps to 400; body-schema violations are reported as
    /// 422 by the API layer directly.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::InvalidInput => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Transient => 502,
            ErrorKind::Fatal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Transient => "Transient",
            ErrorKind::Fatal => "Fatal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A taxonomy-classified error with a stable message and optional detail.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
