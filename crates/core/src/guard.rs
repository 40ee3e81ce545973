// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier and path validation applied at every external boundary.
//!
//! Both guards fail with `InvalidInput` and never panic; handlers that skip
//! them are a bug, not a policy choice.

use crate::error::CoreError;
use std::path::{Component, Path, PathBuf};

/// Maximum accepted job id length.
pub const MAX_JOB_ID_LEN: usize = 200;

/// Validate a job or run identifier: `[A-Za-z0-9_-]`, length 1..=200.
pub fn validate_job_id(s: &str) -> Result<(), CoreError> {
    if s.is_empty() {
        return Err(CoreError::invalid_input("job id must not be empty"));
    }
    if s.len() > MAX_JOB_ID_LEN {
        return Err(CoreError::invalid_input(format!(
            "job id exceeds {MAX_JOB_ID_LEN} characters"
        )));
    }
    if let Some(bad) = s
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(
            CoreError::invalid_input("job id contains invalid character")
                .with_detail(format!("character {bad:?} is not in [A-Za-z0-9_-]")),
        );
    }
    Ok(())
}

/// Resolve a user-supplied relative path against `root`, rejecting escapes.
///
/// Rejects absolute paths and any `..` segment before resolution, then
/// verifies the lexically-normalized result is still a descendant of `root`.
pub fn validate_path(root: &Path, p: &Path) -> Result<PathBuf, CoreError> {
    if p.is_absolute() {
        return Err(CoreError::invalid_input("path must be relative"));
    }
    for component in p.components() {
        match component {
            Component::ParentDir => {
                return Err(CoreError::invalid_input("path must not contain '..'"));
            }
            Component::Normal(_) | Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                return Err(CoreError::invalid_input("path must be relative"));
            }
        }
    }

    let resolved = normalize(&root.join(p));
    if !resolved.starts_with(normalize(root)) {
        return Err(CoreError::invalid_input("path escapes its root"));
    }
    Ok(resolved)
}

/// Lexical normalization: drop `.` components and fold `..` without
/// touching the filesystem (the target may not exist yet).
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;
