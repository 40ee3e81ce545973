// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence for the bandit arm state document.
//!
//! Writes take the store lock and rewrite the whole document atomically;
//! readers get consistent snapshots.

use parking_lot::Mutex;
use sl_control::bandit::BanditState;
use sl_core::CoreError;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Lock-on-write store for `bandit_state.json`.
pub struct BanditStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl BanditStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consistent snapshot of the persisted state; a corrupt document is
    /// rotated to `.bak` and replaced with defaults.
    pub fn snapshot(&self) -> Result<BanditState, CoreError> {
        let _guard = self.lock.lock();
        self.load_unlocked()
    }

    /// Apply a mutation under the write lock and persist atomically.
    pub fn update<F>(&self, f: F) -> Result<BanditState, CoreError>
    where
        F: FnOnce(&mut BanditState),
    {
        let _guard = self.lock.lock();
        let mut state = self.load_unlocked()?;
        f(&mut state);
        let bytes = serde_json::to_vec_pretty(&state)
            .map_err(|e| CoreError::fatal(format!("bandit state serialize: {e}")))?;
        crate::fsutil::write_atomic(&self.path, &bytes)
            .map_err(|e| CoreError::fatal(format!("bandit state write: {e}")))?;
        Ok(state)
    }

    fn load_unlocked(&self) -> Result<BanditState, CoreError> {
        let raw = match std::fs::read(&self.path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BanditState::default())
            }
            Err(e) => return Err(CoreError::fatal(format!("bandit state read: {e}"))),
            Ok(raw) => raw,
        };
        match serde_json::from_slice(&raw) {
            Ok(state) => Ok(state),
            Err(e) => {
                let bak = crate::fsutil::rotate_bak_path(&self.path);
                warn!(
                    error = %e,
                    path = %self.path.display(),
                    bak = %bak.display(),
                    "Corrupt bandit state, moving to .bak and starting fresh",
                );
                std::fs::rename(&self.path, &bak)
                    .map_err(|e| CoreError::fatal(format!("bandit state rotate: {e}")))?;
                Ok(BanditState::default())
            }
        }
    }
}

#[cfg(test)]
#[path = "bandit_store_tests.rs"]
mod tests;
