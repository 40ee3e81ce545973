// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted SLA policy and the bandit arm catalog, both TOML documents.

use serde::{Deserialize, Serialize};
use sl_control::sla::SlaPolicy;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Schema version for `policies.toml`.
pub const CATALOG_VERSION: u32 = 1;

/// Errors from policy file operations
#[derive(Debug, Error)]
pub enum PolicyStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl From<PolicyStoreError> for sl_core::CoreError {
    fn from(err: PolicyStoreError) -> Self {
        sl_core::CoreError::fatal(format!("policy store failure: {err}"))
    }
}

/// Store for the auto-tuned SLA thresholds (`sla_policy.toml`).
pub struct SlaPolicyStore {
    path: PathBuf,
}

impl SlaPolicyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the policy, falling back to defaults for missing or corrupt
    /// files (corrupt files rotate to `.bak`).
    pub fn load(&self) -> Result<SlaPolicy, PolicyStoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SlaPolicy::default())
            }
            Err(e) => return Err(e.into()),
            Ok(raw) => raw,
        };
        match toml::from_str(&raw) {
            Ok(policy) => Ok(policy),
            Err(e) => {
                let bak = crate::fsutil::rotate_bak_path(&self.path);
                warn!(
                    error = %e,
                    path = %self.path.display(),
                    bak = %bak.display(),
                    "Corrupt SLA policy, moving to .bak and using defaults",
                );
                std::fs::rename(&self.path, &bak)?;
                Ok(SlaPolicy::default())
            }
        }
    }

    /// Atomically rewrite the policy file.
    pub fn save(&self, policy: &SlaPolicy) -> Result<(), PolicyStoreError> {
        let body = toml::to_string_pretty(policy)?;
        crate::fsutil::write_atomic(&self.path, body.as_bytes())?;
        Ok(())
    }
}

/// Parameters one bandit arm applies to the search stack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArmParams {
    pub top_k: u32,
    pub ef_search: u32,
    pub rerank: bool,
}

/// Fixed arm catalog (`policies.toml`); selection only ever picks from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyCatalog {
    #[serde(default = "default_catalog_version")]
    pub schema_version: u32,
    pub arms: BTreeMap<String, ArmParams>,
}

fn default_catalog_version() -> u32 {
    CATALOG_VERSION
}

impl Default for PolicyCatalog {
    fn default() -> Self {
        let mut arms = BTreeMap::new();
        arms.insert(
            "fast".to_string(),
            ArmParams {
                top_k: 40,
                ef_search: 64,
                rerank: false,
            },
        );
        arms.insert(
            "balanced".to_string(),
            ArmParams {
                top_k: 80,
                ef_search: 128,
                rerank: false,
            },
        );
        arms.insert(
            "quality".to_string(),
            ArmParams {
                top_k: 100,
                ef_search: 256,
                rerank: true,
            },
        );
        Self {
            schema_version: CATALOG_VERSION,
            arms,
        }
    }
}

impl PolicyCatalog {
    /// Load the catalog, or defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self, PolicyStoreError> {
        match std::fs::read_to_string(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
            Ok(raw) => Ok(toml::from_str(&raw)?),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), PolicyStoreError> {
        let body = toml::to_string_pretty(self)?;
        crate::fsutil::write_atomic(path, body.as_bytes())?;
        Ok(())
    }

    pub fn arm_names(&self) -> Vec<String> {
        self.arms.keys().cloned().collect()
    }
}

#[cfg(test)]
#[path = "policy_store_tests.rs"]
mod tests;
