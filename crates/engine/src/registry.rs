// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dataset registry mapping dataset names to collections and qrels.

use serde::{Deserialize, Serialize};
use sl_core::CoreError;
use std::collections::BTreeMap;
use std::path::Path;

/// Resolved dataset coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub collection: String,
    pub qrels: String,
}

/// Name → dataset mapping, loaded from `datasets.toml` when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRegistry {
    pub datasets: BTreeMap<String, DatasetEntry>,
}

impl Default for DatasetRegistry {
    fn default() -> Self {
        let mut datasets = BTreeMap::new();
        datasets.insert(
            "fiqa".to_string(),
            DatasetEntry {
                collection: "fiqa_50k".to_string(),
                qrels: "data/fiqa/qrels.tsv".to_string(),
            },
        );
        datasets.insert(
            "fiqa-10k".to_string(),
            DatasetEntry {
                collection: "fiqa_10k".to_string(),
                qrels: "data/fiqa/qrels_10k.tsv".to_string(),
            },
        );
        datasets.insert(
            "demo".to_string(),
            DatasetEntry {
                collection: "demo_5k".to_string(),
                qrels: "data/demo/qrels.tsv".to_string(),
            },
        );
        Self { datasets }
    }
}

impl DatasetRegistry {
    /// Load the registry, or defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        match std::fs::read_to_string(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(CoreError::fatal(format!("dataset registry read: {e}"))),
            Ok(raw) => toml::from_str(&raw)
                .map_err(|e| CoreError::fatal(format!("dataset registry parse: {e}"))),
        }
    }

    /// Resolve a dataset name; unknown names are a validation failure.
    pub fn resolve(&self, name: &str) -> Result<&DatasetEntry, CoreError> {
        self.datasets.get(name).ok_or_else(|| {
            CoreError::invalid_input(format!("unknown dataset {name:?}")).with_detail(format!(
                "known datasets: {}",
                self.datasets
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
