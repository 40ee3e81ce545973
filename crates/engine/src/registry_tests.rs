// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;

#[test]
fn defaults_resolve_fiqa() {
    let registry = DatasetRegistry::default();
    let entry = registry.resolve("fiqa").unwrap();
    assert_eq!(entry.collection, "fiqa_50k");
}

#[test]
fn unknown_dataset_is_invalid_input() {
    let registry = DatasetRegistry::default();
    let err = registry.resolve("nope").unwrap_err();
    assert_eq!(err.kind, sl_core::ErrorKind::InvalidInput);
    assert!(err.detail.unwrap().contains("fiqa"));
}

#[test]
fn loads_from_toml_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("datasets.toml");
    std::fs::write(
        &path,
        r#"
[datasets.custom]
collection = "custom_1k"
qrels = "data/custom/qrels.tsv"
"#,
    )
    .unwrap();

    let registry = DatasetRegistry::load(&path).unwrap();
    assert_eq!(registry.resolve("custom").unwrap().collection, "custom_1k");
    assert!(registry.resolve("fiqa").is_err());
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempdir().unwrap();
    let registry = DatasetRegistry::load(&dir.path().join("none.toml")).unwrap();
    assert!(registry.resolve("fiqa").is_ok());
}
