// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sl_control::bandit::{apply_reward, ArmMetrics, UpdateConfig};
use tempfile::tempdir;

fn metrics() -> ArmMetrics {
    ArmMetrics {
        p95_ms: 120.0,
        recall_at_10: 0.9,
        error_rate: 0.0,
        cost: 0.0,
        samples: 20,
        updated_at: "2026-02-01T00:00:00Z".into(),
    }
}

#[test]
fn missing_file_yields_default_state() {
    let dir = tempdir().unwrap();
    let store = BanditStore::new(dir.path().join("bandit_state.json"));
    let state = store.snapshot().unwrap();
    assert!(state.arms.is_empty());
}

#[test]
fn update_persists_across_instances() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bandit_state.json");
    {
        let store = BanditStore::new(&path);
        store
            .update(|state| {
                let arm = state.arms.entry("fast".into()).or_default();
                apply_reward(arm, 0.4, Some(true), metrics(), &UpdateConfig::default());
            })
            .unwrap();
    }
    let store = BanditStore::new(&path);
    let state = store.snapshot().unwrap();
    assert_eq!(state.arm("fast").counts, 20);
    assert_eq!(state.arm("fast").streak, 1);
}

#[test]
fn corrupt_state_rotates_and_resets() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bandit_state.json");
    std::fs::write(&path, "not json").unwrap();

    let store = BanditStore::new(&path);
    let state = store.snapshot().unwrap();
    assert!(state.arms.is_empty());
    assert!(path.with_extension("bak").exists());
}

#[test]
fn snapshot_is_isolated_from_later_updates() {
    let dir = tempdir().unwrap();
    let store = BanditStore::new(dir.path().join("bandit_state.json"));
    let before = store.snapshot().unwrap();
    store
        .update(|state| {
            state.arms.entry("fast".into()).or_default();
        })
        .unwrap();
    assert!(before.arms.is_empty());
    assert_eq!(store.snapshot().unwrap().arms.len(), 1);
}
