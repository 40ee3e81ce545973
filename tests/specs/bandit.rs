// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bandit seed scenario: from empty state the first 45 selections rotate
//! three arms exactly 15 times each, through the persisted store.

use rand::rngs::StdRng;
use rand::SeedableRng;
use sl_control::bandit::{
    apply_reward, select_arm, ArmMetrics, SelectConfig, SelectionKind, UpdateConfig,
};
use sl_storage::BanditStore;
use std::collections::BTreeMap;

fn metrics() -> ArmMetrics {
    ArmMetrics {
        p95_ms: 100.0,
        recall_at_10: 0.9,
        error_rate: 0.0,
        cost: 0.0,
        samples: 1,
        updated_at: "2026-02-01T00:00:00Z".into(),
    }
}

#[test]
fn forty_five_selections_rotate_fifteen_per_arm() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = BanditStore::new(dir.path().join("bandit_state.json"));
    let arms = vec![
        "fast".to_string(),
        "balanced".to_string(),
        "quality".to_string(),
    ];
    let config = SelectConfig::default();
    let mut rng = StdRng::seed_from_u64(5);

    let mut tallies: BTreeMap<String, u32> = BTreeMap::new();
    for round in 0..45 {
        let state = store.snapshot().expect("snapshot");
        let selection = select_arm(&arms, &state, &config, &mut rng).expect("select");
        assert_eq!(
            selection.kind,
            SelectionKind::MinSampleRoundRobin,
            "round {round} left rotation early"
        );
        *tallies.entry(selection.picked.clone()).or_default() += 1;

        store
            .update(|state| {
                let arm = state.arms.entry(selection.picked.clone()).or_default();
                apply_reward(arm, 0.5, None, metrics(), &UpdateConfig::default());
            })
            .expect("update");
    }

    assert_eq!(tallies["fast"], 15);
    assert_eq!(tallies["balanced"], 15);
    assert_eq!(tallies["quality"], 15);

    // Round 46 leaves the rotation regime.
    let state = store.snapshot().expect("snapshot");
    let selection = select_arm(&arms, &state, &config, &mut rng).expect("select");
    assert!(!matches!(selection.kind, SelectionKind::MinSampleRoundRobin));
}

#[test]
fn persisted_state_survives_reload_with_consistent_averages() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bandit_state.json");

    {
        let store = BanditStore::new(&path);
        store
            .update(|state| {
                let arm = state.arms.entry("fast".into()).or_default();
                let full = ArmMetrics {
                    samples: 20,
                    ..metrics()
                };
                apply_reward(arm, 0.8, Some(true), full, &UpdateConfig::default());
            })
            .expect("update");
    }

    let store = BanditStore::new(&path);
    let state = store.snapshot().expect("snapshot");
    let arm = state.arm("fast");
    assert_eq!(arm.counts, 20);
    assert_eq!(arm.avg_reward, Some(0.8));
    assert_eq!(arm.streak, 1);
    assert!(arm.last_metrics.is_some());
}
