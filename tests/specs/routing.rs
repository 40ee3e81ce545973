// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Router seed scenario: filters force rich without fallback; healthy
//! dense traffic stays dense in ≥ 90% of seeded trials.

use sl_control::{Backend, BackendLoad, QueryContext, RulesConfig, RulesRouter};

fn healthy() -> BackendLoad {
    BackendLoad {
        cpu_pct: 0.2,
        qps: 40.0,
        p95_ms: 15.0,
        healthy: true,
    }
}

#[test]
fn filter_queries_always_land_on_rich() {
    let mut router = RulesRouter::with_seed(RulesConfig::default(), 1);
    let query = QueryContext {
        topk: 10,
        has_filter: true,
        has_fulltext: false,
        complexity: 0.0,
    };
    for _ in 0..100 {
        let decision = router.route(&query, &healthy(), &healthy());
        assert_eq!(decision.backend, Backend::Rich);
        assert!(!decision.fallback_available);
    }
}

#[test]
fn eligible_queries_stay_dense_in_ninety_pct_of_trials() {
    let query = QueryContext {
        topk: 10,
        has_filter: false,
        has_fulltext: false,
        complexity: 0.0,
    };

    for seed in [3u64, 17, 404] {
        let mut router = RulesRouter::with_seed(RulesConfig::default(), seed);
        let mut dense = 0u32;
        for _ in 0..1_000 {
            let decision = router.route(&query, &healthy(), &healthy());
            if decision.backend == Backend::Dense {
                dense += 1;
                assert!(decision.fallback_available);
            }
        }
        assert!(dense >= 900, "seed {seed}: dense routed only {dense}/1000");
    }
}
