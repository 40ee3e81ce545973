// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::metrics::MetricsHub;
use sl_control::{CostRouterConfig, RoutePolicy, Router, RulesConfig};
use sl_core::Phase;
use std::sync::atomic::AtomicBool;

#[test]
fn plan_is_deterministic_for_seed_and_mix() {
    let mix = TopkMix::default();
    let a = build_plan(42, &mix, 500);
    let b = build_plan(42, &mix, 500);
    assert_eq!(a, b);

    let c = build_plan(43, &mix, 500);
    assert_ne!(a, c);
}

#[test]
fn plan_respects_topk_mix() {
    let mix = TopkMix {
        entries: vec![(10, 1.0)],
    };
    let plan = build_plan(7, &mix, 100);
    assert!(plan.queries.iter().all(|q| q.topk == 10));

    let mix = TopkMix::default();
    let plan = build_plan(7, &mix, 2_000);
    let topks: std::collections::HashSet<u32> =
        plan.queries.iter().map(|q| q.topk).collect();
    assert!(topks.contains(&10));
    assert!(topks.contains(&50));
}

#[test]
fn plan_sequences_are_contiguous() {
    let plan = build_plan(1, &TopkMix::default(), 50);
    for (i, q) in plan.queries.iter().enumerate() {
        assert_eq!(q.seq, i as u64);
    }
}

fn spec(phase: Phase, window_ms: u64, qps: f64) -> PhaseSpec {
    PhaseSpec {
        phase,
        window: Duration::from_millis(window_ms),
        qps,
        concurrency: 4,
        recall_sample: 0.5,
    }
}

#[tokio::test]
async fn phase_records_samples_into_hub() {
    let hub = Arc::new(MetricsHub::new());
    let backend = Arc::new(SimBackend::new(SimProfile::fast(), 1).instant());
    let generator = LoadGenerator::new(backend, Arc::clone(&hub));
    let plan = build_plan(42, &TopkMix::default(), 100);

    let report = generator
        .run_phase(&plan, &spec(Phase::A, 300, 100.0), &Arc::new(AtomicBool::new(false)))
        .await;

    assert!(report.sent > 5, "sent {}", report.sent);
    assert_eq!(report.sent, report.ok + report.errors);
    assert!(report.p95_ms > 0.0);
    assert!(report.recall_mean.is_some());

    let window = hub.window_60s(sl_core::SystemClock.epoch_ms());
    assert_eq!(window.samples, report.sent);
}

#[tokio::test]
async fn warmup_phase_never_scores_recall() {
    let hub = Arc::new(MetricsHub::new());
    let backend = Arc::new(SimBackend::new(SimProfile::fast(), 1).instant());
    let generator = LoadGenerator::new(backend, hub);
    let plan = build_plan(42, &TopkMix::default(), 100);

    let report = generator
        .run_phase(&plan, &spec(Phase::Warmup, 200, 50.0), &Arc::new(AtomicBool::new(false)))
        .await;
    assert!(report.recall_mean.is_none());
}

#[tokio::test]
async fn cancel_stops_issuing_requests() {
    let hub = Arc::new(MetricsHub::new());
    let backend = Arc::new(SimBackend::new(SimProfile::fast(), 1).instant());
    let generator = LoadGenerator::new(backend, hub);
    let plan = build_plan(42, &TopkMix::default(), 100);

    let cancel = Arc::new(AtomicBool::new(true));
    let report = generator
        .run_phase(&plan, &spec(Phase::A, 5_000, 100.0), &cancel)
        .await;
    assert_eq!(report.sent, 0);
}

#[tokio::test]
async fn simulated_errors_surface_in_report() {
    let hub = Arc::new(MetricsHub::new());
    let profile = SimProfile {
        error_rate: 1.0,
        ..SimProfile::fast()
    };
    let backend = Arc::new(SimBackend::new(profile, 1).instant());
    let generator = LoadGenerator::new(backend, hub);
    let plan = build_plan(42, &TopkMix::default(), 100);

    let report = generator
        .run_phase(&plan, &spec(Phase::A, 200, 50.0), &Arc::new(AtomicBool::new(false)))
        .await;
    assert!(report.sent > 0);
    assert_eq!(report.errors, report.sent);
    assert_eq!(report.error_rate, 1.0);
}

#[tokio::test]
async fn router_decisions_label_samples() {
    let hub = Arc::new(MetricsHub::new());
    let backend = Arc::new(SimBackend::new(SimProfile::fast(), 1).instant());
    let router = Arc::new(parking_lot::Mutex::new(Router::with_seed(
        RoutePolicy::Rules,
        RulesConfig::default(),
        CostRouterConfig::default(),
        7,
    )));
    let generator =
        LoadGenerator::new(backend, Arc::clone(&hub)).with_router(Arc::clone(&router));
    let plan = build_plan(42, &TopkMix { entries: vec![(10, 1.0)] }, 100);

    let report = generator
        .run_phase(&plan, &spec(Phase::A, 200, 50.0), &Arc::new(AtomicBool::new(false)))
        .await;

    assert!(report.sent > 0);
    let stats = router.lock().stats();
    assert_eq!(stats.total_decisions, report.sent);
}

#[tokio::test]
async fn sim_profiles_order_latency_and_recall() {
    let hub = Arc::new(MetricsHub::new());
    let plan = build_plan(42, &TopkMix::default(), 200);
    let cancel = Arc::new(AtomicBool::new(false));

    let mut results = Vec::new();
    for profile in [SimProfile::fast(), SimProfile::quality()] {
        let backend = Arc::new(SimBackend::new(profile, 9).instant());
        let generator = LoadGenerator::new(backend, Arc::clone(&hub));
        results.push(
            generator
                .run_phase(&plan, &spec(Phase::A, 300, 200.0), &cancel)
                .await,
        );
    }

    assert!(results[0].mean_ms < results[1].mean_ms);
    let fast_recall = results[0].recall_mean.unwrap();
    let quality_recall = results[1].recall_mean.unwrap();
    assert!(fast_recall < quality_recall);
}
