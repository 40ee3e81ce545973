// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sl_core::Phase;

const NOW: u64 = 1_700_000_060_123;

fn sample(ts_ms: u64, latency_ms: f64, recall: Option<f64>) -> MetricSample {
    MetricSample {
        ts_ms,
        phase: Phase::A,
        query_seq: 0,
        topk: 10,
        latency_ms,
        status: 200,
        error: None,
        recall_at_k: recall,
        backend_used: "dense".into(),
        cache_hit: None,
    }
}

#[test]
fn empty_hub_reports_zero_window() {
    let hub = MetricsHub::new();
    let window = hub.window_60s(NOW);
    assert_eq!(window.samples, 0);
    assert!(window.p95_ms.is_none());
    assert_eq!(window.tps, 0.0);
    assert!(window.recall_mean.is_none());
}

#[test]
fn window_aggregates_all_buckets() {
    let hub = MetricsHub::new();
    for i in 0..60 {
        hub.record(NOW, &sample(NOW - i * 1_000, 10.0 + i as f64, Some(0.9)));
    }
    let window = hub.window_60s(NOW);
    assert!(window.samples >= 55);
    assert!(window.p95_ms.is_some());
    assert!(window.tps > 0.0);
    let recall = window.recall_mean.unwrap();
    assert!((recall - 0.9).abs() < 1e-9);
}

#[test]
fn series_has_thirteen_aligned_buckets() {
    let hub = MetricsHub::new();
    let series = hub.series_60s(NOW);
    assert_eq!(series.buckets.len(), 13);
    for bucket in &series.buckets {
        assert_eq!(bucket.ts_ms % BUCKET_MS, 0);
    }
    assert_eq!(series.meta.filled_null_buckets, 13);
    assert_eq!(series.meta.clock_skew_ms, NOW % BUCKET_MS);
}

#[test]
fn bucket_p95_needs_three_samples() {
    let hub = MetricsHub::new();
    let aligned = NOW / BUCKET_MS * BUCKET_MS;
    hub.record(NOW, &sample(aligned, 10.0, None));
    hub.record(NOW, &sample(aligned + 1, 20.0, None));

    let series = hub.series_60s(NOW);
    let bucket = series.buckets.iter().find(|b| b.ts_ms == aligned).unwrap();
    assert!(bucket.p95.is_none());
    assert!((bucket.tps - 0.4).abs() < 1e-9);

    hub.record(NOW, &sample(aligned + 2, 30.0, None));
    let series = hub.series_60s(NOW);
    let bucket = series.buckets.iter().find(|b| b.ts_ms == aligned).unwrap();
    assert!(bucket.p95.is_some());
}

#[test]
fn bucket_recall_is_mean_or_null() {
    let hub = MetricsHub::new();
    let aligned = NOW / BUCKET_MS * BUCKET_MS;
    hub.record(NOW, &sample(aligned, 10.0, Some(0.8)));
    hub.record(NOW, &sample(aligned, 10.0, Some(1.0)));
    hub.record(NOW, &sample(aligned - BUCKET_MS, 10.0, None));

    let series = hub.series_60s(NOW);
    let with_recall = series.buckets.iter().find(|b| b.ts_ms == aligned).unwrap();
    assert!((with_recall.recall.unwrap() - 0.9).abs() < 1e-9);
    let without = series
        .buckets
        .iter()
        .find(|b| b.ts_ms == aligned - BUCKET_MS)
        .unwrap();
    assert!(without.recall.is_none());
}

#[test]
fn out_of_window_samples_are_dropped() {
    let hub = MetricsHub::new();
    hub.record(NOW, &sample(NOW - 2 * WINDOW_MS, 10.0, None));
    hub.record(NOW, &sample(NOW, 10.0, None));

    let series = hub.series_60s(NOW);
    assert_eq!(series.samples, 1);
    assert!((series.meta.dropped_ratio - 0.5).abs() < 1e-9);
}

#[test]
fn boundary_samples_tolerate_one_second_drift() {
    let hub = MetricsHub::new();
    let aligned = NOW / BUCKET_MS * BUCKET_MS;
    let cutoff = aligned - WINDOW_MS;
    // 500ms before the cutoff: inside drift tolerance.
    hub.record(NOW, &sample(cutoff - 500, 10.0, None));
    // 2s before the cutoff: dropped.
    hub.record(NOW, &sample(cutoff - 2_000, 10.0, None));

    let series = hub.series_60s(NOW);
    assert!((series.meta.dropped_ratio - 0.5).abs() < 1e-9);
}

#[test]
fn heartbeat_age_tracks_latest_sample() {
    let hub = MetricsHub::new();
    hub.record(NOW, &sample(NOW - 7_000, 10.0, None));
    let series = hub.series_60s(NOW);
    assert_eq!(series.meta.heartbeat_age_ms, Some(7_000));
}

#[test]
fn error_rate_counts_failures() {
    let hub = MetricsHub::new();
    let mut err = sample(NOW, 10.0, None);
    err.status = 500;
    hub.record(NOW, &err);
    hub.record(NOW, &sample(NOW, 10.0, None));
    hub.record(NOW, &sample(NOW, 10.0, None));
    hub.record(NOW, &sample(NOW, 10.0, None));

    let window = hub.window_60s(NOW);
    assert!((window.error_rate - 0.25).abs() < 1e-9);
}

#[test]
fn old_buckets_are_pruned() {
    let hub = MetricsHub::new();
    hub.record(NOW, &sample(NOW, 10.0, None));
    // Two minutes later the old bucket no longer contributes.
    let later = NOW + 2 * WINDOW_MS;
    hub.record(later, &sample(later, 10.0, None));

    let window = hub.window_60s(later);
    assert_eq!(window.samples, 1);
}
