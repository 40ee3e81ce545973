// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rolling metrics aggregation over aligned 5-second buckets.
//!
//! The hub holds a ring of buckets spanning a 60-second window. Appends
//! take one short-lived lock; snapshots are O(bucket count) and tolerate
//! ±1 s of producer clock drift at the window edges.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sl_control::sla::percentile;
use sl_core::MetricSample;
use std::collections::BTreeMap;

/// Bucket width.
pub const BUCKET_MS: u64 = 5_000;

/// Window length.
pub const WINDOW_MS: u64 = 60_000;

/// Drift tolerance at either window edge.
const DRIFT_MS: u64 = 1_000;

/// Minimum samples for a per-bucket p95.
const MIN_P95_SAMPLES: usize = 3;

#[derive(Debug, Default, Clone)]
struct Bucket {
    latencies: Vec<f64>,
    recalls: Vec<f64>,
    errors: u64,
}

#[derive(Debug, Default)]
struct HubInner {
    buckets: BTreeMap<u64, Bucket>,
    /// Samples rejected for falling outside the window.
    dropped: u64,
    accepted: u64,
    /// Highest sample timestamp observed.
    heartbeat_ms: Option<u64>,
}

/// Aggregated 60-second window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub window_sec: u32,
    pub samples: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p95_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p99_ms: Option<f64>,
    pub tps: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall_mean: Option<f64>,
    pub error_rate: f64,
}

/// One aligned 5-second bucket in the series view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketPoint {
    pub ts_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p95: Option<f64>,
    pub tps: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall: Option<f64>,
}

/// Observability metadata attached to the series view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMeta {
    pub now_ms: u64,
    pub cutoff_ms: u64,
    pub clock_skew_ms: u64,
    pub dropped_ratio: f64,
    pub filled_null_buckets: u32,
    pub non_empty_buckets: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_age_ms: Option<u64>,
}

/// Bucketed series over the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSnapshot {
    pub window_sec: u32,
    pub step_sec: u32,
    pub samples: u64,
    pub buckets: Vec<BucketPoint>,
    pub meta: SeriesMeta,
}

/// Shared metrics aggregator.
#[derive(Debug, Default)]
pub struct MetricsHub {
    inner: Mutex<HubInner>,
}

impl MetricsHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sample. `now_ms` anchors the acceptance window.
    pub fn record(&self, now_ms: u64, sample: &MetricSample) {
        let aligned_now = align(now_ms);
        let cutoff = aligned_now.saturating_sub(WINDOW_MS);

        let mut inner = self.inner.lock();
        inner.heartbeat_ms = Some(inner.heartbeat_ms.map_or(sample.ts_ms, |h| h.max(sample.ts_ms)));

        if sample.ts_ms < cutoff.saturating_sub(DRIFT_MS) || sample.ts_ms > aligned_now + BUCKET_MS + DRIFT_MS {
            inner.dropped += 1;
            return;
        }
        inner.accepted += 1;

        let bucket_ts = align(sample.ts_ms);
        let bucket = inner.buckets.entry(bucket_ts).or_default();
        bucket.latencies.push(sample.latency_ms);
        if let Some(recall) = sample.recall_at_k {
            bucket.recalls.push(recall);
        }
        if sample.is_error() {
            bucket.errors += 1;
        }

        // Prune buckets that can no longer appear in any snapshot.
        let prune_before = cutoff.saturating_sub(2 * BUCKET_MS);
        inner.buckets.retain(|ts, _| *ts >= prune_before);
    }

    /// Aggregates over the whole 60-second window.
    pub fn window_60s(&self, now_ms: u64) -> WindowSnapshot {
        let aligned_now = align(now_ms);
        let cutoff = aligned_now.saturating_sub(WINDOW_MS);

        let inner = self.inner.lock();
        let mut latencies: Vec<f64> = Vec::new();
        let mut recalls: Vec<f64> = Vec::new();
        let mut errors = 0u64;

        for (ts, bucket) in inner.buckets.range(cutoff..=aligned_now) {
            debug_assert_eq!(ts % BUCKET_MS, 0);
            latencies.extend_from_slice(&bucket.latencies);
            recalls.extend_from_slice(&bucket.recalls);
            errors += bucket.errors;
        }

        let samples = latencies.len() as u64;
        latencies.sort_by(|a, b| a.total_cmp(b));

        WindowSnapshot {
            window_sec: (WINDOW_MS / 1_000) as u32,
            samples,
            p95_ms: (!latencies.is_empty()).then(|| percentile(&latencies, 0.95)),
            p99_ms: (!latencies.is_empty()).then(|| percentile(&latencies, 0.99)),
            tps: samples as f64 / (WINDOW_MS as f64 / 1_000.0),
            recall_mean: (!recalls.is_empty())
                .then(|| recalls.iter().sum::<f64>() / recalls.len() as f64),
            error_rate: if samples == 0 {
                0.0
            } else {
                errors as f64 / samples as f64
            },
        }
    }

    /// Strictly aligned per-bucket series over the window, with null fill
    /// for empty buckets.
    pub fn series_60s(&self, now_ms: u64) -> SeriesSnapshot {
        let aligned_now = align(now_ms);
        let cutoff = aligned_now.saturating_sub(WINDOW_MS);

        let inner = self.inner.lock();
        let mut buckets = Vec::new();
        let mut filled_null = 0u32;
        let mut non_empty = 0u32;
        let mut samples = 0u64;

        let mut ts = cutoff;
        while ts <= aligned_now {
            match inner.buckets.get(&ts) {
                None => {
                    filled_null += 1;
                    buckets.push(BucketPoint {
                        ts_ms: ts,
                        p95: None,
                        tps: 0.0,
                        recall: None,
                    });
                }
                Some(bucket) => {
                    non_empty += 1;
                    samples += bucket.latencies.len() as u64;

                    let mut latencies = bucket.latencies.clone();
                    latencies.sort_by(|a, b| a.total_cmp(b));

                    buckets.push(BucketPoint {
                        ts_ms: ts,
                        p95: (latencies.len() >= MIN_P95_SAMPLES)
                            .then(|| percentile(&latencies, 0.95)),
                        tps: bucket.latencies.len() as f64 / (BUCKET_MS as f64 / 1_000.0),
                        recall: (!bucket.recalls.is_empty()).then(|| {
                            bucket.recalls.iter().sum::<f64>() / bucket.recalls.len() as f64
                        }),
                    });
                }
            }
            ts += BUCKET_MS;
        }

        let total_seen = inner.accepted + inner.dropped;
        SeriesSnapshot {
            window_sec: (WINDOW_MS / 1_000) as u32,
            step_sec: (BUCKET_MS / 1_000) as u32,
            samples,
            buckets,
            meta: SeriesMeta {
                now_ms,
                cutoff_ms: cutoff,
                clock_skew_ms: now_ms - aligned_now,
                dropped_ratio: if total_seen == 0 {
                    0.0
                } else {
                    inner.dropped as f64 / total_seen as f64
                },
                filled_null_buckets: filled_null,
                non_empty_buckets: non_empty,
                heartbeat_age_ms: inner.heartbeat_ms.map(|h| now_ms.saturating_sub(h)),
            },
        }
    }
}

fn align(ts_ms: u64) -> u64 {
    ts_ms / BUCKET_MS * BUCKET_MS
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
