// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic, QPS-paced load generation.
//!
//! The query plan is a pure function of `(seed, topk_mix)`: every phase of
//! a run replays the same sequence, and repeated runs with the same seed
//! are identical. Pacing targets the requested QPS under a concurrency
//! cap; phase boundaries are hard: in-flight requests are drained before
//! the phase returns.

use crate::metrics::MetricsHub;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sl_core::{Clock, MetricSample, Phase, SystemClock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Query pool the deterministic plan draws from.
const QUERY_POOL: &[&str] = &[
    "What is ETF expense ratio?",
    "How is APR different from APY?",
    "How are dividends taxed in the US?",
    "What is a mutual fund load?",
    "How do bond coupons work?",
    "What is dollar-cost averaging?",
    "How does an index fund track its index?",
    "What is a covered call strategy?",
    "How are capital gains taxed short vs long term?",
    "What is a REIT and how does it pay dividends?",
    "federal reserve interest rate decision impact",
    "stock market volatility and investor sentiment",
    "inflation data and consumer price index",
    "best credit card for cashback rewards?",
    "retirement planning in your 30s advice",
    "emergency fund how much to save?",
];

/// Weighted topk choices for plan generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopkMix {
    pub entries: Vec<(u32, f64)>,
}

impl Default for TopkMix {
    fn default() -> Self {
        Self {
            entries: vec![(10, 0.6), (20, 0.3), (50, 0.1)],
        }
    }
}

/// One planned request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedQuery {
    pub seq: u64,
    pub topk: u32,
    pub text: String,
}

/// Deterministic request sequence for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadPlan {
    pub seed: u64,
    pub queries: Vec<PlannedQuery>,
}

/// Build the query plan. Same `(seed, topk_mix, count)` → same plan.
pub fn build_plan(seed: u64, topk_mix: &TopkMix, count: usize) -> LoadPlan {
    let mut rng = StdRng::seed_from_u64(seed);
    let total_weight: f64 = topk_mix.entries.iter().map(|(_, w)| w).sum();

    let queries = (0..count as u64)
        .map(|seq| {
            let roll: f64 = rng.random::<f64>() * total_weight;
            let mut acc = 0.0;
            let mut topk = topk_mix.entries.last().map(|(k, _)| *k).unwrap_or(10);
            for (k, w) in &topk_mix.entries {
                acc += w;
                if roll < acc {
                    topk = *k;
                    break;
                }
            }
            let text = QUERY_POOL[rng.random_range(0..QUERY_POOL.len())].to_string();
            PlannedQuery { seq, topk, text }
        })
        .collect();

    LoadPlan { seed, queries }
}

/// Raw outcome of one backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub latency_ms: f64,
    pub status: u16,
    pub error: Option<String>,
    pub recall_at_k: Option<f64>,
    pub backend_used: String,
    pub cache_hit: Option<bool>,
}

/// A search backend the generator can drive.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &PlannedQuery) -> SearchOutcome;
}

/// Latency/recall profile for the simulated backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimProfile {
    pub base_latency_ms: f64,
    pub jitter_ms: f64,
    pub recall_mean: f64,
    pub recall_jitter: f64,
    pub error_rate: f64,
}

impl SimProfile {
    pub fn fast() -> Self {
        Self {
            base_latency_ms: 12.0,
            jitter_ms: 8.0,
            recall_mean: 0.86,
            recall_jitter: 0.04,
            error_rate: 0.0,
        }
    }

    pub fn balanced() -> Self {
        Self {
            base_latency_ms: 25.0,
            jitter_ms: 15.0,
            recall_mean: 0.91,
            recall_jitter: 0.03,
            error_rate: 0.0,
        }
    }

    pub fn quality() -> Self {
        Self {
            base_latency_ms: 60.0,
            jitter_ms: 25.0,
            recall_mean: 0.95,
            recall_jitter: 0.02,
            error_rate: 0.0,
        }
    }
}

/// Simulated backend: the explicit `sim` run mode an operator selects.
pub struct SimBackend {
    profile: SimProfile,
    rng: parking_lot::Mutex<StdRng>,
    /// Skip real sleeps (test runs).
    instant: bool,
}

impl SimBackend {
    pub fn new(profile: SimProfile, seed: u64) -> Self {
        Self {
            profile,
            rng: parking_lot::Mutex::new(StdRng::seed_from_u64(seed)),
            instant: false,
        }
    }

    /// Skip latency sleeps; outcomes still report simulated latencies.
    pub fn instant(mut self) -> Self {
        self.instant = true;
        self
    }
}

#[async_trait]
impl SearchBackend for SimBackend {
    async fn search(&self, _query: &PlannedQuery) -> SearchOutcome {
        let (latency_ms, recall, is_error) = {
            let mut rng = self.rng.lock();
            let latency = self.profile.base_latency_ms + rng.random::<f64>() * self.profile.jitter_ms;
            let recall = (self.profile.recall_mean
                + (rng.random::<f64>() - 0.5) * 2.0 * self.profile.recall_jitter)
                .clamp(0.0, 1.0);
            let is_error = rng.random::<f64>() < self.profile.error_rate;
            (latency, recall, is_error)
        };

        if !self.instant {
            tokio::time::sleep(Duration::from_secs_f64(latency_ms / 1_000.0)).await;
        }

        if is_error {
            SearchOutcome {
                latency_ms,
                status: 500,
                error: Some("simulated backend error".into()),
                recall_at_k: None,
                backend_used: "sim".into(),
                cache_hit: None,
            }
        } else {
            SearchOutcome {
                latency_ms,
                status: 200,
                error: None,
                recall_at_k: Some(recall),
                backend_used: "sim".into(),
                cache_hit: Some(false),
            }
        }
    }
}

/// HTTP backend driving an external search API (`RAG_API_BASE`).
pub struct HttpBackend {
    base: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base: impl Into<String>, deadline: Duration) -> Result<Self, crate::EngineError> {
        let client = reqwest::Client::builder()
            .timeout(deadline)
            .build()
            .map_err(|e| crate::EngineError::Backend(format!("http client: {e}")))?;
        Ok(Self {
            base: base.into(),
            client,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    recall_at_10: Option<f64>,
    #[serde(default)]
    cache_hit: Option<bool>,
    #[serde(default)]
    backend: Option<String>,
}

#[async_trait]
impl SearchBackend for HttpBackend {
    async fn search(&self, query: &PlannedQuery) -> SearchOutcome {
        let start = std::time::Instant::now();
        let result = self
            .client
            .get(format!("{}/search", self.base))
            .query(&[("query", query.text.as_str())])
            .query(&[("top_k", query.topk)])
            .send()
            .await;
        let latency_ms = start.elapsed().as_secs_f64() * 1_000.0;

        match result {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body: Option<SearchResponse> = resp.json().await.ok();
                let body = body.unwrap_or(SearchResponse {
                    recall_at_10: None,
                    cache_hit: None,
                    backend: None,
                });
                SearchOutcome {
                    latency_ms,
                    status,
                    error: (status >= 400).then(|| format!("http status {status}")),
                    recall_at_k: body.recall_at_10,
                    backend_used: body.backend.unwrap_or_else(|| "http".into()),
                    cache_hit: body.cache_hit,
                }
            }
            Err(e) => {
                let error = if e.is_timeout() {
                    "deadline exceeded".to_string()
                } else {
                    e.to_string()
                };
                SearchOutcome {
                    latency_ms,
                    status: 0,
                    error: Some(error),
                    recall_at_k: None,
                    backend_used: "http".into(),
                    cache_hit: None,
                }
            }
        }
    }
}

/// Pacing spec for one phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseSpec {
    pub phase: Phase,
    pub window: Duration,
    pub qps: f64,
    pub concurrency: usize,
    /// Fraction of requests scored for recall.
    pub recall_sample: f64,
}

/// Aggregate statistics for one completed phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub sent: u64,
    pub ok: u64,
    pub errors: u64,
    pub error_rate: f64,
    pub p95_ms: f64,
    pub mean_ms: f64,
    pub std_ms: f64,
    pub recall_mean: Option<f64>,
    pub qps_actual: f64,
}

impl PhaseReport {
    fn from_samples(phase: Phase, samples: &[MetricSample], elapsed: Duration) -> Self {
        let sent = samples.len() as u64;
        let errors = samples.iter().filter(|s| s.is_error()).count() as u64;

        let mut latencies: Vec<f64> = samples.iter().map(|s| s.latency_ms).collect();
        latencies.sort_by(|a, b| a.total_cmp(b));

        let mean = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<f64>() / latencies.len() as f64
        };
        let std = if latencies.len() < 2 {
            0.0
        } else {
            let var = latencies.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                / (latencies.len() - 1) as f64;
            var.sqrt()
        };

        let recalls: Vec<f64> = samples.iter().filter_map(|s| s.recall_at_k).collect();

        Self {
            phase,
            sent,
            ok: sent - errors,
            errors,
            error_rate: if sent == 0 {
                0.0
            } else {
                errors as f64 / sent as f64
            },
            p95_ms: sl_control::sla::percentile(&latencies, 0.95),
            mean_ms: mean,
            std_ms: std,
            recall_mean: (!recalls.is_empty())
                .then(|| recalls.iter().sum::<f64>() / recalls.len() as f64),
            qps_actual: if elapsed.as_secs_f64() > 0.0 {
                sent as f64 / elapsed.as_secs_f64()
            } else {
                0.0
            },
        }
    }
}

/// QPS-paced phase driver pushing samples into the metrics hub.
pub struct LoadGenerator<B: SearchBackend + ?Sized + 'static> {
    backend: Arc<B>,
    hub: Arc<MetricsHub>,
    router: Option<Arc<parking_lot::Mutex<sl_control::Router>>>,
}

impl<B: SearchBackend + ?Sized + 'static> LoadGenerator<B> {
    pub fn new(backend: Arc<B>, hub: Arc<MetricsHub>) -> Self {
        Self {
            backend,
            hub,
            router: None,
        }
    }

    /// Route each request through the shared router so decisions, counters,
    /// and history reflect real traffic.
    pub fn with_router(mut self, router: Arc<parking_lot::Mutex<sl_control::Router>>) -> Self {
        self.router = Some(router);
        self
    }

    /// Drive one phase of the plan.
    ///
    /// Respects the cancel flag at every request boundary. The returned
    /// report covers exactly this phase's requests: the final in-flight
    /// requests are awaited before returning.
    pub async fn run_phase(
        &self,
        plan: &LoadPlan,
        spec: &PhaseSpec,
        cancel: &Arc<AtomicBool>,
    ) -> PhaseReport {
        let clock = SystemClock;
        let start = clock.now();
        let qps = spec.qps.max(0.1);
        let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / qps));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let semaphore = Arc::new(Semaphore::new(spec.concurrency.max(1)));
        let mut join_set: JoinSet<MetricSample> = JoinSet::new();
        let mut samples: Vec<MetricSample> = Vec::new();

        let recall_every = if spec.recall_sample <= 0.0 {
            u64::MAX
        } else {
            (1.0 / spec.recall_sample).round().max(1.0) as u64
        };

        let mut seq: u64 = 0;
        while start.elapsed() < spec.window {
            if cancel.load(Ordering::SeqCst) {
                debug!(phase = %spec.phase, "cancel observed at request boundary");
                break;
            }
            ticker.tick().await;
            if start.elapsed() >= spec.window {
                break;
            }

            // Drain any finished requests without blocking the pacer.
            while let Some(done) = join_set.try_join_next() {
                if let Ok(sample) = done {
                    samples.push(sample);
                }
            }

            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };

            let query = plan.queries[(seq as usize) % plan.queries.len()].clone();
            let score_recall = spec.phase.is_scored() && seq % recall_every == 0;
            let backend = Arc::clone(&self.backend);
            let hub = Arc::clone(&self.hub);
            let phase = spec.phase;
            let clock = clock.clone();

            let routed_backend = self.router.as_ref().map(|router| {
                let decision = router.lock().route(
                    &sl_control::QueryContext {
                        topk: query.topk,
                        has_filter: false,
                        has_fulltext: false,
                        complexity: 0.0,
                    },
                    &sl_control::BackendLoad::default(),
                    &sl_control::BackendLoad::default(),
                );
                decision.backend.as_str().to_string()
            });

            join_set.spawn(async move {
                let ts_ms = clock.epoch_ms();
                let outcome = backend.search(&query).await;
                drop(permit);

                let sample = MetricSample {
                    ts_ms,
                    phase,
                    query_seq: query.seq,
                    topk: query.topk,
                    latency_ms: outcome.latency_ms,
                    status: outcome.status,
                    error: outcome.error,
                    recall_at_k: if score_recall { outcome.recall_at_k } else { None },
                    backend_used: routed_backend.unwrap_or(outcome.backend_used),
                    cache_hit: outcome.cache_hit,
                };
                hub.record(clock.epoch_ms(), &sample);
                sample
            });
            seq += 1;
        }

        // Hard phase boundary: drain all in-flight requests now.
        while let Some(done) = join_set.join_next().await {
            match done {
                Ok(sample) => samples.push(sample),
                Err(e) => warn!(error = %e, "load task failed"),
            }
        }

        PhaseReport::from_samples(spec.phase, &samples, start.elapsed())
    }
}

#[cfg(test)]
#[path = "loadgen_tests.rs"]
mod tests;
