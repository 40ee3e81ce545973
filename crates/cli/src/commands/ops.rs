// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ops commands: controller policy, routing flags, metrics, health.

use crate::client::DaemonClient;
use crate::output::{emit, OutputFormat};
use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::{json, Value};

#[derive(Subcommand)]
pub enum OpsCommand {
    /// Swap the active controller policy (aimd or pid)
    ControlPolicy {
        policy: String,
    },
    /// Show controller status
    ControlStatus,
    /// Configure routing
    RoutingFlags {
        #[arg(long, default_value_t = true)]
        enabled: bool,
        /// rules or cost
        #[arg(long, default_value = "rules")]
        mode: String,
        /// Force all traffic to one backend (dense or rich)
        #[arg(long)]
        manual_backend: Option<String>,
    },
    /// Show routing status
    RoutingStatus,
    /// Unified ops summary
    Summary,
}

pub async fn dispatch(
    client: &DaemonClient,
    out: OutputFormat,
    command: OpsCommand,
) -> Result<()> {
    match command {
        OpsCommand::ControlPolicy { policy } => {
            let payload: Value = client
                .post("/ops/control/policy", Some(&json!({"policy": policy})))
                .await?;
            emit(out, &payload, vec![format!("controller policy set: {policy}")]);
        }
        OpsCommand::ControlStatus => {
            let payload: Value = client.get("/ops/control/status").await?;
            let lines = vec![
                format!("policy: {}", payload["policy"].as_str().unwrap_or("?")),
                format!("decisions: {}", payload["decisions"].as_u64().unwrap_or(0)),
                format!(
                    "recommendation: concurrency={} batch={} ({})",
                    payload["recommendation"]["concurrency"].as_u64().unwrap_or(0),
                    payload["recommendation"]["batch_size"].as_u64().unwrap_or(0),
                    payload["recommendation"]["action"].as_str().unwrap_or("?"),
                ),
            ];
            emit(out, &payload, lines);
        }
        OpsCommand::RoutingFlags {
            enabled,
            mode,
            manual_backend,
        } => {
            let mut body = serde_json::Map::new();
            body.insert("enabled".into(), json!(enabled));
            body.insert("mode".into(), json!(mode));
            if let Some(backend) = manual_backend {
                body.insert("manual_backend".into(), json!(backend));
            }
            let payload: Value = client
                .post("/ops/routing/flags", Some(&Value::Object(body)))
                .await?;
            emit(out, &payload, vec![format!("routing mode set: {mode}")]);
        }
        OpsCommand::RoutingStatus => {
            let payload: Value = client.get("/ops/routing/status").await?;
            let stats = &payload["stats"];
            let lines = vec![
                format!("mode: {}", payload["flags"]["mode"].as_str().unwrap_or("?")),
                format!(
                    "decisions: {} (dense {} / rich {} / sampling {})",
                    stats["total_decisions"].as_u64().unwrap_or(0),
                    stats["dense_count"].as_u64().unwrap_or(0),
                    stats["rich_count"].as_u64().unwrap_or(0),
                    stats["sampling_count"].as_u64().unwrap_or(0),
                ),
            ];
            emit(out, &payload, lines);
        }
        OpsCommand::Summary => {
            let payload: Value = client.get("/ops/summary").await?;
            let lines = vec![
                format!("uptime: {}s", payload["uptime_sec"].as_u64().unwrap_or(0)),
                format!(
                    "window60s: {} samples, p95={}",
                    payload["window60s"]["samples"].as_u64().unwrap_or(0),
                    payload["window60s"]["p95_ms"]
                        .as_f64()
                        .map(|v| format!("{v:.1}ms"))
                        .unwrap_or_else(|| "n/a".to_string()),
                ),
                format!(
                    "queued jobs: {}",
                    payload["queued_jobs"].as_u64().unwrap_or(0)
                ),
            ];
            emit(out, &payload, lines);
        }
    }
    Ok(())
}

#[derive(Args)]
pub struct MetricsArgs {
    /// Show per-bucket series instead of the window aggregate
    #[arg(long)]
    pub series: bool,
}

pub async fn metrics(client: &DaemonClient, out: OutputFormat, args: MetricsArgs) -> Result<()> {
    if args.series {
        let payload: Value = client.get("/metrics/series60s").await?;
        let mut lines = Vec::new();
        if let Some(buckets) = payload["buckets"].as_array() {
            for bucket in buckets {
                lines.push(format!(
                    "{}  p95={}  tps={}",
                    bucket["ts_ms"].as_u64().unwrap_or(0),
                    bucket["p95"]
                        .as_f64()
                        .map(|v| format!("{v:.1}"))
                        .unwrap_or_else(|| "-".to_string()),
                    bucket["tps"].as_f64().unwrap_or(0.0),
                ));
            }
        }
        emit(out, &payload, lines);
    } else {
        let payload: Value = client.get("/metrics/window60s").await?;
        let lines = vec![format!(
            "samples={} p95={} tps={:.2} recall={}",
            payload["samples"].as_u64().unwrap_or(0),
            payload["p95_ms"]
                .as_f64()
                .map(|v| format!("{v:.1}ms"))
                .unwrap_or_else(|| "n/a".to_string()),
            payload["tps"].as_f64().unwrap_or(0.0),
            payload["recall_mean"]
                .as_f64()
                .map(|v| format!("{v:.4}"))
                .unwrap_or_else(|| "n/a".to_string()),
        )];
        emit(out, &payload, lines);
    }
    Ok(())
}

pub async fn health(client: &DaemonClient, out: OutputFormat) -> Result<()> {
    let payload: Value = client.get("/healthz").await?;
    emit(
        out,
        &payload,
        vec![format!(
            "ok (uptime {}s)",
            payload["uptime_sec"].as_u64().unwrap_or(0)
        )],
    );
    Ok(())
}
