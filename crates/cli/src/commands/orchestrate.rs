// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrated run commands: plan/commit, status, report.

use crate::client::DaemonClient;
use crate::output::{emit, field, OutputFormat};
use anyhow::Result;
use clap::Args;
use serde_json::{json, Value};

#[derive(Args)]
pub struct OrchestrateArgs {
    /// Experiment kind (ab, canary, sweep, bandit-round, fiqa-fast)
    pub kind: String,
    #[arg(long = "dataset", default_value = "fiqa")]
    pub dataset_name: String,
    /// Enqueue the run instead of only planning it
    #[arg(long)]
    pub commit: bool,
    #[arg(long)]
    pub qps: Option<f64>,
    #[arg(long)]
    pub concurrency: Option<u32>,
    #[arg(long)]
    pub window_sec: Option<u32>,
    #[arg(long)]
    pub rounds: Option<u32>,
    #[arg(long)]
    pub seed: Option<u64>,
    /// Run mode: sim or http
    #[arg(long)]
    pub mode: Option<String>,
    #[arg(long)]
    pub tag: Option<String>,
}

pub async fn run(client: &DaemonClient, out: OutputFormat, args: OrchestrateArgs) -> Result<()> {
    let mut object = serde_json::Map::new();
    object.insert("kind".into(), json!(args.kind));
    object.insert("dataset_name".into(), json!(args.dataset_name));
    if let Some(qps) = args.qps {
        object.insert("qps".into(), json!(qps));
    }
    if let Some(concurrency) = args.concurrency {
        object.insert("concurrency".into(), json!(concurrency));
    }
    if let Some(window_sec) = args.window_sec {
        object.insert("window_sec".into(), json!(window_sec));
    }
    if let Some(rounds) = args.rounds {
        object.insert("rounds".into(), json!(rounds));
    }
    if let Some(seed) = args.seed {
        object.insert("seed".into(), json!(seed));
    }
    if let Some(mode) = &args.mode {
        object.insert("mode".into(), json!(mode));
    }
    if let Some(tag) = &args.tag {
        object.insert("tag".into(), json!(tag));
    }
    let body = Value::Object(object);

    let payload: Value = client
        .post(
            &format!("/orchestrate/run?commit={}", args.commit),
            Some(&body),
        )
        .await?;

    let lines = if args.commit {
        vec![format!(
            "run {} queued (position {})",
            payload["run_id"].as_str().unwrap_or("?"),
            payload["queue_position"].as_u64().unwrap_or(0),
        )]
    } else {
        vec![
            format!(
                "plan fingerprint {}",
                payload["plan"]["fingerprint"].as_str().unwrap_or("?")
            ),
            format!(
                "phases: {}",
                payload["plan"]["phases"]
                    .as_array()
                    .map(|p| p
                        .iter()
                        .filter_map(|v| v.as_str())
                        .collect::<Vec<_>>()
                        .join(" → "))
                    .unwrap_or_default()
            ),
            format!(
                "estimated: {} requests over {}s",
                payload["plan"]["estimated_requests"].as_u64().unwrap_or(0),
                payload["plan"]["estimated_duration_sec"]
                    .as_u64()
                    .unwrap_or(0),
            ),
        ]
    };
    emit(out, &payload, lines);
    Ok(())
}

#[derive(Args)]
pub struct RunStatusArgs {
    pub run_id: String,
}

pub async fn status(client: &DaemonClient, out: OutputFormat, args: RunStatusArgs) -> Result<()> {
    let payload: Value = client
        .get(&format!("/orchestrate/status?run_id={}", args.run_id))
        .await?;
    let lines = ["run_id", "status", "stage", "queue_position"]
        .iter()
        .filter_map(|key| field(key, &payload[*key]))
        .collect();
    emit(out, &payload, lines);
    Ok(())
}

#[derive(Args)]
pub struct ReportArgs {
    pub run_id: String,
}

pub async fn report(client: &DaemonClient, out: OutputFormat, args: ReportArgs) -> Result<()> {
    let payload: Value = client
        .get(&format!("/orchestrate/report?run_id={}", args.run_id))
        .await?;

    let mut lines = vec![format!(
        "run {}: {}",
        payload["run_id"].as_str().unwrap_or("?"),
        payload["status"].as_str().unwrap_or("?")
    )];
    if let Some(artifacts) = payload["artifacts"].as_object() {
        for (role, path) in artifacts {
            lines.push(format!("  {role}: {}", path.as_str().unwrap_or("?")));
        }
    }
    if let Some(overall) = payload["verdict"]["overall"].as_str() {
        lines.push(format!("verdict: {overall}"));
    }
    emit(out, &payload, lines);
    Ok(())
}
