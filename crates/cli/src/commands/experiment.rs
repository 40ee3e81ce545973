// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Experiment job commands: submit, status, logs, cancel, jobs.

use crate::client::DaemonClient;
use crate::output::{emit, field, OutputFormat};
use anyhow::Result;
use clap::Args;
use serde_json::{json, Value};

#[derive(Args)]
pub struct SubmitArgs {
    /// Experiment kind (fiqa-fast, canary, ab, sweep, bandit-round)
    pub kind: String,
    /// Dataset name from the registry
    #[arg(long = "dataset", default_value = "fiqa")]
    pub dataset_name: String,
}

pub async fn submit(client: &DaemonClient, out: OutputFormat, args: SubmitArgs) -> Result<()> {
    let payload: Value = client
        .post(
            "/experiment/run",
            Some(&json!({"kind": args.kind, "dataset_name": args.dataset_name})),
        )
        .await?;
    let lines = vec![format!(
        "submitted {} ({})",
        payload["job_id"].as_str().unwrap_or("?"),
        payload["status"].as_str().unwrap_or("?")
    )];
    emit(out, &payload, lines);
    Ok(())
}

#[derive(Args)]
pub struct StatusArgs {
    pub job_id: String,
}

pub async fn status(client: &DaemonClient, out: OutputFormat, args: StatusArgs) -> Result<()> {
    let payload: Value = client
        .get(&format!("/experiment/status/{}", args.job_id))
        .await?;
    let lines = job_lines(&payload);
    emit(out, &payload, lines);
    Ok(())
}

#[derive(Args)]
pub struct LogsArgs {
    pub job_id: String,
    /// Number of lines from the end
    #[arg(long, default_value_t = 100)]
    pub tail: usize,
}

pub async fn logs(client: &DaemonClient, out: OutputFormat, args: LogsArgs) -> Result<()> {
    let payload: Value = client
        .get(&format!(
            "/experiment/logs/{}?tail={}",
            args.job_id, args.tail
        ))
        .await?;

    let mut lines = Vec::new();
    for stream in ["stdout", "stderr"] {
        if let Some(entries) = payload[stream].as_array() {
            for entry in entries {
                if let Some(s) = entry.as_str() {
                    lines.push(format!("[{stream}] {s}"));
                }
            }
        }
    }
    emit(out, &payload, lines);
    Ok(())
}

#[derive(Args)]
pub struct CancelArgs {
    pub job_id: String,
}

pub async fn cancel(client: &DaemonClient, out: OutputFormat, args: CancelArgs) -> Result<()> {
    let payload: Value = client
        .post(&format!("/experiment/cancel/{}", args.job_id), None)
        .await?;
    let lines = vec![format!(
        "{}: {}",
        payload["job_id"].as_str().unwrap_or("?"),
        payload["status"].as_str().unwrap_or("?")
    )];
    emit(out, &payload, lines);
    Ok(())
}

#[derive(Args)]
pub struct JobsArgs {
    /// Maximum jobs to list
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

pub async fn jobs(client: &DaemonClient, out: OutputFormat, args: JobsArgs) -> Result<()> {
    let payload: Value = client
        .get(&format!("/experiment/jobs?limit={}", args.limit))
        .await?;

    let mut lines = Vec::new();
    if let Some(jobs) = payload.as_array() {
        for job in jobs {
            lines.push(format!(
                "{}  {}  {}",
                job["job_id"].as_str().unwrap_or("?"),
                job["kind"].as_str().unwrap_or("?"),
                job["status"].as_str().unwrap_or("?"),
            ));
        }
        if jobs.is_empty() {
            lines.push("no jobs".to_string());
        }
    }
    emit(out, &payload, lines);
    Ok(())
}

fn job_lines(payload: &Value) -> Vec<String> {
    ["job_id", "kind", "status", "queue_position", "reason"]
        .iter()
        .filter_map(|key| field(key, &payload[*key]))
        .collect()
}
