// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! sl - searchlab CLI
//!
//! Every subcommand is a thin wrapper over one daemon HTTP endpoint.
//! Exit codes: 0 = ok, 1 = failure, 2 = usage error.

mod client;
mod commands;
mod exit_error;
mod output;

use clap::{Parser, Subcommand};
use client::DaemonClient;
use exit_error::ExitError;
use output::OutputFormat;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "sl",
    version,
    about = "searchlab - experiment orchestration for a retrieval search stack"
)]
struct Cli {
    /// Daemon base URL
    #[arg(
        long = "api",
        global = true,
        default_value = "http://127.0.0.1:8088",
        value_name = "URL"
    )]
    api: String,

    /// Output format
    #[arg(
        short = 'o',
        long = "output",
        value_enum,
        default_value_t,
        global = true
    )]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit an experiment job
    Submit(commands::experiment::SubmitArgs),
    /// Show one job's status
    Status(commands::experiment::StatusArgs),
    /// Tail a job's stdout/stderr
    Logs(commands::experiment::LogsArgs),
    /// Cancel a job
    Cancel(commands::experiment::CancelArgs),
    /// List jobs, newest first
    Jobs(commands::experiment::JobsArgs),
    /// Plan or start an orchestrated run
    Orchestrate(commands::orchestrate::OrchestrateArgs),
    /// Show a run's stage and queue position
    RunStatus(commands::orchestrate::RunStatusArgs),
    /// Show a run's artifacts and verdict
    Report(commands::orchestrate::ReportArgs),
    /// Controller and routing operations
    #[command(subcommand)]
    Ops(commands::ops::OpsCommand),
    /// Aggregated 60s metrics
    Metrics(commands::ops::MetricsArgs),
    /// Daemon liveness
    Health,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let client = DaemonClient::new(&cli.api);
    let out = cli.output;

    let result = match cli.command {
        Commands::Submit(args) => commands::experiment::submit(&client, out, args).await,
        Commands::Status(args) => commands::experiment::status(&client, out, args).await,
        Commands::Logs(args) => commands::experiment::logs(&client, out, args).await,
        Commands::Cancel(args) => commands::experiment::cancel(&client, out, args).await,
        Commands::Jobs(args) => commands::experiment::jobs(&client, out, args).await,
        Commands::Orchestrate(args) => commands::orchestrate::run(&client, out, args).await,
        Commands::RunStatus(args) => commands::orchestrate::status(&client, out, args).await,
        Commands::Report(args) => commands::orchestrate::report(&client, out, args).await,
        Commands::Ops(command) => commands::ops::dispatch(&client, out, command).await,
        Commands::Metrics(args) => commands::ops::metrics(&client, out, args).await,
        Commands::Health => commands::ops::health(&client, out).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("sl: {err}");
            ExitCode::from(ExitError::code_for(&err))
        }
    }
}
