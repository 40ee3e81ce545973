// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! sld - the searchlab daemon binary.

use sl_daemon::{http, lifecycle, Config};
use sl_engine::EnvConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn print_usage() {
    eprintln!("usage: sld [--addr HOST:PORT] [--state-dir PATH]");
}

struct Args {
    addr: Option<SocketAddr>,
    state_dir: Option<PathBuf>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        addr: None,
        state_dir: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--addr" => {
                let value = iter.next().ok_or("--addr requires a value")?;
                args.addr = Some(
                    value
                        .parse()
                        .map_err(|e| format!("invalid --addr {value:?}: {e}"))?,
                );
            }
            "--state-dir" => {
                let value = iter.next().ok_or("--state-dir requires a value")?;
                args.state_dir = Some(PathBuf::from(value));
            }
            "--help" | "-h" => return Err(String::new()),
            other => return Err(format!("unknown flag {other:?}")),
        }
    }
    Ok(args)
}

fn init_tracing(state_dir: &std::path::Path) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match std::fs::create_dir_all(state_dir.join("logs")) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(state_dir.join("logs"), "sld.log");
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(file_writer),
                )
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("sld: {message}");
            }
            print_usage();
            return ExitCode::from(2);
        }
    };

    let env = EnvConfig::from_env();
    let mut config = Config::load(&env, args.state_dir);
    if let Some(addr) = args.addr {
        config = config.with_addr(addr);
    }

    let _guard = init_tracing(&config.state_dir);
    info!(pid = std::process::id(), "--- sld: starting ---");

    let result = match lifecycle::startup(config).await {
        Ok(result) => result,
        Err(e) => {
            error!("startup failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut daemon = result.daemon;
    let router = http::build_router(std::sync::Arc::clone(&daemon.app));

    let serve = axum::serve(result.listener, router).with_graceful_shutdown(shutdown_signal());
    if let Err(e) = serve.await {
        error!("server error: {e}");
        daemon.shutdown();
        return ExitCode::FAILURE;
    }

    daemon.shutdown();
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
