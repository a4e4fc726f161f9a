// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Image Gateway Daemon (igwd)
//!
//! Long-running process owning the image lifecycle manager: it pulls
//! images through the worker pool, reconciles worker status events into
//! the record store, and periodically checkpoints persistent stores.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod lifecycle;

use std::path::PathBuf;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use crate::lifecycle::LifecycleError;

/// How often persistent stores are checkpointed.
const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(60);

/// How long shutdown waits for the reconciler to drain.
const RECONCILER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

fn print_usage() {
    println!("igwd {}", env!("CARGO_PKG_VERSION"));
    println!("Image Gateway Daemon - pulls, tracks, and expires container images");
    println!();
    println!("USAGE:");
    println!("    igwd [CONFIG]");
    println!();
    println!("CONFIG defaults to $IGW_CONFIG, then ./imagegw.toml.");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print help information");
    println!("    -v, --version    Print version information");
}

fn config_path() -> PathBuf {
    if let Some(arg) = std::env::args().nth(1) {
        return PathBuf::from(arg);
    }
    if let Ok(path) = std::env::var("IGW_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("imagegw.toml")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config/lock acquisition
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("igwd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                print_usage();
                return Ok(());
            }
            _ => {}
        }
    }

    let _log_guard = setup_logging();

    let mut startup = match lifecycle::startup(&config_path()).await {
        Ok(result) => result,
        Err(LifecycleError::LockFailed(path)) => {
            eprintln!("igwd is already running (lock: {})", path.display());
            std::process::exit(1);
        }
        Err(e) => {
            error!("failed to start gateway: {}", e);
            return Err(e.into());
        }
    };

    // Periodic checkpoints for persistent stores
    if startup.connection.snapshot_path.is_some() {
        let connection = startup.connection.clone();
        let db = startup.config.store_db.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CHECKPOINT_INTERVAL);
            // The first tick fires immediately; skip it
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = connection.checkpoint(&db) {
                    tracing::warn!(error = %e, "store checkpoint failed");
                }
            }
        });
    }

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!("gateway ready");
    println!("READY");

    tokio::select! {
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("received SIGINT, shutting down");
        }
    }

    // Stop the reconciler after it drains the current event, then take a
    // final checkpoint.
    startup.manager.shutdown().await;
    if tokio::time::timeout(RECONCILER_DRAIN_TIMEOUT, &mut startup.reconciler)
        .await
        .is_err()
    {
        error!("reconciler did not drain in time");
    }
    if let Err(e) = startup.connection.checkpoint(&startup.config.store_db) {
        error!("final checkpoint failed: {}", e);
    }

    info!("gateway stopped");
    Ok(())
}

fn setup_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // IGW_LOG_FILE redirects logs to a file; stderr otherwise
    if let Ok(path) = std::env::var("IGW_LOG_FILE") {
        let path = PathBuf::from(path);
        let dir = path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "igwd.log".into());
        let appender = tracing_appender::rolling::never(dir, name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(non_blocking))
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
        None
    }
}
