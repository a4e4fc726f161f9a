// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway lifecycle: startup wiring and shutdown.

use fs2::FileExt;
use igw_core::{Config, ConfigError, SystemClock};
use igw_manager::{auth, AuthError, Manager, ManagerError, MungeAuthenticator, StatusReconciler};
use igw_store::{connect, Connection, MemoryBackend, RecordStore, StoreError};
use igw_workers::{CommandFetcher, PullWorkers};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

/// The manager with the daemon's concrete collaborator types.
pub type GatewayManager =
    Manager<MemoryBackend, PullWorkers<CommandFetcher>, MungeAuthenticator, SystemClock>;

/// Errors during startup/shutdown
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Manager(#[from] ManagerError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Another igwd already holds the store lock.
    #[error("another gateway instance holds {0}")]
    LockFailed(PathBuf),
}

/// Everything `main` needs after startup.
pub struct StartupResult {
    pub config: Arc<Config>,
    pub manager: Arc<GatewayManager>,
    /// The running reconciler task; joins after `manager.shutdown()`.
    pub reconciler: JoinHandle<()>,
    /// Store connection, kept for periodic checkpoints.
    pub connection: Connection,
    // NOTE(lifetime): held to maintain the exclusive instance lock;
    // released on drop
    #[allow(dead_code)]
    lock_file: Option<File>,
}

impl StartupResult {
    /// Checkpoint the store if the connection persists anywhere.
    pub fn checkpoint(&self) -> Result<(), StoreError> {
        self.connection.checkpoint(&self.config.store_db)
    }
}

/// Load config and bring up the store, workers, reconciler, and manager.
pub async fn startup(config_path: &Path) -> Result<StartupResult, LifecycleError> {
    let config = Arc::new(Config::load(config_path)?);
    info!(
        platforms = config.platforms.len(),
        store = %config.store_uri,
        "starting image gateway"
    );

    let authenticator = auth::from_config(&config.authentication)?;
    let connection = connect(&config.store_uri, &config.store_db)?;
    let lock_file = acquire_lock(&connection)?;

    let store = RecordStore::new(
        connection.backend.clone(),
        config.pull_update_timeout_ms(),
    );

    let fetcher = CommandFetcher::new(config.pull_command.clone(), config.expire_command.clone());
    let (pool, status_rx) = PullWorkers::new(fetcher);
    let status_tx = pool.status_sender();

    let reconciler = StatusReconciler::new(store.clone(), SystemClock, status_rx);
    let reconciler = tokio::spawn(reconciler.run());

    let manager = Manager::new(
        Arc::clone(&config),
        store,
        pool,
        authenticator,
        SystemClock,
        status_tx,
    )?;

    Ok(StartupResult {
        config,
        manager: Arc::new(manager),
        reconciler,
        connection,
        lock_file,
    })
}

/// One gateway instance per persisted store: take an exclusive lock next
/// to the snapshot. Ephemeral stores need no lock.
fn acquire_lock(connection: &Connection) -> Result<Option<File>, LifecycleError> {
    let Some(snapshot_path) = &connection.snapshot_path else {
        return Ok(None);
    };
    let lock_path = snapshot_path.with_extension("lock");
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = File::create(&lock_path)?;
    if file.try_lock_exclusive().is_err() {
        return Err(LifecycleError::LockFailed(lock_path));
    }
    let _ = writeln!(file, "{}", std::process::id());
    Ok(Some(file))
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
