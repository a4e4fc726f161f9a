// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker pool: accepts pull/expire jobs, runs them as tasks, and
//! emits status events.
//!
//! Repeated `enqueue_pull` calls for a record already in flight are
//! deduplicated here, so the manager can dispatch without worrying about
//! double-queued work.

use crate::fetcher::{FetchError, ImageFetcher};
use async_trait::async_trait;
use igw_core::{
    Clock, ImageRecord, PullJob, PullResponse, RecordId, StatusInfo, StatusMessage, StatusUpdate,
    SystemClock, TestMode, WorkerState,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Errors from job dispatch
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("worker status queue closed")]
    QueueClosed,
}

/// Accepts long-running jobs on behalf of the manager.
#[async_trait]
pub trait WorkerPool: Send + Sync + 'static {
    /// Schedule a pull for the record. Idempotent per record id while the
    /// pull is in flight.
    async fn enqueue_pull(&self, id: RecordId, job: PullJob) -> Result<(), DispatchError>;

    /// Schedule reclamation of the record's on-disk artifacts.
    async fn enqueue_expire(&self, id: RecordId, record: ImageRecord) -> Result<(), DispatchError>;
}

/// Depth of the status queue between workers and the reconciler.
const STATUS_QUEUE_DEPTH: usize = 256;

/// Task-per-job worker pool emitting to a single-consumer status queue.
pub struct PullWorkers<F, C = SystemClock> {
    fetcher: Arc<F>,
    status_tx: mpsc::Sender<StatusMessage>,
    inflight: Arc<Mutex<HashSet<RecordId>>>,
    clock: C,
}

impl<F, C: Clone> Clone for PullWorkers<F, C> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            status_tx: self.status_tx.clone(),
            inflight: Arc::clone(&self.inflight),
            clock: self.clock.clone(),
        }
    }
}

impl<F: ImageFetcher> PullWorkers<F, SystemClock> {
    /// Create a pool and the receiving end of its status queue.
    pub fn new(fetcher: F) -> (Self, mpsc::Receiver<StatusMessage>) {
        Self::with_clock(fetcher, SystemClock)
    }
}

impl<F: ImageFetcher, C: Clock> PullWorkers<F, C> {
    pub fn with_clock(fetcher: F, clock: C) -> (Self, mpsc::Receiver<StatusMessage>) {
        let (status_tx, status_rx) = mpsc::channel(STATUS_QUEUE_DEPTH);
        (
            Self {
                fetcher: Arc::new(fetcher),
                status_tx,
                inflight: Arc::new(Mutex::new(HashSet::new())),
                clock,
            },
            status_rx,
        )
    }

    /// A handle for injecting messages into the status queue (the manager
    /// uses this to send the shutdown sentinel).
    pub fn status_sender(&self) -> mpsc::Sender<StatusMessage> {
        self.status_tx.clone()
    }

    fn heartbeat(&self) -> StatusInfo {
        StatusInfo {
            response: None,
            heartbeat: Some(self.clock.epoch_ms()),
            message: None,
        }
    }

    async fn emit(
        tx: &mpsc::Sender<StatusMessage>,
        id: &RecordId,
        state: WorkerState,
        meta: StatusInfo,
    ) {
        let update = StatusUpdate {
            id: id.clone(),
            state,
            meta,
        };
        if tx.send(StatusMessage::Update(update)).await.is_err() {
            warn!(id = %id, "status queue closed, dropping worker update");
        }
    }

    async fn run_pull(self, id: RecordId, job: PullJob) {
        Self::emit(&self.status_tx, &id, WorkerState::Pulling, self.heartbeat()).await;

        let outcome = match job.test_mode {
            TestMode::Success => Ok(canned_response(&job)),
            TestMode::Failure => Err(FetchError::Pull("test mode failure".to_string())),
            TestMode::Off => self.fetcher.pull(&job).await,
        };

        match outcome {
            Ok(mut response) => {
                if response.tag.is_empty() {
                    response.tag = job.pulltag.clone();
                }
                Self::emit(
                    &self.status_tx,
                    &id,
                    WorkerState::Transfer,
                    self.heartbeat(),
                )
                .await;
                let mut meta = self.heartbeat();
                meta.response = Some(response);
                Self::emit(&self.status_tx, &id, WorkerState::Ready, meta).await;
                info!(id = %id, pulltag = %job.pulltag, "pull complete");
            }
            Err(e) => {
                let mut meta = self.heartbeat();
                meta.message = Some(e.to_string());
                Self::emit(&self.status_tx, &id, WorkerState::Failure, meta).await;
                warn!(id = %id, pulltag = %job.pulltag, error = %e, "pull failed");
            }
        }

        self.inflight.lock().remove(&id);
    }

    async fn run_expire(self, id: RecordId, record: ImageRecord) {
        match self.fetcher.expire(&record).await {
            Ok(()) => {
                Self::emit(&self.status_tx, &id, WorkerState::Expired, self.heartbeat()).await;
                info!(id = %id, platform = %record.platform, "expire complete");
            }
            Err(e) => {
                let mut meta = self.heartbeat();
                meta.message = Some(e.to_string());
                Self::emit(&self.status_tx, &id, WorkerState::Failure, meta).await;
                warn!(id = %id, error = %e, "expire failed");
            }
        }
    }
}

#[async_trait]
impl<F: ImageFetcher, C: Clock> WorkerPool for PullWorkers<F, C> {
    async fn enqueue_pull(&self, id: RecordId, job: PullJob) -> Result<(), DispatchError> {
        if self.status_tx.is_closed() {
            return Err(DispatchError::QueueClosed);
        }
        {
            let mut inflight = self.inflight.lock();
            if !inflight.insert(id.clone()) {
                debug!(id = %id, "pull already in flight, not re-queuing");
                return Ok(());
            }
        }
        let worker = self.clone();
        tokio::spawn(worker.run_pull(id, job));
        Ok(())
    }

    async fn enqueue_expire(&self, id: RecordId, record: ImageRecord) -> Result<(), DispatchError> {
        if self.status_tx.is_closed() {
            return Err(DispatchError::QueueClosed);
        }
        let worker = self.clone();
        tokio::spawn(worker.run_expire(id, record));
        Ok(())
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake_pool {
    use super::*;

    #[derive(Default)]
    struct FakePoolState {
        pulls: Vec<(RecordId, PullJob)>,
        expires: Vec<(RecordId, ImageRecord)>,
        fail_dispatch: bool,
    }

    /// Worker pool that records dispatched jobs without running them.
    ///
    /// Records dispatched through it stay in whatever state the manager
    /// left them, which is exactly what piggyback/queue tests need.
    #[derive(Clone, Default)]
    pub struct FakePool {
        state: Arc<Mutex<FakePoolState>>,
    }

    impl FakePool {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every enqueue fail with a dispatch error.
        pub fn fail_dispatch(&self) {
            self.state.lock().fail_dispatch = true;
        }

        pub fn pulls(&self) -> Vec<(RecordId, PullJob)> {
            self.state.lock().pulls.clone()
        }

        pub fn expires(&self) -> Vec<(RecordId, ImageRecord)> {
            self.state.lock().expires.clone()
        }
    }

    #[async_trait]
    impl WorkerPool for FakePool {
        async fn enqueue_pull(&self, id: RecordId, job: PullJob) -> Result<(), DispatchError> {
            let mut state = self.state.lock();
            if state.fail_dispatch {
                return Err(DispatchError::QueueClosed);
            }
            state.pulls.push((id, job));
            Ok(())
        }

        async fn enqueue_expire(
            &self,
            id: RecordId,
            record: ImageRecord,
        ) -> Result<(), DispatchError> {
            let mut state = self.state.lock();
            if state.fail_dispatch {
                return Err(DispatchError::QueueClosed);
            }
            state.expires.push((id, record));
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake_pool::FakePool;

/// The response a test-mode pull reports without touching any remote.
fn canned_response(job: &PullJob) -> PullResponse {
    PullResponse {
        id: format!("sha256:{}", job.pulltag.replace([':', '/'], "-")),
        tag: job.pulltag.clone(),
        entrypoint: Some("./run".to_string()),
        env: vec!["FOO=bar".to_string(), "PATH=/usr/bin".to_string()],
        workdir: Some("/root".to_string()),
        user_acl: job.user_acl.clone(),
        group_acl: job.group_acl.clone(),
        private: Some(!job.user_acl.is_empty() || !job.group_acl.is_empty()),
        meta_only: false,
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
