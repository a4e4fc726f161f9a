// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The record store CRUD surface.
//!
//! Wraps a [`StoreBackend`] with the gateway's domain semantics: bounded
//! retry on transient connection loss, worker-response field mapping,
//! platform-global tag uniqueness, and FAILURE housekeeping.

use crate::backend::{BackendError, RecordPatch, RecordQuery, StatusFilter, StoreBackend};
use crate::snapshot::SnapshotError;
use igw_core::{ImageRecord, MetricsRecord, PullResponse, RecordId, RecordStatus, StatusInfo};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors surfaced to store callers
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transient retries exhausted.
    #[error("record store unavailable")]
    Unavailable,
    #[error("record store error: {0}")]
    Backend(String),
    #[error("unsupported store scheme in {0:?} (expected mem:// or file://)")]
    UnsupportedScheme(String),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Transient failures get one more attempt after a pause.
const RETRY_ATTEMPTS: u32 = 2;
const RETRY_PAUSE: Duration = Duration::from_secs(2);

/// CRUD over image records and the metrics log.
pub struct RecordStore<B> {
    backend: Arc<B>,
    pull_update_timeout_ms: u64,
}

impl<B> Clone for RecordStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            pull_update_timeout_ms: self.pull_update_timeout_ms,
        }
    }
}

impl<B: StoreBackend> RecordStore<B> {
    pub fn new(backend: B, pull_update_timeout_ms: u64) -> Self {
        Self {
            backend: Arc::new(backend),
            pull_update_timeout_ms,
        }
    }

    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(BackendError::Transient(e)) => {
                    attempt += 1;
                    if attempt >= RETRY_ATTEMPTS {
                        warn!(error = %e, "store retries exhausted");
                        return Err(StoreError::Unavailable);
                    }
                    warn!(error = %e, "transient store error, retrying");
                    tokio::time::sleep(RETRY_PAUSE).await;
                }
                Err(BackendError::Fatal(e)) => return Err(StoreError::Backend(e)),
            }
        }
    }

    pub async fn get_by_id(&self, id: &RecordId) -> Result<Option<ImageRecord>, StoreError> {
        let query = RecordQuery::by_id(id);
        self.with_retry(|| self.backend.find_one(&query)).await
    }

    /// The READY record serving `tag`, if any.
    pub async fn get_by_tag(
        &self,
        platform: &str,
        image_type: &str,
        tag: &str,
    ) -> Result<Option<ImageRecord>, StoreError> {
        let query = RecordQuery::by_tag(platform, image_type, tag)
            .with_status(StatusFilter::Is(RecordStatus::Ready));
        self.with_retry(|| self.backend.find_one(&query)).await
    }

    /// A record holding this content id on the platform.
    pub async fn get_by_content_id(
        &self,
        platform: &str,
        content_id: &str,
        ready_only: bool,
    ) -> Result<Option<ImageRecord>, StoreError> {
        let mut query = RecordQuery::by_content_id(platform, content_id);
        if ready_only {
            query = query.with_status(StatusFilter::Is(RecordStatus::Ready));
        }
        self.with_retry(|| self.backend.find_one(&query)).await
    }

    /// Every record created for this pulltag, in insertion order.
    pub async fn find_by_pulltag(
        &self,
        platform: &str,
        image_type: &str,
        pulltag: &str,
    ) -> Result<Vec<ImageRecord>, StoreError> {
        let query = RecordQuery::by_pulltag(platform, image_type, pulltag);
        self.with_retry(|| self.backend.find(&query)).await
    }

    pub async fn list_by_platform(
        &self,
        platform: &str,
        filter: StatusFilter,
    ) -> Result<Vec<ImageRecord>, StoreError> {
        let query = RecordQuery::by_platform(platform).with_status(filter);
        self.with_retry(|| self.backend.find(&query)).await
    }

    /// Insert a pull record, clearing out any stale non-READY attempt for
    /// the same pulltag first.
    pub async fn insert(&self, record: ImageRecord) -> Result<RecordId, StoreError> {
        let stale = self
            .find_by_pulltag(&record.platform, &record.image_type, &record.pulltag)
            .await?;
        for old in stale.iter().filter(|r| r.status != RecordStatus::Ready) {
            self.with_retry(|| self.backend.remove(&old.id)).await?;
        }
        self.with_retry(|| self.backend.insert(record.clone())).await
    }

    pub async fn remove(&self, id: &RecordId) -> Result<bool, StoreError> {
        self.with_retry(|| self.backend.remove(id)).await
    }

    /// Set the record's status, clearing the status message unless the
    /// update carries one; heartbeat timestamps ride along.
    pub async fn update_state(
        &self,
        id: &RecordId,
        status: RecordStatus,
        info: Option<&StatusInfo>,
    ) -> Result<bool, StoreError> {
        let mut patch = RecordPatch {
            status: Some(status),
            status_message: Some(String::new()),
            ..RecordPatch::default()
        };
        if let Some(info) = info {
            if let Some(heartbeat) = info.heartbeat {
                patch.last_heartbeat = Some(heartbeat);
            }
            if let Some(message) = &info.message {
                patch.status_message = Some(message.clone());
            }
        }
        self.with_retry(|| self.backend.update(id, patch.clone()))
            .await
    }

    /// Write a worker response onto a record, translating the external
    /// field names onto record fields.
    ///
    /// A `meta_only` response leaves the runtime metadata untouched (only
    /// its ACL/privacy fields are authoritative). `private == false`
    /// forces both ACLs empty regardless of what the response lists.
    pub async fn apply_response(
        &self,
        id: &RecordId,
        response: &PullResponse,
        last_pull: Option<u64>,
        mark_ready: bool,
    ) -> Result<bool, StoreError> {
        let mut patch = RecordPatch {
            content_id: Some(response.id.clone()),
            user_acl: Some(response.user_acl.clone()),
            group_acl: Some(response.group_acl.clone()),
            private: response.private,
            last_pull,
            ..RecordPatch::default()
        };
        if !response.meta_only {
            patch.entry = response.entrypoint.clone();
            patch.env = Some(response.env.clone());
            patch.workdir = response.workdir.clone();
        }
        if mark_ready {
            patch.status = Some(RecordStatus::Ready);
        }
        if response.private == Some(false) {
            patch.user_acl = Some(Vec::new());
            patch.group_acl = Some(Vec::new());
        }
        self.with_retry(|| self.backend.update(id, patch.clone()))
            .await
    }

    /// Rewrite only the ACL/privacy fields from a metadata refresh.
    pub async fn apply_acls(
        &self,
        id: &RecordId,
        response: &PullResponse,
        last_pull: u64,
    ) -> Result<bool, StoreError> {
        let mut patch = RecordPatch {
            user_acl: Some(response.user_acl.clone()),
            group_acl: Some(response.group_acl.clone()),
            private: response.private,
            last_pull: Some(last_pull),
            ..RecordPatch::default()
        };
        if response.private == Some(false) {
            patch.user_acl = Some(Vec::new());
            patch.group_acl = Some(Vec::new());
        }
        self.with_retry(|| self.backend.update(id, patch.clone()))
            .await
    }

    pub async fn set_last_pull(&self, id: &RecordId, time_ms: u64) -> Result<bool, StoreError> {
        let patch = RecordPatch {
            last_pull: Some(time_ms),
            ..RecordPatch::default()
        };
        self.with_retry(|| self.backend.update(id, patch.clone()))
            .await
    }

    pub async fn set_expiration(&self, id: &RecordId, time_ms: u64) -> Result<bool, StoreError> {
        let patch = RecordPatch {
            expiration: Some(time_ms),
            ..RecordPatch::default()
        };
        self.with_retry(|| self.backend.update(id, patch.clone()))
            .await
    }

    /// Attach `tag` to a record, first detaching it from every other
    /// record on the platform so `(platform, tag)` stays globally unique.
    ///
    /// There is a narrow window between the two steps where no record
    /// holds the tag; readers tolerate it and retry on their next request.
    pub async fn add_tag(
        &self,
        id: &RecordId,
        platform: &str,
        tag: &str,
    ) -> Result<bool, StoreError> {
        self.remove_tag(platform, tag).await?;
        self.with_retry(|| self.backend.push_tag(id, tag)).await
    }

    /// Detach `tag` from every record on the platform holding it.
    pub async fn remove_tag(&self, platform: &str, tag: &str) -> Result<usize, StoreError> {
        self.with_retry(|| self.backend.pull_tag(platform, tag))
            .await
    }

    pub async fn get_state(&self, id: &RecordId) -> Result<Option<RecordStatus>, StoreError> {
        Ok(self.get_by_id(id).await?.map(|r| r.status))
    }

    /// Housekeeping: drop FAILURE records whose retry window has passed.
    ///
    /// Called before each lookup/pull/list/expire to bound the age of
    /// failure rows.
    pub async fn update_states(&self, now_ms: u64) -> Result<(), StoreError> {
        let query = RecordQuery {
            status: StatusFilter::Is(RecordStatus::Failure),
            ..RecordQuery::default()
        };
        let failures = self.with_retry(|| self.backend.find(&query)).await?;
        for record in failures {
            let Some(last_pull) = record.last_pull else {
                continue;
            };
            if now_ms > last_pull + self.pull_update_timeout_ms {
                self.with_retry(|| self.backend.remove(&record.id)).await?;
            }
        }
        Ok(())
    }

    pub async fn add_metric(&self, row: MetricsRecord) -> Result<(), StoreError> {
        self.with_retry(|| self.backend.append_metric(row.clone()))
            .await
    }

    pub async fn tail_metrics(&self, limit: usize) -> Result<Vec<MetricsRecord>, StoreError> {
        self.with_retry(|| self.backend.tail_metrics(limit)).await
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
