// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The document backend seam.
//!
//! Backends speak in whole records, structured queries, and field patches;
//! everything domain-shaped (retry, field mapping, tag uniqueness) lives in
//! [`crate::store::RecordStore`].

use async_trait::async_trait;
use igw_core::{ImageRecord, MetricsRecord, RecordId, RecordStatus};
use thiserror::Error;

/// Errors from backend operations
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transient connection loss; the store retries these.
    #[error("store connection lost: {0}")]
    Transient(String),
    #[error("store operation failed: {0}")]
    Fatal(String),
}

/// Status constraint on a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    Any,
    Is(RecordStatus),
    /// Everything still in flight (status ≠ READY).
    NotReady,
}

impl StatusFilter {
    pub fn matches(self, status: RecordStatus) -> bool {
        match self {
            StatusFilter::Any => true,
            StatusFilter::Is(want) => status == want,
            StatusFilter::NotReady => status != RecordStatus::Ready,
        }
    }
}

/// A structured record query; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub id: Option<RecordId>,
    pub platform: Option<String>,
    pub image_type: Option<String>,
    pub pulltag: Option<String>,
    /// Membership in the record's tagset.
    pub tag: Option<String>,
    pub content_id: Option<String>,
    pub status: StatusFilter,
}

impl RecordQuery {
    pub fn by_id(id: &RecordId) -> Self {
        Self {
            id: Some(id.clone()),
            ..Self::default()
        }
    }

    pub fn by_tag(platform: &str, image_type: &str, tag: &str) -> Self {
        Self {
            platform: Some(platform.to_string()),
            image_type: Some(image_type.to_string()),
            tag: Some(tag.to_string()),
            ..Self::default()
        }
    }

    pub fn by_pulltag(platform: &str, image_type: &str, pulltag: &str) -> Self {
        Self {
            platform: Some(platform.to_string()),
            image_type: Some(image_type.to_string()),
            pulltag: Some(pulltag.to_string()),
            ..Self::default()
        }
    }

    pub fn by_content_id(platform: &str, content_id: &str) -> Self {
        Self {
            platform: Some(platform.to_string()),
            content_id: Some(content_id.to_string()),
            ..Self::default()
        }
    }

    pub fn by_platform(platform: &str) -> Self {
        Self {
            platform: Some(platform.to_string()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, filter: StatusFilter) -> Self {
        self.status = filter;
        self
    }

    /// Whether a record satisfies every set constraint.
    pub fn matches(&self, record: &ImageRecord) -> bool {
        if let Some(id) = &self.id {
            if record.id != *id {
                return false;
            }
        }
        if let Some(platform) = &self.platform {
            if record.platform != *platform {
                return false;
            }
        }
        if let Some(image_type) = &self.image_type {
            if record.image_type != *image_type {
                return false;
            }
        }
        if let Some(pulltag) = &self.pulltag {
            if record.pulltag != *pulltag {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !record.has_tag(tag) {
                return false;
            }
        }
        if let Some(content_id) = &self.content_id {
            if record.content_id.as_deref() != Some(content_id.as_str()) {
                return false;
            }
        }
        self.status.matches(record.status)
    }
}

/// Field-level patch; unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub status: Option<RecordStatus>,
    pub status_message: Option<String>,
    pub content_id: Option<String>,
    pub entry: Option<String>,
    pub env: Option<Vec<String>>,
    pub workdir: Option<String>,
    pub last_pull: Option<u64>,
    pub last_heartbeat: Option<u64>,
    pub expiration: Option<u64>,
    pub user_acl: Option<Vec<u32>>,
    pub group_acl: Option<Vec<u32>>,
    pub private: Option<bool>,
    /// Whole-tagset replacement.
    pub tag: Option<Vec<String>>,
}

impl RecordPatch {
    /// Apply the set fields onto a record.
    pub fn apply_to(&self, record: &mut ImageRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(message) = &self.status_message {
            record.status_message = message.clone();
        }
        if let Some(content_id) = &self.content_id {
            record.content_id = Some(content_id.clone());
        }
        if let Some(entry) = &self.entry {
            record.entry = Some(entry.clone());
        }
        if let Some(env) = &self.env {
            record.env = env.clone();
        }
        if let Some(workdir) = &self.workdir {
            record.workdir = Some(workdir.clone());
        }
        if let Some(last_pull) = self.last_pull {
            record.last_pull = Some(last_pull);
        }
        if let Some(heartbeat) = self.last_heartbeat {
            record.last_heartbeat = Some(heartbeat);
        }
        if let Some(expiration) = self.expiration {
            record.expiration = Some(expiration);
        }
        if let Some(user_acl) = &self.user_acl {
            record.user_acl = user_acl.clone();
        }
        if let Some(group_acl) = &self.group_acl {
            record.group_acl = group_acl.clone();
        }
        if let Some(private) = self.private {
            record.private = Some(private);
        }
        if let Some(tag) = &self.tag {
            record.tag = tag.clone();
        }
    }
}

/// Document-level operations every backend provides.
#[async_trait]
pub trait StoreBackend: Send + Sync + 'static {
    async fn find_one(&self, query: &RecordQuery) -> Result<Option<ImageRecord>, BackendError>;

    async fn find(&self, query: &RecordQuery) -> Result<Vec<ImageRecord>, BackendError>;

    /// Insert a record, minting and returning its id.
    async fn insert(&self, record: ImageRecord) -> Result<RecordId, BackendError>;

    /// Apply a patch; returns false when the record does not exist.
    async fn update(&self, id: &RecordId, patch: RecordPatch) -> Result<bool, BackendError>;

    /// Remove a record; returns false when the record does not exist.
    async fn remove(&self, id: &RecordId) -> Result<bool, BackendError>;

    /// Remove `tag` from every record on `platform` holding it (multi-
    /// document update). Returns the number of records touched.
    async fn pull_tag(&self, platform: &str, tag: &str) -> Result<usize, BackendError>;

    /// Append `tag` to the record's tagset if absent.
    async fn push_tag(&self, id: &RecordId, tag: &str) -> Result<bool, BackendError>;

    async fn append_metric(&self, row: MetricsRecord) -> Result<(), BackendError>;

    /// The last `limit` metrics rows, oldest first.
    async fn tail_metrics(&self, limit: usize) -> Result<Vec<MetricsRecord>, BackendError>;
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
