// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process backend: insertion-ordered record map behind a mutex.
//!
//! This is the authoritative store for a single gateway instance. The
//! `file://` connection flavor snapshots it to disk (see
//! [`crate::connect`]); `mem://` is ephemeral.

use crate::backend::{BackendError, RecordPatch, RecordQuery, StoreBackend};
use crate::snapshot::StoreContents;
use async_trait::async_trait;
use igw_core::{IdGen, ImageRecord, MetricsRecord, RecordId, UuidIdGen};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

struct Inner {
    records: IndexMap<String, ImageRecord>,
    metrics: Vec<MetricsRecord>,
}

/// Thread-shared in-memory backend.
#[derive(Clone)]
pub struct MemoryBackend<G: IdGen = UuidIdGen> {
    inner: Arc<Mutex<Inner>>,
    ids: G,
}

impl MemoryBackend<UuidIdGen> {
    pub fn new() -> Self {
        Self::with_idgen(UuidIdGen)
    }
}

impl Default for MemoryBackend<UuidIdGen> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: IdGen> MemoryBackend<G> {
    pub fn with_idgen(ids: G) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                records: IndexMap::new(),
                metrics: Vec::new(),
            })),
            ids,
        }
    }

    /// Everything currently held, for snapshotting.
    pub fn export(&self) -> StoreContents {
        let inner = self.inner.lock();
        StoreContents {
            records: inner.records.values().cloned().collect(),
            metrics: inner.metrics.clone(),
        }
    }

    /// Replace the held state, for snapshot restore.
    pub fn import(&self, contents: StoreContents) {
        let mut inner = self.inner.lock();
        inner.records = contents
            .records
            .into_iter()
            .map(|r| (r.id.as_str().to_string(), r))
            .collect();
        inner.metrics = contents.metrics;
    }
}

#[async_trait]
impl<G: IdGen + 'static> StoreBackend for MemoryBackend<G> {
    async fn find_one(&self, query: &RecordQuery) -> Result<Option<ImageRecord>, BackendError> {
        let inner = self.inner.lock();
        Ok(inner.records.values().find(|r| query.matches(r)).cloned())
    }

    async fn find(&self, query: &RecordQuery) -> Result<Vec<ImageRecord>, BackendError> {
        let inner = self.inner.lock();
        Ok(inner
            .records
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect())
    }

    async fn insert(&self, mut record: ImageRecord) -> Result<RecordId, BackendError> {
        let id = RecordId::new(self.ids.next());
        record.id = id.clone();
        let mut inner = self.inner.lock();
        inner.records.insert(id.as_str().to_string(), record);
        Ok(id)
    }

    async fn update(&self, id: &RecordId, patch: RecordPatch) -> Result<bool, BackendError> {
        let mut inner = self.inner.lock();
        match inner.records.get_mut(id.as_str()) {
            Some(record) => {
                patch.apply_to(record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, id: &RecordId) -> Result<bool, BackendError> {
        let mut inner = self.inner.lock();
        Ok(inner.records.shift_remove(id.as_str()).is_some())
    }

    async fn pull_tag(&self, platform: &str, tag: &str) -> Result<usize, BackendError> {
        let mut inner = self.inner.lock();
        let mut touched = 0;
        for record in inner.records.values_mut() {
            if record.platform == platform && record.has_tag(tag) {
                record.tag.retain(|t| t != tag);
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn push_tag(&self, id: &RecordId, tag: &str) -> Result<bool, BackendError> {
        let mut inner = self.inner.lock();
        match inner.records.get_mut(id.as_str()) {
            Some(record) => {
                if !record.has_tag(tag) {
                    record.tag.push(tag.to_string());
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn append_metric(&self, row: MetricsRecord) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        inner.metrics.push(row);
        Ok(())
    }

    async fn tail_metrics(&self, limit: usize) -> Result<Vec<MetricsRecord>, BackendError> {
        let inner = self.inner.lock();
        let skip = inner.metrics.len().saturating_sub(limit);
        Ok(inner.metrics[skip..].to_vec())
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod flaky {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Backend wrapper that fails the next N operations with a transient
    /// error, for exercising the store's retry policy.
    #[derive(Clone)]
    pub struct FlakyBackend<B> {
        backend: B,
        failures: Arc<AtomicU32>,
    }

    impl<B> FlakyBackend<B> {
        pub fn new(backend: B) -> Self {
            Self {
                backend,
                failures: Arc::new(AtomicU32::new(0)),
            }
        }

        /// Make the next `n` operations fail with a transient error.
        pub fn fail_next(&self, n: u32) {
            self.failures.store(n, Ordering::SeqCst);
        }

        fn trip(&self) -> Result<(), BackendError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(BackendError::Transient("connection reset".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl<B: StoreBackend> StoreBackend for FlakyBackend<B> {
        async fn find_one(
            &self,
            query: &RecordQuery,
        ) -> Result<Option<ImageRecord>, BackendError> {
            self.trip()?;
            self.backend.find_one(query).await
        }

        async fn find(&self, query: &RecordQuery) -> Result<Vec<ImageRecord>, BackendError> {
            self.trip()?;
            self.backend.find(query).await
        }

        async fn insert(&self, record: ImageRecord) -> Result<RecordId, BackendError> {
            self.trip()?;
            self.backend.insert(record).await
        }

        async fn update(&self, id: &RecordId, patch: RecordPatch) -> Result<bool, BackendError> {
            self.trip()?;
            self.backend.update(id, patch).await
        }

        async fn remove(&self, id: &RecordId) -> Result<bool, BackendError> {
            self.trip()?;
            self.backend.remove(id).await
        }

        async fn pull_tag(&self, platform: &str, tag: &str) -> Result<usize, BackendError> {
            self.trip()?;
            self.backend.pull_tag(platform, tag).await
        }

        async fn push_tag(&self, id: &RecordId, tag: &str) -> Result<bool, BackendError> {
            self.trip()?;
            self.backend.push_tag(id, tag).await
        }

        async fn append_metric(&self, row: MetricsRecord) -> Result<(), BackendError> {
            self.trip()?;
            self.backend.append_metric(row).await
        }

        async fn tail_metrics(&self, limit: usize) -> Result<Vec<MetricsRecord>, BackendError> {
            self.trip()?;
            self.backend.tail_metrics(limit).await
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use flaky::FlakyBackend;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
