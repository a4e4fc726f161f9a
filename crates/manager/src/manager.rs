// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The manager: public operations over the record store and worker pool.
//!
//! Holds configuration and collaborator handles only; every piece of
//! mutable state lives in the record store, so concurrent request handlers
//! coordinate purely through it.

use crate::auth::Authenticator;
use crate::error::ManagerError;
use igw_core::acl;
use igw_core::decision::{decide, PullAction};
use igw_core::{
    Clock, Config, ImageQuery, ImageRecord, MetricsRecord, PullJob, PullRequest, RecordId,
    RecordStatus, Session, StatusMessage, TestMode,
};
use igw_store::{RecordStore, StatusFilter, StoreBackend};
use igw_workers::WorkerPool;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One entry of the pending-work listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    /// The pulltag the attempt was created for.
    pub image: String,
    pub status: RecordStatus,
}

/// The image lifecycle manager.
///
/// Generic over the store backend, worker pool, authenticator, and clock
/// so tests can drive every collaborator deterministically.
pub struct Manager<B, W, A, C> {
    config: Arc<Config>,
    store: RecordStore<B>,
    workers: W,
    auth: A,
    clock: C,
    /// Per-process sentinel embedded in sessions; a session built by a
    /// client rather than `new_session` will not carry it.
    magic: String,
    status_tx: mpsc::Sender<StatusMessage>,
    expiration_timeout_ms: u64,
}

impl<B, W, A, C> Manager<B, W, A, C>
where
    B: StoreBackend,
    W: WorkerPool,
    A: Authenticator,
    C: Clock,
{
    pub fn new(
        config: Arc<Config>,
        store: RecordStore<B>,
        workers: W,
        auth: A,
        clock: C,
        status_tx: mpsc::Sender<StatusMessage>,
    ) -> Result<Self, ManagerError> {
        let expiration_timeout_ms = config.expiration_timeout_ms()?;
        Ok(Self {
            config,
            store,
            workers,
            auth,
            clock,
            magic: uuid::Uuid::new_v4().to_string(),
            status_tx,
            expiration_timeout_ms,
        })
    }

    /// Authenticate and mint a session bound to `platform`.
    pub async fn new_session(
        &self,
        token: &str,
        platform: &str,
    ) -> Result<Session, ManagerError> {
        if !self.config.is_platform(platform) {
            return Err(ManagerError::InvalidPlatform(platform.to_string()));
        }
        let principal = self.auth.authenticate(token, platform).await?;
        Ok(Session {
            user: principal.user,
            uid: principal.uid,
            gid: principal.gid,
            platform: platform.to_string(),
            magic: self.magic.clone(),
        })
    }

    /// Reject forged sessions and platform mismatches.
    fn check_session(&self, session: &Session, platform: &str) -> Result<(), ManagerError> {
        if session.magic != self.magic {
            warn!("request received with bad session magic");
            return Err(ManagerError::InvalidSession);
        }
        if !session.is_for(platform) {
            warn!(
                session_platform = %session.platform,
                requested = %platform,
                "request received for a different platform"
            );
            return Err(ManagerError::InvalidSession);
        }
        Ok(())
    }

    fn is_admin(&self, session: &Session, platform: &str) -> bool {
        let Some(platform_config) = self.config.platform(platform) else {
            return false;
        };
        let admin = platform_config.admins.contains(&session.uid);
        if admin {
            info!(user = %session.user, platform = %platform, "admin operation");
        }
        admin
    }

    /// Lookup the READY record serving a tag.
    ///
    /// A hit refreshes the record's expiration and logs a metrics row
    /// (best-effort). An unreadable record looks like a miss.
    pub async fn lookup(
        &self,
        session: &Session,
        query: &ImageQuery,
    ) -> Result<Option<ImageRecord>, ManagerError> {
        self.check_session(session, &query.platform)?;
        let now = self.clock.epoch_ms();
        self.store.update_states(now).await?;

        let Some(record) = self
            .store
            .get_by_tag(&query.platform, &query.image_type, &query.tag)
            .await?
        else {
            return Ok(None);
        };
        if !acl::check_read(session, &record) {
            debug!(uid = session.uid, tag = %query.tag, "read denied by ACL");
            return Ok(None);
        }

        self.store
            .set_expiration(&record.id, now + self.expiration_timeout_ms)
            .await?;

        if self.config.metrics {
            let row = MetricsRecord {
                user: session.user.clone(),
                uid: session.uid,
                platform: query.platform.clone(),
                image_type: query.image_type.clone(),
                tag: query.tag.clone(),
                record_id: record.id.clone(),
                time: now,
            };
            if let Err(e) = self.store.add_metric(row).await {
                warn!(error = %e, "failed to log lookup");
            }
        }
        Ok(Some(record))
    }

    /// All READY records on the platform the session can read.
    pub async fn imglist(
        &self,
        session: &Session,
        platform: &str,
    ) -> Result<Vec<ImageRecord>, ManagerError> {
        self.check_session(session, platform)?;
        if !self.config.is_platform(platform) {
            return Err(ManagerError::InvalidPlatform(platform.to_string()));
        }
        self.store.update_states(self.clock.epoch_ms()).await?;

        let records = self
            .store
            .list_by_platform(platform, StatusFilter::Is(RecordStatus::Ready))
            .await?;
        Ok(records
            .into_iter()
            .filter(|r| acl::check_read(session, r))
            .collect())
    }

    /// Pending work on the platform: pulltag and status of every
    /// non-READY record.
    pub async fn show_queue(
        &self,
        session: &Session,
        platform: &str,
    ) -> Result<Vec<QueueEntry>, ManagerError> {
        self.check_session(session, platform)?;
        self.store.update_states(self.clock.epoch_ms()).await?;

        let records = self
            .store
            .list_by_platform(platform, StatusFilter::NotReady)
            .await?;
        Ok(records
            .into_iter()
            .map(|r| QueueEntry {
                image: r.pulltag,
                status: r.status,
            })
            .collect())
    }

    /// Request a pull, returning immediately with the governing record.
    ///
    /// Depending on the stored state this serves the cached READY record,
    /// piggybacks on an in-flight attempt, or creates and dispatches a new
    /// pull record. Callers observe progress by polling `lookup` or
    /// `get_state`.
    pub async fn pull(
        &self,
        session: &Session,
        request: &PullRequest,
        test_mode: TestMode,
    ) -> Result<ImageRecord, ManagerError> {
        self.check_session(session, &request.platform)?;
        let now = self.clock.epoch_ms();
        self.store.update_states(now).await?;

        // Candidate: the READY record for the tag, unless an attempt is
        // still in flight for the same pulltag; the in-flight one wins.
        let mut candidate = self
            .store
            .get_by_tag(&request.platform, &request.image_type, &request.tag)
            .await?;
        for record in self
            .store
            .find_by_pulltag(&request.platform, &request.image_type, &request.tag)
            .await?
        {
            if record.status != RecordStatus::Ready {
                candidate = Some(record);
                break;
            }
        }

        let user_acl = acl::with_caller(&request.user_acl, session.uid);
        let group_acl = acl::with_caller(&request.group_acl, session.gid);

        let action = decide(
            candidate.as_ref(),
            &user_acl,
            &group_acl,
            now,
            self.config.pull_update_timeout_ms(),
        );
        if action != PullAction::EnqueueNew {
            if let Some(existing) = candidate {
                debug!(tag = %request.tag, action = ?action, "returning existing record");
                return Ok(existing);
            }
        }

        let request = PullRequest {
            user_acl: user_acl.clone(),
            group_acl: group_acl.clone(),
            ..request.clone()
        };
        let mut record =
            ImageRecord::new_pull(&request, self.config.default_image_format.as_deref());
        let id = self.store.insert(record.clone()).await?;
        self.store
            .update_state(&id, RecordStatus::Enqueued, None)
            .await?;

        let job = PullJob {
            platform: request.platform.clone(),
            image_type: request.image_type.clone(),
            pulltag: request.tag.clone(),
            user_acl,
            group_acl,
            session: session.clone(),
            test_mode,
        };
        self.workers.enqueue_pull(id.clone(), job).await?;
        info!(platform = %request.platform, tag = %request.tag, "pull request queued");

        self.store.set_last_pull(&id, now).await?;

        record.id = id;
        record.status = RecordStatus::Enqueued;
        record.last_pull = Some(now);
        Ok(record)
    }

    /// Dispatch reclamation of a READY image. Admin-only; non-admin calls
    /// return false and mutate nothing.
    pub async fn expire(
        &self,
        session: &Session,
        query: &ImageQuery,
    ) -> Result<bool, ManagerError> {
        self.check_session(session, &query.platform)?;
        if !self.is_admin(session, &query.platform) {
            return Ok(false);
        }

        let Some(record) = self
            .store
            .get_by_tag(&query.platform, &query.image_type, &query.tag)
            .await?
        else {
            debug!(tag = %query.tag, "expire: no READY record for tag");
            return Ok(false);
        };

        let id = record.id.clone();
        self.workers.enqueue_expire(id, record).await?;
        info!(platform = %query.platform, tag = %query.tag, "expire request queued");
        Ok(true)
    }

    /// Garbage-collect stuck pulls and dispatch expiry for aged READY
    /// images. Admin-only; returns the expired content ids, or `None` for
    /// non-admins.
    pub async fn autoexpire(
        &self,
        session: &Session,
        platform: &str,
    ) -> Result<Option<Vec<String>>, ManagerError> {
        self.check_session(session, platform)?;
        if !self.is_admin(session, platform) {
            return Ok(None);
        }
        let now = self.clock.epoch_ms();
        self.store.update_states(now).await?;

        // Pulls stuck in a non-READY state past the pull timeout
        for record in self
            .store
            .list_by_platform(platform, StatusFilter::NotReady)
            .await?
        {
            let Some(last_pull) = record.last_pull else {
                warn!(pulltag = %record.pulltag, "record missing last_pull, skipping");
                continue;
            };
            if now > last_pull + self.config.pull_timeout_ms() {
                info!(pulltag = %record.pulltag, "removing stuck pull");
                self.store.remove(&record.id).await?;
            }
        }

        // READY images nobody has looked up lately
        let mut expired = Vec::new();
        for record in self
            .store
            .list_by_platform(platform, StatusFilter::Is(RecordStatus::Ready))
            .await?
        {
            let Some(expiration) = record.expiration else {
                continue;
            };
            if expiration < now {
                let content_id = record
                    .content_id
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string());
                debug!(content_id = %content_id, "expiring");
                let id = record.id.clone();
                self.workers.enqueue_expire(id, record).await?;
                expired.push(content_id);
            }
        }
        Ok(Some(expired))
    }

    /// Current status of a record, post-housekeeping.
    pub async fn get_state(&self, id: &RecordId) -> Result<Option<RecordStatus>, ManagerError> {
        self.store.update_states(self.clock.epoch_ms()).await?;
        Ok(self.store.get_state(id).await?)
    }

    /// The last `limit` lookup metrics rows. Admin-only; non-admins get an
    /// empty list.
    pub async fn get_metrics(
        &self,
        session: &Session,
        platform: &str,
        limit: usize,
    ) -> Result<Vec<MetricsRecord>, ManagerError> {
        self.check_session(session, platform)?;
        if !self.is_admin(session, platform) || !self.config.metrics {
            return Ok(Vec::new());
        }
        Ok(self.store.tail_metrics(limit).await?)
    }

    /// Ask the status reconciler to exit after the current event.
    pub async fn shutdown(&self) {
        if self.status_tx.send(StatusMessage::Stop).await.is_err() {
            debug!("status queue already closed");
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
