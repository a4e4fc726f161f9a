// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The status reconciler: single consumer of the worker status queue.
//!
//! Every worker event lands here and is folded into the record store.
//! Errors are logged and the loop moves on; a bad event must never take
//! the consumer down. The only shared state with request handlers is the
//! store itself.

use igw_core::{Clock, PullResponse, RecordId, StatusMessage, StatusUpdate, WorkerState};
use igw_store::{RecordStore, StoreBackend, StoreError};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Long-running consumer task for worker status events.
pub struct StatusReconciler<B, C> {
    store: RecordStore<B>,
    clock: C,
    status_rx: mpsc::Receiver<StatusMessage>,
}

impl<B, C> StatusReconciler<B, C>
where
    B: StoreBackend,
    C: Clock,
{
    pub fn new(store: RecordStore<B>, clock: C, status_rx: mpsc::Receiver<StatusMessage>) -> Self {
        Self {
            store,
            clock,
            status_rx,
        }
    }

    /// Consume events until the queue closes or the stop sentinel arrives.
    pub async fn run(mut self) {
        info!("status reconciler started");
        while let Some(message) = self.status_rx.recv().await {
            match message {
                StatusMessage::Stop => {
                    info!("shutting down status reconciler");
                    break;
                }
                StatusMessage::Update(update) => {
                    if let Err(e) = self.apply(&update).await {
                        warn!(id = %update.id, error = %e, "failed to apply status update");
                    }
                }
            }
        }
    }

    async fn apply(&self, update: &StatusUpdate) -> Result<(), StoreError> {
        if update.state == WorkerState::Failure {
            warn!(id = %update.id, "operation failed");
        }

        if update.state.is_ready() {
            let Some(response) = &update.meta.response else {
                warn!(id = %update.id, "READY update without a response, ignoring");
                return Ok(());
            };
            if response.meta_only {
                debug!(id = %update.id, "updating ACLs");
                return self.refresh_acls(&update.id, response).await;
            }
            return self.complete_pull(&update.id, response).await;
        }

        self.store
            .update_state(&update.id, update.state.record_status(), Some(&update.meta))
            .await?;
        Ok(())
    }

    /// Rewrite ACL/privacy metadata onto the live READY record and drop
    /// the pull record that carried the refresh.
    async fn refresh_acls(
        &self,
        id: &RecordId,
        response: &PullResponse,
    ) -> Result<(), StoreError> {
        let Some(pull_record) = self.store.get_by_id(id).await? else {
            error!(id = %id, "pull record missing for ACL update");
            return Ok(());
        };
        let now = self.clock.epoch_ms();

        match self
            .store
            .get_by_content_id(&pull_record.platform, &response.id, true)
            .await?
        {
            Some(live) => {
                self.store.apply_acls(&live.id, response, now).await?;
                self.store.remove(id).await?;
            }
            None => {
                // The content was known to the worker but we hold no READY
                // record for it. Keep the pull record as the carrier.
                warn!(id = %id, "no image record found for an ACL update");
                self.store.apply_response(id, response, Some(now), false).await?;
                self.store
                    .add_tag(id, &pull_record.platform, &pull_record.pulltag)
                    .await?;
            }
        }
        Ok(())
    }

    /// Transition a completed pull into an available image, deduplicating
    /// against a READY record that already serves the same content.
    async fn complete_pull(
        &self,
        id: &RecordId,
        response: &PullResponse,
    ) -> Result<(), StoreError> {
        let Some(pull_record) = self.store.get_by_id(id).await? else {
            warn!(id = %id, "pull record missing for completion");
            return Ok(());
        };
        let now = self.clock.epoch_ms();

        match self
            .store
            .get_by_content_id(&pull_record.platform, &response.id, true)
            .await?
        {
            Some(existing) => {
                // Same content arrived under another pulltag: keep the
                // serving record, refresh it, and maybe attach the new tag.
                debug!(id = %id, content_id = %response.id, "duplicate image");
                self.store.set_last_pull(&existing.id, now).await?;
                self.store.remove(id).await?;
                if !existing.has_tag(&response.tag) {
                    self.store
                        .add_tag(&existing.id, &pull_record.platform, &pull_record.pulltag)
                        .await?;
                }
            }
            None => {
                self.store.apply_response(id, response, Some(now), true).await?;
                self.store
                    .add_tag(id, &pull_record.platform, &pull_record.pulltag)
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod tests;
