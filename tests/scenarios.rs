// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios: manager + record store + worker pool +
//! reconciler assembled the way the daemon wires them, with a fake
//! fetcher and a fake clock.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use igw_core::{
    Clock, Config, FakeClock, ImageQuery, PullRequest, RecordId, RecordStatus, TestMode,
};
use igw_manager::{FakeAuthenticator, Manager, StatusReconciler};
use igw_store::{MemoryBackend, RecordStore, StatusFilter};
use igw_workers::{FakeFetcher, PullWorkers};
use tokio::task::JoinHandle;

type TestManager =
    Manager<MemoryBackend, PullWorkers<FakeFetcher, FakeClock>, FakeAuthenticator, FakeClock>;

struct Gateway {
    manager: TestManager,
    store: RecordStore<MemoryBackend>,
    fetcher: FakeFetcher,
    clock: FakeClock,
    reconciler: JoinHandle<()>,
}

fn gateway() -> Gateway {
    let config = Arc::new(Config::for_tests());
    let store = RecordStore::new(MemoryBackend::new(), config.pull_update_timeout_ms());
    let fetcher = FakeFetcher::new();
    let clock = FakeClock::new();

    let (pool, status_rx) = PullWorkers::with_clock(fetcher.clone(), clock.clone());
    let status_tx = pool.status_sender();
    let reconciler = StatusReconciler::new(store.clone(), clock.clone(), status_rx);
    let reconciler = tokio::spawn(reconciler.run());

    let manager = Manager::new(
        config,
        store.clone(),
        pool,
        FakeAuthenticator,
        clock.clone(),
        status_tx,
    )
    .unwrap();

    Gateway {
        manager,
        store,
        fetcher,
        clock,
        reconciler,
    }
}

impl Gateway {
    async fn session(&self) -> igw_core::Session {
        self.manager
            .new_session("good:user:100:100", "systema")
            .await
            .unwrap()
    }

    async fn admin(&self) -> igw_core::Session {
        self.manager
            .new_session("good:root:0:0", "systema")
            .await
            .unwrap()
    }

    async fn wait_for_state(&self, id: &RecordId, want: Option<RecordStatus>) {
        for _ in 0..1000 {
            if self.manager.get_state(id).await.unwrap() == want {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!(
            "timed out waiting for {want:?}, last state {:?}",
            self.manager.get_state(id).await.unwrap()
        );
    }

    async fn record_count(&self) -> usize {
        self.store
            .list_by_platform("systema", StatusFilter::Any)
            .await
            .unwrap()
            .len()
    }

    async fn finish(self) {
        self.manager.shutdown().await;
        self.reconciler.await.unwrap();
    }
}

fn request(tag: &str) -> PullRequest {
    PullRequest {
        platform: "systema".to_string(),
        image_type: "docker".to_string(),
        tag: tag.to_string(),
        remote_type: Some("dockerv2".to_string()),
        user_acl: Vec::new(),
        group_acl: Vec::new(),
    }
}

fn query(tag: &str) -> ImageQuery {
    ImageQuery {
        platform: "systema".to_string(),
        image_type: "docker".to_string(),
        tag: tag.to_string(),
    }
}

// Scenario: fresh pull on an empty store.
#[tokio::test]
async fn fresh_pull_completes_and_serves_metadata() {
    let gw = gateway();
    let session = gw.session().await;

    let record = gw
        .manager
        .pull(&session, &request("test"), TestMode::Success)
        .await
        .unwrap();
    assert_eq!(record.status, RecordStatus::Enqueued);

    gw.wait_for_state(&record.id, Some(RecordStatus::Ready)).await;

    let served = gw
        .manager
        .lookup(&session, &query("test"))
        .await
        .unwrap()
        .expect("READY record should be served");
    assert_eq!(served.id, record.id);
    assert!(served.entry.is_some());
    assert!(!served.env.is_empty());
    assert!(served.content_id.is_some());
    assert!(served.has_tag("test"));

    gw.finish().await;
}

// Scenario: hot re-pull of a just-pulled image.
#[tokio::test]
async fn hot_repull_returns_the_same_record() {
    let gw = gateway();
    let session = gw.session().await;

    let first = gw
        .manager
        .pull(&session, &request("test"), TestMode::Success)
        .await
        .unwrap();
    gw.wait_for_state(&first.id, Some(RecordStatus::Ready)).await;

    let second = gw
        .manager
        .pull(&session, &request("test"), TestMode::Success)
        .await
        .unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.status, RecordStatus::Ready);
    assert_eq!(gw.record_count().await, 1);

    gw.finish().await;
}

// Scenario: stale re-pull resolves to the same content and merges back
// into the serving record.
#[tokio::test]
async fn stale_repull_deduplicates_into_serving_record() {
    let gw = gateway();
    let session = gw.session().await;
    let now = gw.clock.epoch_ms();

    // A long-served image; test-mode pulls for "test" resolve to sha256:test
    let mut old = igw_core::test_support::ready_record("", "test", "sha256:test", now - 36_000_000);
    old.expiration = Some(now + 3_600_000);
    let old = gw.store.insert(old).await.unwrap();

    let fresh = gw
        .manager
        .pull(&session, &request("test"), TestMode::Success)
        .await
        .unwrap();
    assert_ne!(fresh.id, old);
    assert_eq!(fresh.status, RecordStatus::Enqueued);
    assert_eq!(gw.record_count().await, 2);

    // The completed pull carries the same content id, so the pull record
    // dissolves into the old READY record.
    gw.wait_for_state(&fresh.id, None).await;

    let serving = gw.store.get_by_id(&old).await.unwrap().unwrap();
    assert_eq!(serving.status, RecordStatus::Ready);
    assert!(serving.has_tag("test"));
    assert_eq!(serving.last_pull, Some(gw.clock.epoch_ms()));
    assert_eq!(gw.record_count().await, 1);

    gw.finish().await;
}

// Scenario: ACL update on a live image via a metadata-only refresh.
#[tokio::test]
async fn acl_update_patches_live_record() {
    let gw = gateway();
    let session = gw.session().await;
    let now = gw.clock.epoch_ms();

    let live = gw
        .store
        .insert(igw_core::test_support::ready_record(
            "",
            "test",
            "sha256:abc",
            now - 60_000,
        ))
        .await
        .unwrap();

    // The worker reports no new content, only new ACLs
    let mut response = igw_core::test_support::canned_response("sha256:abc", "test");
    response.meta_only = true;
    response.user_acl = vec![1001, 100];
    response.private = Some(true);
    gw.fetcher.respond_with(response);

    let mut req = request("test");
    req.user_acl = vec![1001];
    let refresh = gw
        .manager
        .pull(&session, &req, TestMode::Off)
        .await
        .unwrap();
    assert_eq!(refresh.status, RecordStatus::Enqueued);

    // The refresh record dissolves; the live record gains the ACLs
    gw.wait_for_state(&refresh.id, None).await;
    let patched = gw.store.get_by_id(&live).await.unwrap().unwrap();
    assert_eq!(patched.user_acl, vec![1001, 100]);
    assert_eq!(patched.private, Some(true));
    assert_eq!(gw.record_count().await, 1);

    gw.finish().await;
}

// Scenario: piggyback on an in-flight pull.
#[tokio::test]
async fn second_request_piggybacks_on_inflight_pull() {
    let gw = gateway();
    let session = gw.session().await;

    gw.fetcher.hang_next();
    let first = gw
        .manager
        .pull(&session, &request("test"), TestMode::Off)
        .await
        .unwrap();

    // Give the worker a moment to report PULLING
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }

    let mut req = request("test");
    req.user_acl = vec![1001];
    let second = gw.manager.pull(&session, &req, TestMode::Off).await.unwrap();
    assert_eq!(second.id, first.id);
    assert_ne!(second.status, RecordStatus::Ready);
    assert_eq!(gw.record_count().await, 1);
    assert_eq!(gw.fetcher.pulls().len(), 1);

    gw.finish().await;
}

// Scenario: stuck-pull garbage collection via autoexpire.
#[tokio::test]
async fn autoexpire_reclaims_stuck_pull() {
    let gw = gateway();
    let admin = gw.admin().await;
    let now = gw.clock.epoch_ms();

    let stuck = gw
        .store
        .insert(igw_core::test_support::inflight_record(
            "",
            "stuck",
            RecordStatus::Enqueued,
            now - 3_000_000,
        ))
        .await
        .unwrap();

    let expired = gw.manager.autoexpire(&admin, "systema").await.unwrap();
    assert_eq!(expired, Some(Vec::new()));
    assert!(gw.manager.get_state(&stuck).await.unwrap().is_none());

    gw.finish().await;
}

// Scenario: admin gating returns falsy and mutates nothing.
#[tokio::test]
async fn non_admin_expire_is_refused() {
    let gw = gateway();
    let session = gw.session().await;
    let now = gw.clock.epoch_ms();

    let mut record = igw_core::test_support::ready_record("", "test", "sha256:abc", now);
    record.expiration = Some(now - 1);
    gw.store.insert(record).await.unwrap();

    assert!(!gw.manager.expire(&session, &query("test")).await.unwrap());
    assert!(gw
        .manager
        .autoexpire(&session, "systema")
        .await
        .unwrap()
        .is_none());

    assert_eq!(gw.record_count().await, 1);
    assert!(gw.fetcher.expires().is_empty());

    gw.finish().await;
}

// Admin-driven expire flows through the worker and marks the record.
#[tokio::test]
async fn admin_expire_marks_record_expired() {
    let gw = gateway();
    let admin = gw.admin().await;
    let now = gw.clock.epoch_ms();

    let id = gw
        .store
        .insert(igw_core::test_support::ready_record(
            "",
            "test",
            "sha256:abc",
            now,
        ))
        .await
        .unwrap();

    assert!(gw.manager.expire(&admin, &query("test")).await.unwrap());
    gw.wait_for_state(&id, Some(RecordStatus::Expired)).await;
    assert_eq!(gw.fetcher.expires().len(), 1);

    gw.finish().await;
}
