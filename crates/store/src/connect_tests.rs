// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::backend::{RecordQuery, StoreBackend};
use crate::store::StoreError;
use igw_core::test_support::ready_record;

#[tokio::test]
async fn mem_scheme_is_ephemeral() {
    let connection = connect("mem://", "imagegw").unwrap();
    assert!(connection.snapshot_path.is_none());
    // Checkpoint is a no-op without a path
    connection.checkpoint("imagegw").unwrap();
}

#[tokio::test]
async fn file_scheme_checkpoints_and_restores() {
    let dir = tempfile::tempdir().unwrap();
    let uri = format!("file://{}", dir.path().display());

    let first = connect(&uri, "imagegw").unwrap();
    first
        .backend
        .insert(ready_record("", "alpine:latest", "sha256:abc", 1_000))
        .await
        .unwrap();
    first.checkpoint("imagegw").unwrap();

    let second = connect(&uri, "imagegw").unwrap();
    let records = second.backend.find(&RecordQuery::default()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].pulltag, "alpine:latest");
}

#[test]
fn database_name_namespaces_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let uri = format!("file://{}", dir.path().display());

    let connection = connect(&uri, "gw_a").unwrap();
    connection.checkpoint("gw_a").unwrap();

    assert!(dir.path().join("gw_a.json").exists());
    assert!(!dir.path().join("gw_b.json").exists());
}

#[test]
fn unknown_scheme_is_rejected() {
    let result = connect("mongodb://localhost:27017", "imagegw");
    assert!(matches!(result, Err(StoreError::UnsupportedScheme(_))));
}
