// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use igw_core::test_support::ready_record;

fn contents() -> StoreContents {
    StoreContents {
        records: vec![ready_record("r1", "alpine:latest", "sha256:abc", 1_000)],
        metrics: Vec::new(),
    }
}

#[test]
fn save_load_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = snapshot_path(dir.path(), "imagegw");

    save(&path, "imagegw", &contents()).unwrap();

    let loaded = load(&path, "imagegw").unwrap().unwrap();
    assert_eq!(loaded.records.len(), 1);
    assert_eq!(loaded.records[0].id, "r1");
}

#[test]
fn snapshot_path_is_named_after_the_database() {
    assert_eq!(
        snapshot_path(Path::new("/var/lib/igw"), "imagegw"),
        PathBuf::from("/var/lib/igw/imagegw.json")
    );
}

#[test]
fn load_missing_returns_none() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = load(&dir.path().join("absent.json"), "imagegw").unwrap();
    assert!(loaded.is_none());
}

#[test]
fn save_replaces_previous_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = snapshot_path(dir.path(), "imagegw");

    save(&path, "imagegw", &contents()).unwrap();
    save(&path, "imagegw", &StoreContents::default()).unwrap();

    let loaded = load(&path, "imagegw").unwrap().unwrap();
    assert!(loaded.records.is_empty());
    // No staging file left behind
    assert!(!dir.path().join("imagegw.json.partial").exists());
}

#[test]
fn undecodable_document_is_quarantined() {
    let dir = tempfile::tempdir().unwrap();
    let path = snapshot_path(dir.path(), "imagegw");
    fs::write(&path, "not json {").unwrap();

    let loaded = load(&path, "imagegw").unwrap();
    assert!(loaded.is_none());
    assert!(!path.exists());
    assert!(dir.path().join("imagegw.json.corrupt").exists());

    // The next checkpoint writes fresh over the quarantined slot
    save(&path, "imagegw", &contents()).unwrap();
    assert!(load(&path, "imagegw").unwrap().is_some());
}

#[test]
fn repeated_corruption_replaces_the_quarantine() {
    let dir = tempfile::tempdir().unwrap();
    let path = snapshot_path(dir.path(), "imagegw");

    for n in 0..2 {
        fs::write(&path, format!("corrupt {n}")).unwrap();
        assert!(load(&path, "imagegw").unwrap().is_none());
    }

    let quarantine = dir.path().join("imagegw.json.corrupt");
    assert!(quarantine.exists());
    assert_eq!(fs::read_to_string(quarantine).unwrap(), "corrupt 1");
}

#[test]
fn document_for_another_database_is_ignored_and_kept() {
    let dir = tempfile::tempdir().unwrap();
    let path = snapshot_path(dir.path(), "gw_a");

    save(&path, "gw_a", &contents()).unwrap();

    // Same file read under a different configured database name
    let loaded = load(&path, "gw_b").unwrap();
    assert!(loaded.is_none());
    assert!(path.exists());
    assert!(!dir.path().join("gw_a.json.corrupt").exists());
}

#[test]
fn save_creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/state/imagegw.json");
    save(&path, "imagegw", &StoreContents::default()).unwrap();
    assert!(path.exists());
}
