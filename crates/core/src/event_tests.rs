// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn stop_sentinel_roundtrips_as_bare_string() {
    let json = serde_json::to_string(&StatusMessage::Stop).unwrap();
    assert_eq!(json, "\"stop\"");
    let parsed: StatusMessage = serde_json::from_str("\"stop\"").unwrap();
    assert_eq!(parsed, StatusMessage::Stop);
}

#[test]
fn unknown_sentinel_is_rejected() {
    let parsed: Result<StatusMessage, _> = serde_json::from_str("\"halt\"");
    assert!(parsed.is_err());
}

#[test]
fn update_roundtrips_with_wire_field_names() {
    let update = StatusUpdate {
        id: RecordId::new("rec-1"),
        state: WorkerState::Ready,
        meta: StatusInfo {
            response: Some(PullResponse {
                id: "sha256:abc".to_string(),
                tag: "alpine:latest".to_string(),
                entrypoint: Some("./run".to_string()),
                env: vec!["FOO=bar".to_string()],
                workdir: Some("/root".to_string()),
                user_acl: vec![100],
                group_acl: vec![200],
                private: Some(true),
                meta_only: false,
            }),
            heartbeat: Some(123_456),
            message: None,
        },
    };

    let json = serde_json::to_value(StatusMessage::Update(update.clone())).unwrap();
    assert_eq!(json["state"], "READY");
    assert_eq!(json["meta"]["response"]["userACL"][0], 100);
    assert_eq!(json["meta"]["response"]["groupACL"][0], 200);

    let parsed: StatusMessage = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, StatusMessage::Update(update));
}

#[test]
fn meta_only_defaults_false() {
    let response: PullResponse = serde_json::from_str(r#"{"id": "sha256:abc"}"#).unwrap();
    assert!(!response.meta_only);
    let response: PullResponse =
        serde_json::from_str(r#"{"id": "sha256:abc", "meta_only": true}"#).unwrap();
    assert!(response.meta_only);
}

#[test]
fn heartbeat_only_update_parses() {
    let parsed: StatusMessage =
        serde_json::from_str(r#"{"id": "rec-1", "state": "PULLING", "meta": {"heartbeat": 99}}"#)
            .unwrap();
    let StatusMessage::Update(update) = parsed else {
        panic!("expected update");
    };
    assert_eq!(update.state, WorkerState::Pulling);
    assert_eq!(update.meta.heartbeat, Some(99));
    assert!(update.meta.response.is_none());
}

#[test]
fn success_normalizes_to_ready_status() {
    assert_eq!(WorkerState::Success.record_status(), RecordStatus::Ready);
    assert_eq!(WorkerState::Ready.record_status(), RecordStatus::Ready);
    assert_eq!(WorkerState::Transfer.record_status(), RecordStatus::Transfer);
    assert!(WorkerState::Success.is_ready());
    assert!(!WorkerState::Failure.is_ready());
}
