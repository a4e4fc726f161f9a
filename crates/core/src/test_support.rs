// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builders shared by tests across the workspace.

use crate::record::{ImageRecord, RecordId, RecordStatus};
use crate::request::PullRequest;
use crate::session::Session;
use crate::PullResponse;

pub const TEST_PLATFORM: &str = "systema";
pub const TEST_MAGIC: &str = "test-magic";

/// A docker pull request for the test platform.
pub fn pull_request(tag: &str) -> PullRequest {
    PullRequest {
        platform: TEST_PLATFORM.to_string(),
        image_type: "docker".to_string(),
        tag: tag.to_string(),
        remote_type: Some("dockerv2".to_string()),
        user_acl: Vec::new(),
        group_acl: Vec::new(),
    }
}

/// A session for the given uid/gid, minted with [`TEST_MAGIC`].
pub fn session(user: &str, uid: u32, gid: u32) -> Session {
    Session {
        user: user.to_string(),
        uid,
        gid,
        platform: TEST_PLATFORM.to_string(),
        magic: TEST_MAGIC.to_string(),
    }
}

/// A READY record serving `tag` with the given content id.
pub fn ready_record(id: &str, tag: &str, content_id: &str, last_pull: u64) -> ImageRecord {
    let mut record = ImageRecord::new_pull(&pull_request(tag), Some("squashfs"));
    record.id = RecordId::new(id);
    record.tag = vec![tag.to_string()];
    record.content_id = Some(content_id.to_string());
    record.status = RecordStatus::Ready;
    record.last_pull = Some(last_pull);
    record.entry = Some("./run".to_string());
    record.env = vec!["FOO=bar".to_string()];
    record
}

/// An in-flight record for `tag` in the given state.
pub fn inflight_record(id: &str, tag: &str, status: RecordStatus, last_pull: u64) -> ImageRecord {
    let mut record = ImageRecord::new_pull(&pull_request(tag), Some("squashfs"));
    record.id = RecordId::new(id);
    record.status = status;
    record.last_pull = Some(last_pull);
    record
}

/// The canned worker response used by test-mode pulls.
pub fn canned_response(content_id: &str, tag: &str) -> PullResponse {
    PullResponse {
        id: content_id.to_string(),
        tag: tag.to_string(),
        entrypoint: Some("./run".to_string()),
        env: vec!["FOO=bar".to_string(), "PATH=/usr/bin".to_string()],
        workdir: Some("/root".to_string()),
        user_acl: Vec::new(),
        group_acl: Vec::new(),
        private: Some(false),
        meta_only: false,
    }
}
