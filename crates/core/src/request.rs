// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-facing request shapes and the worker job envelope.

use crate::session::Session;
use serde::{Deserialize, Serialize};

/// Identifies an image for lookup/expire: `(platform, image_type, tag)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageQuery {
    pub platform: String,
    pub image_type: String,
    pub tag: String,
}

/// A pull request as submitted by a client.
///
/// `tag` is the pulltag: preserved verbatim so in-flight attempts can be
/// matched before a content id is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub platform: String,
    pub image_type: String,
    pub tag: String,
    #[serde(default)]
    pub remote_type: Option<String>,
    #[serde(default)]
    pub user_acl: Vec<u32>,
    #[serde(default)]
    pub group_acl: Vec<u32>,
}

/// Worker short-circuit for tests.
///
/// `Success` makes the worker emit a canned populated response without
/// touching any remote; `Failure` makes it emit a FAILURE event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestMode {
    #[default]
    Off,
    Success,
    Failure,
}

/// The envelope handed to the worker pool for one pull.
///
/// ACLs here are already normalized (caller uid/gid folded in).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullJob {
    pub platform: String,
    pub image_type: String,
    pub pulltag: String,
    pub user_acl: Vec<u32>,
    pub group_acl: Vec<u32>,
    pub session: Session,
    #[serde(default)]
    pub test_mode: TestMode,
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
