// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Image record and its status machine.

use crate::request::PullRequest;
use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Opaque record identifier assigned by the record store on insert.
    ///
    /// Distinct from the content id: the content id is assigned by the
    /// remote registry and several records (or several tags on one record)
    /// may resolve to the same content.
    pub struct RecordId;
}

/// Lifecycle state of an image record.
///
/// Created as `INIT`, bumped to `ENQUEUED` when dispatched, heartbeated
/// through `PULLING`/`TRANSFER` by the worker, and settled to `READY` or
/// `FAILURE` by the status reconciler. `EXPIRED` is set by the expirer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Init,
    Enqueued,
    Pulling,
    Transfer,
    Ready,
    Failure,
    Expired,
}

impl RecordStatus {
    pub fn is_ready(self) -> bool {
        matches!(self, RecordStatus::Ready)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordStatus::Init => write!(f, "INIT"),
            RecordStatus::Enqueued => write!(f, "ENQUEUED"),
            RecordStatus::Pulling => write!(f, "PULLING"),
            RecordStatus::Transfer => write!(f, "TRANSFER"),
            RecordStatus::Ready => write!(f, "READY"),
            RecordStatus::Failure => write!(f, "FAILURE"),
            RecordStatus::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// Accept either a legacy scalar tag or a tag list on input.
///
/// Old records stored `tag` as a single string; everything written now is a
/// list. Readers promote the scalar shape, writers always emit the list.
fn tag_set<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TagField {
        One(String),
        Many(Vec<String>),
    }

    Ok(match TagField::deserialize(deserializer)? {
        TagField::One(tag) => vec![tag],
        TagField::Many(tags) => tags,
    })
}

/// A tracked image on a platform.
///
/// Identity is the store-assigned `id`. Records are additionally queried by
/// `(platform, image_type, pulltag)` to find in-flight attempts and by
/// `(platform, image_type, tag)` to find the served copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: RecordId,
    pub platform: String,
    pub image_type: String,
    pub remote_type: String,
    /// Tag as originally requested, kept verbatim for in-flight matching.
    pub pulltag: String,
    /// Tags currently attached to this record (set semantics). Multi-tag
    /// images share one record.
    #[serde(default, deserialize_with = "tag_set")]
    pub tag: Vec<String>,
    /// Content identifier assigned by the remote registry on a successful
    /// pull.
    #[serde(default)]
    pub content_id: Option<String>,
    pub format: String,
    pub arch: String,
    pub os: String,
    #[serde(default)]
    pub location: String,
    pub status: RecordStatus,
    #[serde(default)]
    pub status_message: String,
    /// Most recent successful-or-attempted pull (epoch ms).
    #[serde(default)]
    pub last_pull: Option<u64>,
    /// Most recent worker liveness signal (epoch ms). Absent means never
    /// heard from.
    #[serde(default)]
    pub last_heartbeat: Option<u64>,
    /// After this time the autoexpirer may reclaim the image (epoch ms).
    #[serde(default)]
    pub expiration: Option<u64>,
    #[serde(default)]
    pub user_acl: Vec<u32>,
    #[serde(default)]
    pub group_acl: Vec<u32>,
    /// `Some(false)` forces both ACLs empty; unset means "not stated".
    #[serde(default)]
    pub private: Option<bool>,
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub workdir: Option<String>,
}

/// Template format used when the gateway config does not name one.
const INVALID_FORMAT: &str = "invalid";

impl ImageRecord {
    /// Build a fresh pull record from a request.
    ///
    /// The record starts in `INIT` with packing metadata defaults; the
    /// store assigns the real id on insert.
    pub fn new_pull(request: &PullRequest, default_format: Option<&str>) -> Self {
        Self {
            id: RecordId::new(""),
            platform: request.platform.clone(),
            image_type: request.image_type.clone(),
            remote_type: request
                .remote_type
                .clone()
                .unwrap_or_else(|| "dockerv2".to_string()),
            pulltag: request.tag.clone(),
            tag: Vec::new(),
            content_id: None,
            format: default_format.unwrap_or(INVALID_FORMAT).to_string(),
            arch: "amd64".to_string(),
            os: "linux".to_string(),
            location: String::new(),
            status: RecordStatus::Init,
            status_message: String::new(),
            last_pull: None,
            last_heartbeat: None,
            expiration: None,
            user_acl: request.user_acl.clone(),
            group_acl: request.group_acl.clone(),
            private: None,
            entry: None,
            env: Vec::new(),
            workdir: None,
        }
    }

    /// True while a pull attempt is outstanding (anything but READY).
    pub fn in_flight(&self) -> bool {
        self.status != RecordStatus::Ready
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag.iter().any(|t| t == tag)
    }
}

/// One row of the append-only lookup metrics log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub user: String,
    pub uid: u32,
    pub platform: String,
    pub image_type: String,
    pub tag: String,
    pub record_id: RecordId,
    /// Epoch ms of the lookup.
    pub time: u64,
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
