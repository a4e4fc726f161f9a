// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker status events.
//!
//! Workers report progress as `{id, state, meta}` objects on a
//! single-consumer queue; the literal string `"stop"` is the shutdown
//! sentinel for the reconciler. Response payloads use the external field
//! names of the worker protocol (`userACL`, `meta_only`, ...); the store
//! translates them onto record fields.

use crate::record::{RecordId, RecordStatus};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// States a worker can report.
///
/// `SUCCESS` is a legacy spelling of `READY` still seen on the wire; the
/// store normalizes it on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    Pulling,
    Transfer,
    Ready,
    Success,
    Failure,
    Expired,
}

impl WorkerState {
    /// The record status this state maps to.
    pub fn record_status(self) -> RecordStatus {
        match self {
            WorkerState::Pulling => RecordStatus::Pulling,
            WorkerState::Transfer => RecordStatus::Transfer,
            WorkerState::Ready | WorkerState::Success => RecordStatus::Ready,
            WorkerState::Failure => RecordStatus::Failure,
            WorkerState::Expired => RecordStatus::Expired,
        }
    }

    pub fn is_ready(self) -> bool {
        matches!(self, WorkerState::Ready | WorkerState::Success)
    }
}

/// The fully populated description of a pulled image, in external field
/// names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullResponse {
    /// Content id assigned by the remote registry.
    pub id: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub workdir: Option<String>,
    #[serde(default, rename = "userACL")]
    pub user_acl: Vec<u32>,
    #[serde(default, rename = "groupACL")]
    pub group_acl: Vec<u32>,
    #[serde(default)]
    pub private: Option<bool>,
    /// No new content was fetched; only the ACL/privacy fields are
    /// authoritative.
    #[serde(default)]
    pub meta_only: bool,
}

/// Side-channel fields attached to a status update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInfo {
    /// Present iff the state is READY.
    #[serde(default)]
    pub response: Option<PullResponse>,
    /// Worker liveness timestamp (epoch ms).
    #[serde(default)]
    pub heartbeat: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// One status update for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub id: RecordId,
    pub state: WorkerState,
    #[serde(default)]
    pub meta: StatusInfo,
}

impl StatusUpdate {
    /// A bare state transition with no metadata.
    pub fn state_only(id: RecordId, state: WorkerState) -> Self {
        Self {
            id,
            state,
            meta: StatusInfo::default(),
        }
    }
}

/// A message on the worker status queue: an update, or the shutdown
/// sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMessage {
    Stop,
    Update(StatusUpdate),
}

const STOP_SENTINEL: &str = "stop";

impl Serialize for StatusMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StatusMessage::Stop => serializer.serialize_str(STOP_SENTINEL),
            StatusMessage::Update(update) => update.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for StatusMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) if s == STOP_SENTINEL => Ok(StatusMessage::Stop),
            serde_json::Value::String(other) => Err(D::Error::custom(format!(
                "unknown status sentinel: {other}"
            ))),
            other => serde_json::from_value(other)
                .map(StatusMessage::Update)
                .map_err(D::Error::custom),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
