// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pull decision: a pure predicate over the stored record and the
//! incoming request.
//!
//! Nothing in this module touches the store or the clock; the manager
//! feeds in the candidate record and `now` and acts on the returned
//! [`PullAction`].

use crate::acl::same_ids;
use crate::record::{ImageRecord, RecordStatus};

/// A pull within this window of a previous one is "recent": served from
/// cache even if the requested ACLs differ.
pub const RECENT_WINDOW_MS: u64 = 10_000;

/// A non-READY record whose heartbeat is older than this is treated as a
/// hung worker and re-pulled.
pub const HUNG_WORKER_TIMEOUT_MS: u64 = 3_600_000;

/// What the manager should do with a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullAction {
    /// Return the READY record as-is.
    ServeCached,
    /// A live attempt exists for this pulltag; return it untouched.
    Piggyback,
    /// Create a new pull record and dispatch a worker.
    EnqueueNew,
}

/// Whether a new pull may be attempted for this record.
///
/// True when there is no record at all, the record is EXPIRED or has never
/// pulled, a READY/FAILURE record has aged past the re-pull window, or a
/// non-READY record's worker heartbeat has gone stale.
pub fn pullable(record: Option<&ImageRecord>, now_ms: u64, pull_update_timeout_ms: u64) -> bool {
    let Some(record) = record else {
        return true;
    };

    if record.status == RecordStatus::Expired {
        return true;
    }

    let Some(last_pull) = record.last_pull else {
        return true;
    };
    let next_pull = last_pull + pull_update_timeout_ms;

    // Re-pull to refresh an aged READY image
    if record.status == RecordStatus::Ready && now_ms > next_pull {
        return true;
    }

    // Retry aged failures
    if record.status == RecordStatus::Failure && now_ms > next_pull {
        return true;
    }

    // A pull that died mid-flight: heartbeat present but stale
    if record.status != RecordStatus::Ready {
        if let Some(heartbeat) = record.last_heartbeat {
            if now_ms.saturating_sub(heartbeat) > HUNG_WORKER_TIMEOUT_MS {
                return true;
            }
        }
    }

    false
}

/// Whether the requested ACLs (already normalized) differ from the stored
/// record's, as sets.
pub fn acl_changed(user_acl: &[u32], group_acl: &[u32], record: Option<&ImageRecord>) -> bool {
    let Some(record) = record else {
        return false;
    };
    !(same_ids(user_acl, &record.user_acl) && same_ids(group_acl, &record.group_acl))
}

fn is_recent(record: &ImageRecord, now_ms: u64) -> bool {
    record.status == RecordStatus::Ready
        && record
            .last_pull
            .is_some_and(|t| now_ms.saturating_sub(t) < RECENT_WINDOW_MS)
}

/// Decide what to do with a pull request.
///
/// `record` is the candidate chosen by the manager: the in-flight record
/// for the pulltag when one exists, otherwise the READY record for the
/// tag. ACL changes inside the recent window do not trigger a refresh
/// until the window expires.
pub fn decide(
    record: Option<&ImageRecord>,
    user_acl: &[u32],
    group_acl: &[u32],
    now_ms: u64,
    pull_update_timeout_ms: u64,
) -> PullAction {
    let in_flight = record.is_some_and(|r| r.in_flight());
    let recent = record.is_some_and(|r| is_recent(r, now_ms));
    let changed = acl_changed(user_acl, group_acl, record);

    let update =
        (!recent && !in_flight && changed) || pullable(record, now_ms, pull_update_timeout_ms);

    if update {
        PullAction::EnqueueNew
    } else if in_flight {
        PullAction::Piggyback
    } else {
        PullAction::ServeCached
    }
}

#[cfg(test)]
#[path = "decision_tests.rs"]
mod tests;
