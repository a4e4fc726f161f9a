// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! igw-store: The authoritative record store.
//!
//! A narrow CRUD surface ([`RecordStore`]) over a pluggable document
//! backend. Every backend call is wrapped in a bounded retry against
//! transient connection loss; the connection URI from the gateway config
//! selects the backend (`mem://` ephemeral, `file://` snapshot-persisted).

pub mod backend;
pub mod connect;
pub mod memory;
pub mod snapshot;
pub mod store;

pub use backend::{BackendError, RecordPatch, RecordQuery, StatusFilter, StoreBackend};
pub use connect::{connect, Connection};
pub use memory::MemoryBackend;
pub use snapshot::{SnapshotError, StoreContents};
pub use store::{RecordStore, StoreError};

#[cfg(any(test, feature = "test-support"))]
pub use memory::FlakyBackend;
