// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session context returned by `new_session` and checked on every
//! operation.
//!
//! The `magic` field is an in-process forgery guard, not security: the
//! manager mints one random value per process and rejects any session that
//! does not carry it, so a client-constructed session dictionary is
//! refused.

use serde::{Deserialize, Serialize};

/// An authenticated session bound to one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: String,
    pub uid: u32,
    pub gid: u32,
    pub platform: String,
    pub magic: String,
}

impl Session {
    /// True if the session was minted for the given platform.
    pub fn is_for(&self, platform: &str) -> bool {
        self.platform == platform
    }
}
