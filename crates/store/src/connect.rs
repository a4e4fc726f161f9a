// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend selection from the configured store URI.
//!
//! `mem://` holds records for the life of the process; `file:///some/dir`
//! restores the store document named after the configured database at
//! startup and is checkpointed back by the daemon. Anything else is a
//! configuration error surfaced at startup.

use crate::memory::MemoryBackend;
use crate::snapshot;
use crate::store::StoreError;
use std::path::{Path, PathBuf};
use tracing::info;

/// An opened store connection.
#[derive(Clone)]
pub struct Connection {
    pub backend: MemoryBackend,
    /// Where to checkpoint; `None` for ephemeral stores.
    pub snapshot_path: Option<PathBuf>,
}

impl Connection {
    /// Write the current contents to the snapshot path, if any.
    pub fn checkpoint(&self, db: &str) -> Result<(), StoreError> {
        if let Some(path) = &self.snapshot_path {
            snapshot::save(path, db, &self.backend.export())?;
        }
        Ok(())
    }
}

/// Open the backend named by `uri`, restoring persisted state when the
/// flavor has any.
pub fn connect(uri: &str, db: &str) -> Result<Connection, StoreError> {
    if uri.strip_prefix("mem://").is_some() {
        return Ok(Connection {
            backend: MemoryBackend::new(),
            snapshot_path: None,
        });
    }

    if let Some(dir) = uri.strip_prefix("file://") {
        let path = snapshot::snapshot_path(Path::new(dir), db);
        let backend = MemoryBackend::new();
        if let Some(contents) = snapshot::load(&path, db)? {
            info!(
                path = %path.display(),
                records = contents.records.len(),
                "restored store contents"
            );
            backend.import(contents);
        }
        return Ok(Connection {
            backend,
            snapshot_path: Some(path),
        });
    }

    Err(StoreError::UnsupportedScheme(uri.to_string()))
}

#[cfg(test)]
#[path = "connect_tests.rs"]
mod tests;
