// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk persistence for the `file://` store flavor.
//!
//! The whole store is one JSON document named after the configured
//! database (`<dir>/<db>.json`). Records never hit disk individually:
//! every checkpoint rewrites the document through a `.partial` staging
//! file so readers only ever see a complete store. A document that fails
//! to decode is quarantined to `<db>.json.corrupt` and the gateway starts
//! empty; a document written for a different database is left alone and
//! ignored.

use chrono::{DateTime, Utc};
use igw_core::{ImageRecord, MetricsRecord};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors that can occur reading or writing store documents
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything a backend holds: records plus the metrics log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreContents {
    pub records: Vec<ImageRecord>,
    #[serde(default)]
    pub metrics: Vec<MetricsRecord>,
}

/// The on-disk document shape.
#[derive(Serialize, Deserialize)]
struct StoreDocument {
    /// Database name the gateway was configured with
    db: String,
    saved_at: DateTime<Utc>,
    records: Vec<ImageRecord>,
    #[serde(default)]
    metrics: Vec<MetricsRecord>,
}

/// Where the document for a database lives under a store directory.
pub fn snapshot_path(dir: &Path, db: &str) -> PathBuf {
    dir.join(format!("{db}.json"))
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Write the store document, replacing any previous one.
///
/// The document lands in a `.partial` sibling first and is renamed into
/// place after a sync, so a crash mid-write leaves the previous document
/// intact.
pub fn save(path: &Path, db: &str, contents: &StoreContents) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let document = StoreDocument {
        db: db.to_string(),
        saved_at: Utc::now(),
        records: contents.records.clone(),
        metrics: contents.metrics.clone(),
    };
    let payload = serde_json::to_vec(&document)?;

    let staging = sibling(path, ".partial");
    let mut file = fs::File::create(&staging)?;
    file.write_all(&payload)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&staging, path)?;
    Ok(())
}

/// Read the store document for `db`, if one exists.
///
/// Returns `Ok(None)` when there is nothing usable to restore: no
/// document, a document for some other database (left untouched), or an
/// undecodable document, which is quarantined so the next checkpoint can
/// write fresh.
pub fn load(path: &Path, db: &str) -> Result<Option<StoreContents>, SnapshotError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let document: StoreDocument = match serde_json::from_slice(&bytes) {
        Ok(document) => document,
        Err(e) => {
            let quarantine = sibling(path, ".corrupt");
            warn!(
                error = %e,
                path = %path.display(),
                quarantine = %quarantine.display(),
                "undecodable store document, quarantining and starting empty",
            );
            fs::rename(path, &quarantine)?;
            return Ok(None);
        }
    };

    if document.db != db {
        warn!(
            found = %document.db,
            expected = %db,
            path = %path.display(),
            "store document belongs to a different database, ignoring",
        );
        return Ok(None);
    }

    Ok(Some(StoreContents {
        records: document.records,
        metrics: document.metrics,
    }))
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
