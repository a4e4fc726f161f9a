// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for manager operations

use crate::auth::AuthError;
use igw_core::ConfigError;
use igw_store::StoreError;
use igw_workers::DispatchError;
use thiserror::Error;

/// Errors surfaced to the front-end
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Missing, forged, or wrong-platform session.
    #[error("invalid session")]
    InvalidSession,
    #[error("invalid platform: {0}")]
    InvalidPlatform(String),
    #[error(transparent)]
    Authentication(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("worker dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
