// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The authentication seam.
//!
//! The gateway consumes authentication as `authenticate(token, platform) →
//! principal`; the backend is selected by the `Authentication` config key.
//! The default backend decodes munge credentials with the system
//! `unmunge` tool.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Errors from authentication
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication failed: {0}")]
    Failed(String),
    #[error("unknown authentication backend: {0}")]
    UnknownBackend(String),
}

/// An authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user: String,
    pub uid: u32,
    pub gid: u32,
}

/// Turns a credential token into a principal.
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    async fn authenticate(&self, token: &str, platform: &str) -> Result<Principal, AuthError>;
}

/// Build the authenticator named by the config selector.
pub fn from_config(backend: &str) -> Result<MungeAuthenticator, AuthError> {
    match backend {
        "munge" => Ok(MungeAuthenticator::default()),
        other => Err(AuthError::UnknownBackend(other.to_string())),
    }
}

const UNMUNGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Decodes munge credentials via the system `unmunge` tool.
#[derive(Clone, Default)]
pub struct MungeAuthenticator;

impl MungeAuthenticator {
    /// Parse a `UID:` or `GID:` line of unmunge output:
    /// `UID:              alice (1001)`.
    fn parse_id_line(line: &str) -> Option<(String, u32)> {
        let rest = line.split_once(':')?.1.trim();
        let (name, id) = rest.split_once('(')?;
        let id = id.trim_end_matches(')').trim().parse().ok()?;
        Some((name.trim().to_string(), id))
    }

    fn parse_output(text: &str) -> Result<Principal, AuthError> {
        let mut user = None;
        let mut uid = None;
        let mut gid = None;
        for line in text.lines() {
            if line.starts_with("UID:") {
                if let Some((name, id)) = Self::parse_id_line(line) {
                    user = Some(name);
                    uid = Some(id);
                }
            } else if line.starts_with("GID:") {
                if let Some((_, id)) = Self::parse_id_line(line) {
                    gid = Some(id);
                }
            }
        }
        match (user, uid, gid) {
            (Some(user), Some(uid), Some(gid)) => Ok(Principal { user, uid, gid }),
            _ => Err(AuthError::Failed(
                "unmunge output missing UID/GID".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Authenticator for MungeAuthenticator {
    async fn authenticate(&self, token: &str, _platform: &str) -> Result<Principal, AuthError> {
        let mut child = Command::new("unmunge")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AuthError::Failed(format!("failed to run unmunge: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(token.as_bytes())
                .await
                .map_err(|e| AuthError::Failed(format!("failed to write credential: {e}")))?;
        }

        let output = tokio::time::timeout(UNMUNGE_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| AuthError::Failed("unmunge timed out".to_string()))?
            .map_err(|e| AuthError::Failed(format!("unmunge failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AuthError::Failed(format!(
                "credential rejected: {}",
                stderr.trim()
            )));
        }

        Self::parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;

    /// Accepts `good:<user>:<uid>:<gid>` tokens and rejects everything
    /// else.
    #[derive(Clone, Default)]
    pub struct FakeAuthenticator;

    #[async_trait]
    impl Authenticator for FakeAuthenticator {
        async fn authenticate(
            &self,
            token: &str,
            _platform: &str,
        ) -> Result<Principal, AuthError> {
            let parts: Vec<&str> = token.split(':').collect();
            let ["good", user, uid, gid] = parts.as_slice() else {
                return Err(AuthError::Failed("bad credential".to_string()));
            };
            let parse = |s: &str| {
                s.parse::<u32>()
                    .map_err(|_| AuthError::Failed("bad credential".to_string()))
            };
            Ok(Principal {
                user: user.to_string(),
                uid: parse(uid)?,
                gid: parse(gid)?,
            })
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeAuthenticator;

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
