// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The fetcher seam: everything between "pull this tag" and a populated
//! response.
//!
//! The registry client, packer, and transfer tooling live outside this
//! process; [`CommandFetcher`] delegates to configured external commands
//! and parses the response JSON they print.

use async_trait::async_trait;
use igw_core::{ImageRecord, PullJob, PullResponse};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Errors from fetch operations
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("pull failed: {0}")]
    Pull(String),
    #[error("expire failed: {0}")]
    Expire(String),
    #[error("no {0} command configured")]
    NoCommand(&'static str),
}

/// Performs the actual pull and reclamation work for the pool.
#[async_trait]
pub trait ImageFetcher: Send + Sync + 'static {
    async fn pull(&self, job: &PullJob) -> Result<PullResponse, FetchError>;

    async fn expire(&self, record: &ImageRecord) -> Result<(), FetchError>;
}

/// Generous ceiling for a full pull (fetch, pack, transfer).
const PULL_COMMAND_TIMEOUT: Duration = Duration::from_secs(3600);

/// Expire only removes artifacts; it should be quick.
const EXPIRE_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// Run a subprocess command with a timeout.
///
/// The child process is killed automatically if the timeout elapses (via
/// the tokio `Child` drop implementation).
async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<std::process::Output, String> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(format!("{description} failed: {io_err}")),
        Err(_elapsed) => Err(format!(
            "{description} timed out after {}s",
            timeout.as_secs()
        )),
    }
}

/// Fetcher that shells out to configured pull/expire commands.
///
/// The pull command receives the job via `IGW_*` environment variables and
/// must print a response JSON object on stdout.
#[derive(Clone, Default)]
pub struct CommandFetcher {
    pull_command: Option<String>,
    expire_command: Option<String>,
}

impl CommandFetcher {
    pub fn new(pull_command: Option<String>, expire_command: Option<String>) -> Self {
        Self {
            pull_command,
            expire_command,
        }
    }

    fn shell(command: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

#[async_trait]
impl ImageFetcher for CommandFetcher {
    async fn pull(&self, job: &PullJob) -> Result<PullResponse, FetchError> {
        let command = self
            .pull_command
            .as_deref()
            .ok_or(FetchError::NoCommand("pull"))?;

        let mut cmd = Self::shell(command);
        cmd.env("IGW_PLATFORM", &job.platform)
            .env("IGW_ITYPE", &job.image_type)
            .env("IGW_PULLTAG", &job.pulltag);
        debug!(pulltag = %job.pulltag, "running pull command");

        let output = run_with_timeout(cmd, PULL_COMMAND_TIMEOUT, "pull command")
            .await
            .map_err(FetchError::Pull)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Pull(format!(
                "pull command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| FetchError::Pull(format!("bad pull response: {e}")))
    }

    async fn expire(&self, record: &ImageRecord) -> Result<(), FetchError> {
        let command = self
            .expire_command
            .as_deref()
            .ok_or(FetchError::NoCommand("expire"))?;

        let mut cmd = Self::shell(command);
        cmd.env("IGW_PLATFORM", &record.platform);
        if let Some(content_id) = &record.content_id {
            cmd.env("IGW_CONTENT_ID", content_id);
        }

        let output = run_with_timeout(cmd, EXPIRE_COMMAND_TIMEOUT, "expire command")
            .await
            .map_err(FetchError::Expire)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Expire(format!(
                "expire command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Scripted outcome for one fetch.
    enum Script {
        Respond(PullResponse),
        Fail(String),
        /// Never completes; the pull stays in flight.
        Hang,
    }

    #[derive(Default)]
    struct FakeState {
        script: VecDeque<Script>,
        pulls: Vec<PullJob>,
        expires: Vec<ImageRecord>,
        fail_expires: bool,
    }

    /// Fake fetcher with scripted outcomes and recorded calls.
    ///
    /// Without a script, pulls respond with the canned test response for
    /// the job's pulltag.
    #[derive(Clone, Default)]
    pub struct FakeFetcher {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        /// Script the next pull to return this response.
        pub fn respond_with(&self, response: PullResponse) {
            self.state.lock().script.push_back(Script::Respond(response));
        }

        /// Script the next pull to fail.
        pub fn fail_next(&self, message: impl Into<String>) {
            self.state.lock().script.push_back(Script::Fail(message.into()));
        }

        /// Script the next pull to hang forever.
        pub fn hang_next(&self) {
            self.state.lock().script.push_back(Script::Hang);
        }

        /// Make every expire call fail.
        pub fn fail_expires(&self) {
            self.state.lock().fail_expires = true;
        }

        pub fn pulls(&self) -> Vec<PullJob> {
            self.state.lock().pulls.clone()
        }

        pub fn expires(&self) -> Vec<ImageRecord> {
            self.state.lock().expires.clone()
        }
    }

    #[async_trait]
    impl ImageFetcher for FakeFetcher {
        async fn pull(&self, job: &PullJob) -> Result<PullResponse, FetchError> {
            let script = {
                let mut state = self.state.lock();
                state.pulls.push(job.clone());
                state.script.pop_front()
            };
            match script {
                None => Ok(igw_core::test_support::canned_response(
                    &format!("sha256:{}", job.pulltag.replace([':', '/'], "-")),
                    &job.pulltag,
                )),
                Some(Script::Respond(response)) => Ok(response),
                Some(Script::Fail(message)) => Err(FetchError::Pull(message)),
                Some(Script::Hang) => {
                    std::future::pending::<()>().await;
                    Err(FetchError::Pull("unreachable".to_string()))
                }
            }
        }

        async fn expire(&self, record: &ImageRecord) -> Result<(), FetchError> {
            let mut state = self.state.lock();
            state.expires.push(record.clone());
            if state.fail_expires {
                return Err(FetchError::Expire("scripted expire failure".to_string()));
            }
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeFetcher;

#[cfg(test)]
#[path = "fetcher_tests.rs"]
mod tests;
