//! Execution backend contract.
//!
//! Defines [`ExecutionBackend`], the trait every execution target adapter
//! implements, along with [`RunHandle`], [`RunStatus`] and [`BackendError`].
//! The dispatch engine only ever calls [`ExecutionBackend::submit`]; polling
//! is used by the completion watcher.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::template::RenderedTemplate;
use crate::types::Timestamp;

/// Opaque identifier the backend assigned to an accepted run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunHandle(pub String);

impl RunHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a finished run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Failed,
}

/// Point-in-time progress of a submitted run.
///
/// Only `outcome` decides whether the run is finished. The counters are
/// informational: a run that retries can record failures and still succeed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    /// Pods/tasks currently running.
    pub active: i32,
    /// Pods/tasks that finished successfully.
    pub succeeded: i32,
    /// Pods/tasks that failed.
    pub failed: i32,
    /// Set once the backend declares the run finished.
    pub outcome: Option<RunOutcome>,
    /// When the run reached a terminal state, if it has.
    pub completion_time: Option<Timestamp>,
}

impl RunStatus {
    /// A run still in progress.
    pub fn running() -> Self {
        Self { active: 1, ..Default::default() }
    }

    /// A run the backend declared finished with `outcome`.
    pub fn finished(outcome: RunOutcome) -> Self {
        let mut status = Self { outcome: Some(outcome), ..Default::default() };
        match outcome {
            RunOutcome::Succeeded => status.succeeded = 1,
            RunOutcome::Failed => status.failed = 1,
        }
        status
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Some(RunOutcome::Succeeded)
    }
}

/// Errors from an execution backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be reached (network, DNS, TLS, timeout).
    #[error("Execution backend unreachable: {0}")]
    Unavailable(String),

    /// The backend answered but refused the request.
    #[error("Execution backend rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The backend has no record of the run handle.
    #[error("Run {0} not found on execution backend")]
    UnknownRun(String),

    /// The backend does not support the requested operation.
    #[error("Execution backend does not support {0}")]
    Unsupported(&'static str),

    /// The backend answered with a body that could not be understood.
    #[error("Unexpected execution backend response: {0}")]
    InvalidResponse(String),

    /// `watch_until_terminal` gave up before the run finished.
    #[error("Run {handle} did not finish within {waited_secs}s")]
    WatchTimeout { handle: String, waited_secs: u64 },
}

/// Trait implemented by every execution target.
#[async_trait::async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Short identifier used in logs (e.g. `"kubernetes"`).
    fn kind(&self) -> &'static str;

    /// Submit a rendered template; returns the backend's run handle.
    async fn submit(&self, rendered: &RenderedTemplate) -> Result<RunHandle, BackendError>;

    /// Fetch the current status of a run.
    async fn poll(&self, _handle: &RunHandle) -> Result<RunStatus, BackendError> {
        Err(BackendError::Unsupported("polling"))
    }

    /// Poll every `interval` until the run is terminal or `timeout` elapses.
    async fn watch_until_terminal(
        &self,
        handle: &RunHandle,
        interval: Duration,
        timeout: Duration,
    ) -> Result<RunStatus, BackendError> {
        let started = tokio::time::Instant::now();
        loop {
            let status = self.poll(handle).await?;
            if status.is_terminal() {
                return Ok(status);
            }
            if started.elapsed() + interval > timeout {
                return Err(BackendError::WatchTimeout {
                    handle: handle.to_string(),
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            tokio::time::sleep(interval).await;
        }
    }
}
