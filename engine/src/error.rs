//! Agent-wide error type.
//!
//! Every fallible operation in the domain and infrastructure layers returns
//! `Result<T>`. Error kinds mirror the propagation policy: per-PID and
//! per-profiler failures are caught and downgraded to warnings by the
//! orchestrator, while startup failures (`MutexHeld`, `UnsupportedEnvironment`,
//! missing binaries) are fatal.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The shared stop-signal was observed while waiting on a child or timer.
    #[error("stopped")]
    Stopped,

    #[error("timed out waiting for {operation}")]
    Timeout { operation: String },

    #[error("child process failed (exit={exit_code:?})")]
    ChildFailed {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("required program not found: {0}")]
    ProgramMissing(String),

    #[error("external metadata at {path} is stale ({age_secs}s old)")]
    ExternalMetadataStale { path: String, age_secs: u64 },

    #[error("upstream API error {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("could not acquire gProfiler's lock")]
    MutexHeld,

    #[error("unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
