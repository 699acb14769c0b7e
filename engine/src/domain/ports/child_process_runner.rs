//! `ChildProcessRunner` port — the sole abstraction over spawning, waiting
//! on, signaling, and reaping OS child processes (§4.1).

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::stop_signal::StopSignal;
use crate::error::Result;

/// What to do with a child's standard stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stdio {
    Pipe,
    Null,
    Inherit,
}

#[derive(Debug, Clone)]
pub struct ChildSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub working_dir: Option<String>,
    pub stdout: Stdio,
    pub stderr: Stdio,
}

impl ChildSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            working_dir: None,
            stdout: Stdio::Pipe,
            stderr: Stdio::Pipe,
        }
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdout_mode(mut self, mode: Stdio) -> Self {
        self.stdout = mode;
        self
    }

    pub fn stderr_mode(mut self, mode: Stdio) -> Self {
        self.stderr = mode;
        self
    }
}

/// Opaque handle to a running (or exited-but-not-yet-reaped) child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildHandle {
    pub pid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited(i32),
    Stopped,
    TimedOut,
}

/// Port for spawning and supervising system processes. Every implementation
/// must ensure spawned processes never become zombies: the teacher's tokio
/// executor does this with a `spawn_blocking(child.wait())` task per child;
/// `TokioChildProcessRunner` follows the same pattern (see infrastructure).
#[async_trait]
pub trait ChildProcessRunner: Send + Sync {
    async fn spawn(&self, spec: ChildSpec) -> Result<ChildHandle>;

    /// Block (subject to `timeout` and `stop`) until the child exits.
    /// Polls at most once per second, per §4.1.
    async fn wait_with_timeout(
        &self,
        handle: &ChildHandle,
        timeout: Duration,
        stop: &StopSignal,
    ) -> Result<ExitOutcome>;

    async fn send_signal(&self, handle: &ChildHandle, signal: i32) -> Result<()>;

    /// Drain stdout/stderr (communicate-style, not `wait()`-then-read, to
    /// avoid the pipe-buffer deadlock the original implementation calls out)
    /// and return `(exit_code, stdout, stderr)`.
    async fn reap(&self, handle: &ChildHandle) -> Result<(i32, String, String)>;

    /// Send `signal`, then reap regardless of whether the child responds to
    /// it, following up with SIGKILL if it is still alive after a short grace
    /// period.
    async fn kill_and_reap(&self, handle: &ChildHandle, signal: i32) -> Result<()>;

    async fn is_running(&self, handle: &ChildHandle) -> Result<bool>;

    /// Current resident set size in bytes, if obtainable. Used by the perf
    /// supervisor's memory watchdog (§4.3); returns `Ok(None)` rather than an
    /// error when unavailable (e.g. process just exited).
    async fn rss_bytes(&self, handle: &ChildHandle) -> Result<Option<u64>>;
}
