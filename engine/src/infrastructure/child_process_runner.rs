//! `TokioChildProcessRunner`, the concrete `ChildProcessRunner` adapter
//! (§4.1). Every spawned child has its stdout/stderr drained continuously
//! by a background task from the moment it is spawned, not read after
//! `wait()` returns — this is the "communicate-style drain" the spec calls
//! out to avoid the classic pipe-buffer deadlock (a child blocks writing to
//! a full pipe while the parent blocks in `wait()`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::constants::runner::{STDIO_READ_CHUNK_BYTES, WAIT_POLL_INTERVAL};
use crate::domain::ports::{ChildHandle, ChildProcessRunner, ChildSpec, ExitOutcome, Stdio as PortStdio};
use crate::domain::stop_signal::StopSignal;
use crate::error::{AgentError, Result};

struct Entry {
    child: Child,
    stdout: Arc<AsyncMutex<Vec<u8>>>,
    stderr: Arc<AsyncMutex<Vec<u8>>>,
    stdout_task: Option<tokio::task::JoinHandle<()>>,
    stderr_task: Option<tokio::task::JoinHandle<()>>,
}

#[derive(Default)]
pub struct TokioChildProcessRunner {
    entries: AsyncMutex<HashMap<u32, Entry>>,
}

impl TokioChildProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn drain_task<R>(mut reader: R, buf: Arc<AsyncMutex<Vec<u8>>>) -> tokio::task::JoinHandle<()>
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            let mut chunk = vec![0u8; STDIO_READ_CHUNK_BYTES];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => buf.lock().await.extend_from_slice(&chunk[..n]),
                    Err(_) => break,
                }
            }
        })
    }
}

fn to_std_stdio(mode: PortStdio) -> std::process::Stdio {
    match mode {
        PortStdio::Pipe => std::process::Stdio::piped(),
        PortStdio::Null => std::process::Stdio::null(),
        PortStdio::Inherit => std::process::Stdio::inherit(),
    }
}

#[async_trait]
impl ChildProcessRunner for TokioChildProcessRunner {
    async fn spawn(&self, spec: ChildSpec) -> Result<ChildHandle> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        cmd.envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(to_std_stdio(spec.stdout));
        cmd.stderr(to_std_stdio(spec.stderr));

        let mut child = cmd.spawn().map_err(AgentError::Io)?;
        let pid = child.id().ok_or_else(|| {
            AgentError::ChildFailed {
                exit_code: None,
                stdout: String::new(),
                stderr: "child exited before a PID could be observed".to_string(),
            }
        })?;

        let stdout = Arc::new(AsyncMutex::new(Vec::new()));
        let stderr = Arc::new(AsyncMutex::new(Vec::new()));
        let stdout_task = child.stdout.take().map(|r| Self::drain_task(r, stdout.clone()));
        let stderr_task = child.stderr.take().map(|r| Self::drain_task(r, stderr.clone()));

        self.entries.lock().await.insert(
            pid,
            Entry {
                child,
                stdout,
                stderr,
                stdout_task,
                stderr_task,
            },
        );

        debug!(pid, program = %spec.program, "spawned child process");
        Ok(ChildHandle { pid })
    }

    async fn wait_with_timeout(
        &self,
        handle: &ChildHandle,
        timeout: Duration,
        stop: &StopSignal,
    ) -> Result<ExitOutcome> {
        let deadline = Instant::now() + timeout;
        loop {
            if stop.is_set() {
                return Ok(ExitOutcome::Stopped);
            }

            {
                let mut entries = self.entries.lock().await;
                if let Some(entry) = entries.get_mut(&handle.pid) {
                    if let Ok(Some(status)) = entry.child.try_wait() {
                        return Ok(ExitOutcome::Exited(status.code().unwrap_or(-1)));
                    }
                } else {
                    // Already reaped by a previous call.
                    return Ok(ExitOutcome::Exited(0));
                }
            }

            if Instant::now() >= deadline {
                return Ok(ExitOutcome::TimedOut);
            }

            tokio::time::sleep(WAIT_POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now()))).await;
        }
    }

    async fn send_signal(&self, handle: &ChildHandle, signal: i32) -> Result<()> {
        let rc = unsafe { libc::kill(handle.pid as libc::pid_t, signal) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Ok(()); // already gone
            }
            return Err(AgentError::Io(err));
        }
        Ok(())
    }

    async fn reap(&self, handle: &ChildHandle) -> Result<(i32, String, String)> {
        let mut entry = {
            let mut entries = self.entries.lock().await;
            entries.remove(&handle.pid)
        };

        let Some(entry) = entry.as_mut() else {
            return Ok((0, String::new(), String::new()));
        };

        let status = entry.child.wait().await.map_err(AgentError::Io)?;

        if let Some(task) = entry.stdout_task.take() {
            let _ = task.await;
        }
        if let Some(task) = entry.stderr_task.take() {
            let _ = task.await;
        }

        let stdout = String::from_utf8_lossy(&entry.stdout.lock().await).into_owned();
        let stderr = String::from_utf8_lossy(&entry.stderr.lock().await).into_owned();

        Ok((status.code().unwrap_or(-1), stdout, stderr))
    }

    async fn kill_and_reap(&self, handle: &ChildHandle, signal: i32) -> Result<()> {
        self.send_signal(handle, signal).await?;

        let grace_deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if !self.is_running(handle).await.unwrap_or(false) {
                break;
            }
            if Instant::now() >= grace_deadline {
                warn!(pid = handle.pid, "child ignored signal, escalating to SIGKILL");
                let _ = self.send_signal(handle, libc::SIGKILL).await;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let _ = self.reap(handle).await;
        Ok(())
    }

    async fn is_running(&self, handle: &ChildHandle) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(&handle.pid) {
            Some(entry) => Ok(matches!(entry.child.try_wait(), Ok(None))),
            None => Ok(false),
        }
    }

    async fn rss_bytes(&self, handle: &ChildHandle) -> Result<Option<u64>> {
        Ok(read_rss_bytes(handle.pid))
    }
}

/// Read `VmRSS` from `/proc/<pid>/status`. Returns `None` on any failure —
/// the spec treats this as "unavailable", not an error, per §4.1.
#[cfg(target_os = "linux")]
fn read_rss_bytes(pid: u32) -> Option<u64> {
    let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: u64 = rest.trim().trim_end_matches(" kB").trim().parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn read_rss_bytes(_pid: u32) -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_wait_and_reap_a_trivial_command() {
        let runner = TokioChildProcessRunner::new();
        let handle = runner
            .spawn(ChildSpec::new("true"))
            .await
            .expect("spawn true");
        let stop = StopSignal::new();
        let outcome = runner
            .wait_with_timeout(&handle, Duration::from_secs(5), &stop)
            .await
            .unwrap();
        assert_eq!(outcome, ExitOutcome::Exited(0));
        let (code, _, _) = runner.reap(&handle).await.unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn captures_stdout_without_blocking_on_a_full_pipe() {
        let runner = TokioChildProcessRunner::new();
        let handle = runner
            .spawn(
                ChildSpec::new("sh")
                    .args(["-c", "echo hello-from-child"]),
            )
            .await
            .unwrap();
        let stop = StopSignal::new();
        runner
            .wait_with_timeout(&handle, Duration::from_secs(5), &stop)
            .await
            .unwrap();
        let (code, stdout, _) = runner.reap(&handle).await.unwrap();
        assert_eq!(code, 0);
        assert_eq!(stdout.trim(), "hello-from-child");
    }

    #[tokio::test]
    async fn wait_with_timeout_reports_timeout_for_a_sleeping_child() {
        let runner = TokioChildProcessRunner::new();
        let handle = runner
            .spawn(ChildSpec::new("sleep").args(["5"]))
            .await
            .unwrap();
        let stop = StopSignal::new();
        let outcome = runner
            .wait_with_timeout(&handle, Duration::from_millis(200), &stop)
            .await
            .unwrap();
        assert_eq!(outcome, ExitOutcome::TimedOut);
        runner.kill_and_reap(&handle, libc::SIGTERM).await.unwrap();
    }
}
