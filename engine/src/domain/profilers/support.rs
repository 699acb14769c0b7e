//! Shared plumbing for the spawn-per-cycle runtime profilers (§4.4):
//! building a randomized output path, waiting for a helper to produce a
//! file (optionally matched by prefix when multiple candidates can appear,
//! per SPEC_FULL §10.6's "multi-match handling preserved"), and running one
//! helper invocation to completion with a timeout.
//!
//! Grounded on `utils/__init__.py`'s `random_prefix`, `wait_for_file_by_prefix`
//! and `run_process`, and on `dotnet.py`'s per-PID spawn/collect/parse shape.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::domain::ports::{ChildHandle, ChildProcessRunner, ChildSpec, ExitOutcome};
use crate::domain::stop_signal::StopSignal;
use crate::error::{AgentError, Result};

/// A short random token used to disambiguate concurrent helper output files
/// for the same PID across cycles.
pub fn random_prefix() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Poll `dir` until a file whose name starts with `prefix` appears, or
/// `timeout` elapses. If more than one match exists, the newest is returned
/// and the rest are removed with a warning, mirroring the original's
/// tolerance for a stale file left behind by a missed prior cycle.
pub async fn wait_for_file_by_prefix(
    dir: &Path,
    prefix: &str,
    timeout: Duration,
    stop: &StopSignal,
) -> Result<PathBuf> {
    let deadline = Instant::now() + timeout;
    loop {
        if stop.is_set() {
            return Err(AgentError::Stopped);
        }
        let mut matches = scan_prefix(dir, prefix);
        if !matches.is_empty() {
            matches.sort();
            let newest = matches.pop().unwrap();
            for stale in matches {
                tracing::warn!(file = %stale.display(), "multiple dump files found, keeping newest");
                let _ = std::fs::remove_file(stale);
            }
            return Ok(newest);
        }
        if Instant::now() >= deadline {
            return Err(AgentError::Timeout {
                operation: format!("waiting for {prefix}* in {}", dir.display()),
            });
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn scan_prefix(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|n| n.starts_with(prefix))
                .unwrap_or(false)
        })
        .map(|e| e.path())
        .collect()
}

/// Spawn `spec`, wait up to `timeout` for it to exit, and reap its output.
/// A non-zero exit or a timeout (which kills and reaps before returning) is
/// surfaced as `AgentError::ChildFailed`/`AgentError::Timeout` respectively,
/// matching the original's "treat a stuck helper as a crash" policy.
pub async fn run_to_completion(
    runner: &dyn ChildProcessRunner,
    spec: ChildSpec,
    timeout: Duration,
    stop: &StopSignal,
) -> Result<(ChildHandle, String, String)> {
    let handle = runner.spawn(spec).await?;
    match runner.wait_with_timeout(&handle, timeout, stop).await? {
        ExitOutcome::Exited(0) => {
            let (_, stdout, stderr) = runner.reap(&handle).await?;
            Ok((handle, stdout, stderr))
        }
        ExitOutcome::Exited(code) => {
            let (_, stdout, stderr) = runner.reap(&handle).await?;
            Err(AgentError::ChildFailed {
                exit_code: Some(code),
                stdout,
                stderr,
            })
        }
        ExitOutcome::TimedOut => {
            runner.kill_and_reap(&handle, libc::SIGKILL).await?;
            Err(AgentError::Timeout {
                operation: "waiting for profiler helper to exit".to_string(),
            })
        }
        ExitOutcome::Stopped => Err(AgentError::Stopped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_prefix_is_eight_hex_chars() {
        let p = random_prefix();
        assert_eq!(p.len(), 8);
        assert!(p.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
