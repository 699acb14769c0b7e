//! Explicit, owned registry of live child processes.
//!
//! The original implementation keeps this as module-level global state
//! (`_processes: List[Popen]`); per the design notes this is reimplemented as
//! a plain object owned by the orchestrator and threaded into the child
//! runner, with no global anywhere in this crate.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::domain::ports::{ChildHandle, ChildProcessRunner};

/// Signal the termination handler sends first: `SIGKILL` everywhere this
/// crate targets (Windows has no `ChildProcessRunner` adapter yet, so the
/// `SIGTERM`-on-Windows half of §4.1's guarantee has nothing to wire up to).
#[cfg(unix)]
const TERMINATION_SIGNAL: i32 = libc::SIGKILL;
#[cfg(not(unix))]
const TERMINATION_SIGNAL: i32 = libc::SIGTERM;

#[derive(Debug, Default)]
pub struct ProcessRegistry {
    pids: Mutex<HashSet<u32>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, handle: &ChildHandle) {
        self.pids.lock().unwrap().insert(handle.pid);
    }

    pub fn untrack(&self, handle: &ChildHandle) {
        self.pids.lock().unwrap().remove(&handle.pid);
    }

    /// All currently tracked PIDs, e.g. for the termination handler to kill.
    pub fn snapshot(&self) -> Vec<u32> {
        self.pids.lock().unwrap().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.pids.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The termination handler (§4.1, §5 Cancellation): every process still
    /// in the registry receives a kill. Untracking happens as a side effect
    /// of `runner.kill_and_reap`'s `reap`, so a process that exits mid-sweep
    /// is simply a no-op for its own kill attempt.
    pub async fn terminate_all(&self, runner: &dyn ChildProcessRunner) {
        for pid in self.snapshot() {
            let handle = ChildHandle { pid };
            if let Err(e) = runner.kill_and_reap(&handle, TERMINATION_SIGNAL).await {
                tracing::warn!(pid, error = %e, "failed to kill registered process on shutdown");
            }
            self.untrack(&handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::domain::ports::{ChildSpec, ExitOutcome};
    use crate::domain::stop_signal::StopSignal;
    use crate::error::Result;

    #[test]
    fn track_and_untrack_round_trip() {
        let registry = ProcessRegistry::new();
        let handle = ChildHandle { pid: 4242 };
        registry.track(&handle);
        assert_eq!(registry.snapshot(), vec![4242]);
        registry.untrack(&handle);
        assert!(registry.is_empty());
    }

    /// Hand-rolled mock `ChildProcessRunner` recording which PIDs it was
    /// asked to kill, following the teacher's `MockProcessExecutor`
    /// convention rather than pulling in `mockall`.
    #[derive(Default)]
    struct RecordingRunner {
        killed: StdMutex<Vec<u32>>,
    }

    #[async_trait]
    impl ChildProcessRunner for RecordingRunner {
        async fn spawn(&self, _spec: ChildSpec) -> Result<ChildHandle> {
            unreachable!("not exercised by this test")
        }
        async fn wait_with_timeout(
            &self,
            _handle: &ChildHandle,
            _timeout: Duration,
            _stop: &StopSignal,
        ) -> Result<ExitOutcome> {
            unreachable!("not exercised by this test")
        }
        async fn send_signal(&self, _handle: &ChildHandle, _signal: i32) -> Result<()> {
            Ok(())
        }
        async fn reap(&self, _handle: &ChildHandle) -> Result<(i32, String, String)> {
            Ok((0, String::new(), String::new()))
        }
        async fn kill_and_reap(&self, handle: &ChildHandle, _signal: i32) -> Result<()> {
            self.killed.lock().unwrap().push(handle.pid);
            Ok(())
        }
        async fn is_running(&self, _handle: &ChildHandle) -> Result<bool> {
            Ok(false)
        }
        async fn rss_bytes(&self, _handle: &ChildHandle) -> Result<Option<u64>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn terminate_all_kills_every_registered_pid_and_empties_the_registry() {
        let registry = ProcessRegistry::new();
        registry.track(&ChildHandle { pid: 10 });
        registry.track(&ChildHandle { pid: 11 });

        let runner = RecordingRunner::default();
        registry.terminate_all(&runner).await;

        let mut killed = runner.killed.lock().unwrap().clone();
        killed.sort_unstable();
        assert_eq!(killed, vec![10, 11]);
        assert!(registry.is_empty());
    }
}
