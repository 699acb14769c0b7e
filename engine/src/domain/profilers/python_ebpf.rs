//! Python profiler, `pyperf` (continuous eBPF) mode (§4.5). Unlike every
//! other runtime profiler this one is always-on: `start()` launches the
//! helper once, `snapshot()` sends it a dump signal and reads back whatever
//! it wrote since the last dump, and `stop()` tears it down. Grounded on
//! `profilers/python_ebpf.py`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::domain::model::{Pid, ProfileData};
use crate::domain::ports::{ChildHandle, ChildProcessRunner, ChildSpec, RuntimeProfiler, Stdio};
use crate::domain::profilers::support::{random_prefix, wait_for_file_by_prefix};
use crate::domain::services::stack_merger::StackMerger;
use crate::domain::stop_signal::StopSignal;
use crate::error::{AgentError, Result};

const DUMP_SIGNAL: i32 = libc::SIGUSR2;
const START_TIMEOUT: Duration = Duration::from_secs(10);
const DUMP_TIMEOUT: Duration = Duration::from_secs(5);

/// Verifies the environment PyPerf needs before it is spawned: the agent
/// must be in the initial PID namespace, `RLIMIT_MEMLOCK` must be
/// unlimited, and debugfs must be mounted at `/sys/kernel/debug`. Kept as a
/// trait so tests can substitute a stub that always passes.
pub trait EbpfEnvironment: Send + Sync {
    fn ensure_ready(&self) -> Result<()>;
}

pub struct LinuxEbpfEnvironment;

impl EbpfEnvironment for LinuxEbpfEnvironment {
    fn ensure_ready(&self) -> Result<()> {
        #[cfg(target_os = "linux")]
        {
            if !crate::infrastructure::process_namespace::is_init_pid_namespace()? {
                return Err(AgentError::UnsupportedEnvironment(
                    "pyperf must run in the initial PID namespace".to_string(),
                ));
            }
            nix::sys::resource::setrlimit(
                nix::sys::resource::Resource::RLIMIT_MEMLOCK,
                nix::sys::resource::RLIM_INFINITY,
                nix::sys::resource::RLIM_INFINITY,
            )
            .map_err(|e| AgentError::UnsupportedEnvironment(format!("raising RLIMIT_MEMLOCK: {e}")))?;
            crate::infrastructure::process_namespace::ensure_debugfs_mounted()?;
        }
        Ok(())
    }
}

struct Running {
    handle: ChildHandle,
    output_path: PathBuf,
}

pub struct PyperfProfiler {
    runner: Arc<dyn ChildProcessRunner>,
    environment: Arc<dyn EbpfEnvironment>,
    storage_dir: PathBuf,
    pyperf_path: String,
    frequency_hz: u32,
    running: Mutex<Option<Running>>,
}

impl PyperfProfiler {
    pub fn new(
        runner: Arc<dyn ChildProcessRunner>,
        environment: Arc<dyn EbpfEnvironment>,
        storage_dir: PathBuf,
        pyperf_path: String,
        frequency_hz: u32,
    ) -> Self {
        Self {
            runner,
            environment,
            storage_dir,
            pyperf_path,
            frequency_hz,
            running: Mutex::new(None),
        }
    }
}

#[async_trait]
impl RuntimeProfiler for PyperfProfiler {
    fn name(&self) -> &str {
        "python"
    }

    async fn start(&self) -> Result<()> {
        self.environment.ensure_ready()?;

        let output_path = self.storage_dir.join(format!("pyperf.{}.col", random_prefix()));
        let _ = tokio::fs::remove_file(&output_path).await;

        let spec = ChildSpec::new(&self.pyperf_path)
            .args([
                "--output".to_string(),
                output_path.display().to_string(),
                "-F".to_string(),
                self.frequency_hz.to_string(),
            ])
            .stdout_mode(Stdio::Pipe)
            .stderr_mode(Stdio::Pipe);
        let handle = self.runner.spawn(spec).await?;

        let stop = StopSignal::new();
        if let Err(err) = wait_transient_file(&output_path, START_TIMEOUT, &stop).await {
            let _ = self.runner.kill_and_reap(&handle, libc::SIGKILL).await;
            error!(error = %err, "pyperf failed to start");
            return Err(err);
        }

        *self.running.lock().await = Some(Running { handle, output_path });
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(running) = self.running.lock().await.take() {
            self.runner.kill_and_reap(&running.handle, libc::SIGTERM).await?;
        }
        Ok(())
    }

    async fn snapshot(&self, duration: Duration) -> Result<HashMap<Pid, ProfileData>> {
        tokio::time::sleep(duration).await;

        let mut guard = self.running.lock().await;
        let Some(running) = guard.as_ref() else {
            return Err(AgentError::UnsupportedEnvironment(
                "pyperf snapshot requested before start()".to_string(),
            ));
        };

        self.runner.send_signal(&running.handle, DUMP_SIGNAL).await?;

        let dump_prefix = format!("{}.", running.output_path.display());
        let parent = running
            .output_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name_prefix = running
            .output_path
            .file_name()
            .map(|n| format!("{}.", n.to_string_lossy()))
            .unwrap_or(dump_prefix);

        let stop = StopSignal::new();
        let dump = match wait_for_file_by_prefix(&parent, &file_name_prefix, DUMP_TIMEOUT, &stop).await {
            Ok(path) => path,
            Err(_) => {
                warn!("pyperf dead/not responding, killing it");
                let handle = guard.take().unwrap().handle;
                drop(guard);
                let (exit_code, stdout, stderr) =
                    self.runner.reap(&handle).await.unwrap_or((-1, String::new(), String::new()));
                return Err(AgentError::ChildFailed {
                    exit_code: Some(exit_code),
                    stdout,
                    stderr,
                });
            }
        };

        let text = tokio::fs::read_to_string(&dump).await?;
        let _ = tokio::fs::remove_file(&dump).await;

        let mut by_pid: HashMap<Pid, ProfileData> = HashMap::new();
        for counters in StackMerger::parse_system_wide(&text).iter() {
            let (pid, counters) = counters;
            by_pid.insert(pid, ProfileData::new(counters.clone()));
        }
        Ok(by_pid)
    }
}

async fn wait_transient_file(path: &PathBuf, timeout: Duration, stop: &StopSignal) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if stop.is_set() {
            return Err(AgentError::Stopped);
        }
        if tokio::fs::metadata(path).await.is_ok() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(AgentError::Timeout {
                operation: format!("waiting for pyperf transient file {}", path.display()),
            });
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysReady;
    impl EbpfEnvironment for AlwaysReady {
        fn ensure_ready(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn environment_stub_is_usable_as_trait_object() {
        let env: Arc<dyn EbpfEnvironment> = Arc::new(AlwaysReady);
        assert!(env.ensure_ready().is_ok());
    }
}
