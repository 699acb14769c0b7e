//! .NET profiler: one `dotnet-trace collect --format speedscope` invocation
//! per process found by `pgrep_exe`, converted via
//! [`crate::domain::services::speedscope_loader`] (§4.4). Container
//! detection no longer parses digits out of a diagnostics-socket name (the
//! original's brittle heuristic, see SPEC_FULL §10.7); it compares the
//! candidate's PID namespace inode against the agent's own.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::warn;

use crate::domain::model::{Pid, ProfileData};
use crate::domain::ports::{ChildProcessRunner, ChildSpec, RuntimeProfiler};
use crate::domain::profilers::process_select::{exe_basename, pgrep_exe};
use crate::domain::profilers::support::{random_prefix, run_to_completion};
use crate::domain::services::speedscope_loader::load_speedscope_as_collapsed;
use crate::domain::stop_signal::StopSignal;
use crate::error::Result;
use crate::infrastructure::process_namespace::pid_namespace_inode;

pub struct DotnetProfiler {
    runner: Arc<dyn ChildProcessRunner>,
    stop: StopSignal,
    storage_dir: PathBuf,
    dotnet_trace_path: String,
    extra_timeout: Duration,
    agent_pid_ns_inode: Option<u64>,
}

impl DotnetProfiler {
    pub fn new(
        runner: Arc<dyn ChildProcessRunner>,
        stop: StopSignal,
        storage_dir: PathBuf,
        dotnet_trace_path: String,
    ) -> Self {
        Self {
            runner,
            stop,
            storage_dir,
            dotnet_trace_path,
            extra_timeout: Duration::from_secs(10),
            agent_pid_ns_inode: pid_namespace_inode(std::process::id()).ok(),
        }
    }

    fn selection_pattern() -> Regex {
        Regex::new(r"/dotnet(?:[0-9.]*)?$").unwrap()
    }

    /// True when `pid` is in a different PID namespace than this agent,
    /// i.e. it is running in a container.
    fn is_containerized(&self, pid: Pid) -> bool {
        match (self.agent_pid_ns_inode, pid_namespace_inode(pid).ok()) {
            (Some(ours), Some(theirs)) => ours != theirs,
            _ => false,
        }
    }

    async fn profile_one(&self, pid: Pid, duration: Duration) -> Result<ProfileData> {
        let output = self.storage_dir.join(format!("dotnet-trace.{}.{pid}.speedscope.json", random_prefix()));
        let spec = ChildSpec::new(&self.dotnet_trace_path).args([
            "collect".to_string(),
            "--format".to_string(),
            "speedscope".to_string(),
            "--process-id".to_string(),
            pid.to_string(),
            "--output".to_string(),
            output.display().to_string(),
            "--duration".to_string(),
            format_duration(duration),
        ]);
        run_to_completion(self.runner.as_ref(), spec, duration + self.extra_timeout, &self.stop).await?;

        let json = tokio::fs::read_to_string(&output).await?;
        let _ = tokio::fs::remove_file(&output).await;
        let counters = load_speedscope_as_collapsed(&json)?;

        let mut data = ProfileData::new(counters);
        data.app_id = Some(exe_basename(pid).unwrap_or_else(|| "dotnet".to_string()));
        if self.is_containerized(pid) {
            data.container_name = Some(format!("pid-ns-{pid}"));
        }
        Ok(data)
    }
}

/// `HH:MM:SS`, the format `dotnet-trace --duration` expects.
fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

#[async_trait]
impl RuntimeProfiler for DotnetProfiler {
    fn name(&self) -> &str {
        "dotnet"
    }

    async fn select_processes(&self) -> Result<Vec<Pid>> {
        Ok(pgrep_exe(&Self::selection_pattern()))
    }

    async fn snapshot(&self, duration: Duration) -> Result<HashMap<Pid, ProfileData>> {
        let pids = self.select_processes().await?;
        let mut out = HashMap::new();
        for pid in pids {
            match self.profile_one(pid, duration).await {
                Ok(data) => {
                    out.insert(pid, data);
                }
                Err(err) => warn!(pid, error = %err, "dotnet profiler failed for this pid"),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_pattern_matches_dotnet_binary() {
        let pattern = DotnetProfiler::selection_pattern();
        assert!(pattern.is_match("/usr/share/dotnet/dotnet"));
        assert!(!pattern.is_match("/usr/bin/dotnetty"));
    }

    #[test]
    fn duration_formats_as_hh_mm_ss() {
        assert_eq!(format_duration(Duration::from_secs(3725)), "01:02:05");
        assert_eq!(format_duration(Duration::from_secs(59)), "00:00:59");
    }
}
