//! Java profiler: async-profiler's `asprof` attached to each JVM found by
//! `pgrep_jvm`, invoked once per process per cycle in "collapsed" output
//! mode so no separate conversion step is needed (§4.4).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::domain::model::{Pid, ProfileData};
use crate::domain::ports::{ChildProcessRunner, ChildSpec, RuntimeProfiler};
use crate::domain::profilers::process_select::{exe_basename, pgrep_jvm};
use crate::domain::profilers::support::run_to_completion;
use crate::domain::services::stack_merger::StackMerger;
use crate::domain::stop_signal::StopSignal;
use crate::error::Result;

pub struct JavaProfiler {
    runner: Arc<dyn ChildProcessRunner>,
    stop: StopSignal,
    storage_dir: PathBuf,
    asprof_path: String,
    extra_timeout: Duration,
}

impl JavaProfiler {
    pub fn new(
        runner: Arc<dyn ChildProcessRunner>,
        stop: StopSignal,
        storage_dir: PathBuf,
        asprof_path: String,
    ) -> Self {
        Self {
            runner,
            stop,
            storage_dir,
            asprof_path,
            extra_timeout: Duration::from_secs(10),
        }
    }

    async fn profile_one(&self, pid: Pid, duration: Duration) -> Result<ProfileData> {
        let output = output_path(&self.storage_dir, pid);
        let spec = ChildSpec::new(&self.asprof_path).args([
            "-d".to_string(),
            duration.as_secs().to_string(),
            "-o".to_string(),
            "collapsed".to_string(),
            "-f".to_string(),
            output.display().to_string(),
            pid.to_string(),
        ]);
        run_to_completion(self.runner.as_ref(), spec, duration + self.extra_timeout, &self.stop).await?;

        let text = tokio::fs::read_to_string(&output).await?;
        let _ = tokio::fs::remove_file(&output).await;
        let counters = StackMerger::parse_single(&text);

        let mut data = ProfileData::new(counters);
        data.app_id = Some(exe_basename(pid).unwrap_or_else(|| "java".to_string()));
        Ok(data)
    }
}

fn output_path(storage_dir: &std::path::Path, pid: Pid) -> PathBuf {
    storage_dir.join(format!("async-profiler.{pid}.collapsed"))
}

#[async_trait]
impl RuntimeProfiler for JavaProfiler {
    fn name(&self) -> &str {
        "java"
    }

    async fn select_processes(&self) -> Result<Vec<Pid>> {
        Ok(pgrep_jvm())
    }

    async fn snapshot(&self, duration: Duration) -> Result<HashMap<Pid, ProfileData>> {
        let pids = self.select_processes().await?;
        let mut out = HashMap::new();
        for pid in pids {
            match self.profile_one(pid, duration).await {
                Ok(data) => {
                    out.insert(pid, data);
                }
                Err(err) => warn!(pid, error = %err, "java profiler failed for this pid"),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_is_scoped_by_pid() {
        assert_eq!(
            output_path(&PathBuf::from("/tmp"), 42),
            PathBuf::from("/tmp/async-profiler.42.collapsed")
        );
    }
}
