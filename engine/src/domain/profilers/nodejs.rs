//! Node.js profiler: one `perf`-based collapse-stack helper invocation per
//! `node` executable found by `pgrep_exe`, mirroring the Java/Python/Ruby
//! spawn-per-cycle shape (§4.4). The bundled helper wraps V8's
//! `--perf-basic-prof` JIT symbol map with the same `perf record`/`perf
//! script` pipeline the system sampler uses, so its output needs no further
//! conversion before being merged.

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
use crate::domain::services::stack_merger::StackMerger;
use crate::domain::stop_signal::StopSignal;
use crate::error::Result;

pub struct NodeProfiler {
    runner: Arc<dyn ChildProcessRunner>,
    stop: StopSignal,
    storage_dir: PathBuf,
    helper_path: String,
    extra_timeout: Duration,
}

impl NodeProfiler {
    pub fn new(
        runner: Arc<dyn ChildProcessRunner>,
        stop: StopSignal,
        storage_dir: PathBuf,
        helper_path: String,
    ) -> Self {
        Self {
            runner,
            stop,
            storage_dir,
            helper_path,
            extra_timeout: Duration::from_secs(10),
        }
    }

    fn selection_pattern() -> Regex {
        Regex::new(r"/node(?:[0-9.]*)?$").unwrap()
    }

    async fn profile_one(&self, pid: Pid, duration: Duration) -> Result<ProfileData> {
        let output = self.storage_dir.join(format!("node-stack.{}.{pid}.col", random_prefix()));
        let spec = ChildSpec::new(&self.helper_path).args([
            "--pid".to_string(),
            pid.to_string(),
            "--duration".to_string(),
            duration.as_secs().to_string(),
            "--output".to_string(),
            output.display().to_string(),
        ]);
        run_to_completion(self.runner.as_ref(), spec, duration + self.extra_timeout, &self.stop).await?;

        let text = tokio::fs::read_to_string(&output).await?;
        let _ = tokio::fs::remove_file(&output).await;
        let counters = StackMerger::parse_single(&text);

        let mut data = ProfileData::new(counters);
        data.app_id = Some(exe_basename(pid).unwrap_or_else(|| "nodejs".to_string()));
        Ok(data)
    }
}

#[async_trait]
impl RuntimeProfiler for NodeProfiler {
    fn name(&self) -> &str {
        "nodejs"
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
                Err(err) => warn!(pid, error = %err, "nodejs profiler failed for this pid"),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_pattern_matches_node_binary() {
        let pattern = NodeProfiler::selection_pattern();
        assert!(pattern.is_match("/usr/bin/node"));
        assert!(!pattern.is_match("/usr/bin/nodemon"));
    }
}
