//! Python profiler, `py-spy` mode: one `py-spy record` invocation per
//! interpreter found by `pgrep_maps`, emitting raw collapsed output
//! directly (§4.4). The always-on eBPF alternative lives in
//! [`super::python_ebpf`] and is selected by the same `--python-mode` flag.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::warn;

use crate::domain::model::{Pid, ProfileData};
use crate::domain::ports::{ChildProcessRunner, ChildSpec, RuntimeProfiler};
use crate::domain::profilers::process_select::{exe_basename, pgrep_maps};
use crate::domain::profilers::support::{random_prefix, run_to_completion};
use crate::domain::services::stack_merger::StackMerger;
use crate::domain::stop_signal::StopSignal;
use crate::error::Result;

pub struct PySpyProfiler {
    runner: Arc<dyn ChildProcessRunner>,
    stop: StopSignal,
    storage_dir: PathBuf,
    pyspy_path: String,
    extra_timeout: Duration,
}

impl PySpyProfiler {
    pub fn new(
        runner: Arc<dyn ChildProcessRunner>,
        stop: StopSignal,
        storage_dir: PathBuf,
        pyspy_path: String,
    ) -> Self {
        Self {
            runner,
            stop,
            storage_dir,
            pyspy_path,
            extra_timeout: Duration::from_secs(10),
        }
    }

    fn selection_pattern() -> Regex {
        Regex::new(r"/(lib)?python[0-9.]*(\.so(\.\d+)*)?$").unwrap()
    }

    async fn profile_one(&self, pid: Pid, duration: Duration) -> Result<ProfileData> {
        let output = self.storage_dir.join(format!("py-spy.{}.{pid}.col", random_prefix()));
        let spec = ChildSpec::new(&self.pyspy_path).args([
            "record".to_string(),
            "-f".to_string(),
            "raw".to_string(),
            "--nonblocking".to_string(),
            "-o".to_string(),
            output.display().to_string(),
            "--duration".to_string(),
            duration.as_secs().to_string(),
            "--pid".to_string(),
            pid.to_string(),
        ]);
        run_to_completion(self.runner.as_ref(), spec, duration + self.extra_timeout, &self.stop).await?;

        let text = tokio::fs::read_to_string(&output).await?;
        let _ = tokio::fs::remove_file(&output).await;
        let counters = StackMerger::parse_single(&text);

        let mut data = ProfileData::new(counters);
        data.app_id = Some(exe_basename(pid).unwrap_or_else(|| "python".to_string()));
        Ok(data)
    }
}

#[async_trait]
impl RuntimeProfiler for PySpyProfiler {
    fn name(&self) -> &str {
        "python"
    }

    async fn select_processes(&self) -> Result<Vec<Pid>> {
        Ok(pgrep_maps(&Self::selection_pattern()))
    }

    async fn snapshot(&self, duration: Duration) -> Result<HashMap<Pid, ProfileData>> {
        let pids = self.select_processes().await?;
        let mut out = HashMap::new();
        for pid in pids {
            match self.profile_one(pid, duration).await {
                Ok(data) => {
                    out.insert(pid, data);
                }
                Err(err) => warn!(pid, error = %err, "python profiler failed for this pid"),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_pattern_matches_libpython() {
        let pattern = PySpyProfiler::selection_pattern();
        assert!(pattern.is_match("/usr/lib/x86_64-linux-gnu/libpython3.10.so.1.0"));
        assert!(!pattern.is_match("/usr/lib/libc.so.6"));
    }
}
