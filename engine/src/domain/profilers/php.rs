//! PHP profiler: one `phpspy` invocation per interpreter found by
//! `pgrep_maps`. `phpspy`'s collapsed output already tags PHP frames with
//! the `[p]` suffix the merger expects (§3 Glossary).

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

pub struct PhpSpyProfiler {
    runner: Arc<dyn ChildProcessRunner>,
    stop: StopSignal,
    storage_dir: PathBuf,
    phpspy_path: String,
    extra_timeout: Duration,
}

impl PhpSpyProfiler {
    pub fn new(
        runner: Arc<dyn ChildProcessRunner>,
        stop: StopSignal,
        storage_dir: PathBuf,
        phpspy_path: String,
    ) -> Self {
        Self {
            runner,
            stop,
            storage_dir,
            phpspy_path,
            extra_timeout: Duration::from_secs(10),
        }
    }

    fn selection_pattern() -> Regex {
        Regex::new(r"/libphp[0-9.]*\.so$").unwrap()
    }

    async fn profile_one(&self, pid: Pid, duration: Duration) -> Result<ProfileData> {
        let output = self.storage_dir.join(format!("phpspy.{}.{pid}.col", random_prefix()));
        let spec = ChildSpec::new(&self.phpspy_path).args([
            "--pid".to_string(),
            pid.to_string(),
            "--output".to_string(),
            output.display().to_string(),
            "--duration-s".to_string(),
            duration.as_secs().to_string(),
            "--pgrep".to_string(),
            "0".to_string(),
            "-b".to_string(),
            "1".to_string(),
        ]);
        run_to_completion(self.runner.as_ref(), spec, duration + self.extra_timeout, &self.stop).await?;

        let text = tokio::fs::read_to_string(&output).await?;
        let _ = tokio::fs::remove_file(&output).await;
        let counters = StackMerger::parse_single(&text);

        let mut data = ProfileData::new(counters);
        data.app_id = Some(exe_basename(pid).unwrap_or_else(|| "php".to_string()));
        Ok(data)
    }
}

#[async_trait]
impl RuntimeProfiler for PhpSpyProfiler {
    fn name(&self) -> &str {
        "php"
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
                Err(err) => warn!(pid, error = %err, "php profiler failed for this pid"),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_pattern_matches_libphp() {
        let pattern = PhpSpyProfiler::selection_pattern();
        assert!(pattern.is_match("/usr/lib/apache2/modules/libphp8.1.so"));
        assert!(!pattern.is_match("/usr/lib/libc.so.6"));
    }
}
