//! System-sampler supervisor ("perf supervisor", §4.3).
//!
//! Owns one long-running system-wide sampler child process and drives it
//! through `Stopped -> Starting -> Running -> Rotating -> Running |
//! Restarting | Failed`. One instance exists per active sampling mode (FP
//! and/or DWARF); the orchestrator holds up to two.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::constants::perf::{
    BASELINE_COLLECTION_COUNT, DUMP_TIMEOUT, MEMORY_USAGE_THRESHOLD_BYTES, MMAP_PAGES_DWARF,
    MMAP_PAGES_FP, RESTART_AFTER, RSS_GROWTH_THRESHOLD_BYTES,
};
use crate::domain::ports::{ChildHandle, ChildProcessRunner, ChildSpec, ExitOutcome, Stdio};
use crate::domain::process_registry::ProcessRegistry;
use crate::domain::stop_signal::StopSignal;
use crate::error::{AgentError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerMode {
    Fp,
    Dwarf,
}

impl SamplerMode {
    pub fn mmap_pages(self) -> u32 {
        match self {
            SamplerMode::Fp => MMAP_PAGES_FP,
            SamplerMode::Dwarf => MMAP_PAGES_DWARF,
        }
    }

    fn unwind_flag(self) -> &'static str {
        match self {
            SamplerMode::Fp => "-g",
            SamplerMode::Dwarf => "--call-graph=dwarf",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    Stopped,
    Starting,
    Running,
    Rotating,
    Restarting,
    Failed,
}

#[derive(Debug, Default)]
struct RssBaseline {
    readings: Vec<u64>,
    mean: Option<u64>,
}

impl RssBaseline {
    fn record(&mut self, rss: u64) {
        if self.mean.is_some() {
            return;
        }
        self.readings.push(rss);
        if self.readings.len() >= BASELINE_COLLECTION_COUNT {
            let sum: u64 = self.readings.iter().sum();
            self.mean = Some(sum / self.readings.len() as u64);
        }
    }

    fn clear(&mut self) {
        self.readings.clear();
        self.mean = None;
    }
}

pub struct PerfSupervisorConfig {
    pub mode: SamplerMode,
    pub frequency_hz: u32,
    pub output_path: PathBuf,
    pub rotation_timeout_s: u64,
    pub perf_binary: String,
    pub extra_args: Vec<String>,
    pub inject_jit: bool,
}

/// One long-running sampler instance and its supervisory state.
pub struct PerfSupervisor {
    config: PerfSupervisorConfig,
    runner: std::sync::Arc<dyn ChildProcessRunner>,
    registry: std::sync::Arc<ProcessRegistry>,
    state: Mutex<SamplerState>,
    handle: Mutex<Option<ChildHandle>>,
    started_at: Mutex<Option<Instant>>,
    baseline: Mutex<RssBaseline>,
}

impl PerfSupervisor {
    pub fn new(
        config: PerfSupervisorConfig,
        runner: std::sync::Arc<dyn ChildProcessRunner>,
        registry: std::sync::Arc<ProcessRegistry>,
    ) -> Self {
        Self {
            config,
            runner,
            registry,
            state: Mutex::new(SamplerState::Stopped),
            handle: Mutex::new(None),
            started_at: Mutex::new(None),
            baseline: Mutex::new(RssBaseline::default()),
        }
    }

    pub fn state(&self) -> SamplerState {
        *self.state.lock().unwrap()
    }

    pub fn mode(&self) -> SamplerMode {
        self.config.mode
    }

    fn set_state(&self, state: SamplerState) {
        *self.state.lock().unwrap() = state;
    }

    /// `Stopped -> Starting -> Running`.
    pub async fn start(&self, stop: &StopSignal) -> Result<()> {
        self.set_state(SamplerState::Starting);

        cleanup_rotated_files(&self.config.output_path)?;

        let mut args = vec![
            "record".to_string(),
            "-F".to_string(),
            self.config.frequency_hz.to_string(),
            self.config.mode.unwind_flag().to_string(),
            "-o".to_string(),
            self.config.output_path.display().to_string(),
            "--switch-output".to_string(),
            format!("{}s,signal", self.config.rotation_timeout_s),
            "--switch-max-files=1".to_string(),
            "-m".to_string(),
            self.config.mode.mmap_pages().to_string(),
            "-a".to_string(),
        ];
        args.extend(self.config.extra_args.iter().cloned());

        let spec = ChildSpec::new(&self.config.perf_binary)
            .args(args)
            .stdout_mode(Stdio::Pipe)
            .stderr_mode(Stdio::Pipe);

        let handle = self
            .runner
            .spawn(spec)
            .await
            .map_err(|_| AgentError::ProgramMissing(self.config.perf_binary.clone()))?;
        self.registry.track(&handle);

        wait_for_file(&self.config.output_path, DUMP_TIMEOUT, stop).await?;

        *self.handle.lock().unwrap() = Some(handle);
        *self.started_at.lock().unwrap() = Some(Instant::now());
        self.baseline.lock().unwrap().clear();
        self.set_state(SamplerState::Running);
        info!(mode = ?self.config.mode, "perf supervisor started");
        Ok(())
    }

    /// `Running -> Rotating -> Running` (or `Restarting` on crash/memory
    /// breach detected during the health check that precedes rotation).
    /// Returns the scripted collapsed text for the prior cycle, or `None` on
    /// rotation timeout (data for this cycle is lost, sampler keeps running).
    pub async fn rotate(&self, stop: &StopSignal) -> Result<Option<String>> {
        if let Some(restart_reason) = self.health_check().await? {
            warn!(mode = ?self.config.mode, reason = restart_reason, "restarting sampler");
            self.restart(stop).await?;
            return Ok(None);
        }

        self.set_state(SamplerState::Rotating);
        cleanup_rotated_files(&self.config.output_path)?;

        let handle = self.handle.lock().unwrap().clone();
        let Some(handle) = handle else {
            self.set_state(SamplerState::Failed);
            return Ok(None);
        };

        self.runner.send_signal(&handle, libc::SIGUSR2).await?;

        let rotated = match wait_for_rotated_file(&self.config.output_path, DUMP_TIMEOUT, stop).await {
            Ok(path) => path,
            Err(_) => {
                warn!(mode = ?self.config.mode, "rotation timed out, keeping sampler alive");
                self.set_state(SamplerState::Running);
                return Ok(None);
            }
        };

        let text = self.script_decode(&rotated).await.ok();
        let _ = std::fs::remove_file(&rotated);
        self.set_state(SamplerState::Running);
        Ok(text)
    }

    /// Decide whether the sampler needs restarting: crashed, alive too long
    /// with high RSS, or RSS grew past baseline. Returns `Some(reason)` when
    /// a restart is warranted.
    async fn health_check(&self) -> Result<Option<&'static str>> {
        let handle = self.handle.lock().unwrap().clone();
        let Some(handle) = handle else {
            return Ok(Some("not running"));
        };

        if !self.runner.is_running(&handle).await? {
            return Ok(Some("crashed"));
        }

        let Some(rss) = self.runner.rss_bytes(&handle).await? else {
            return Ok(None);
        };

        {
            let mut baseline = self.baseline.lock().unwrap();
            baseline.record(rss);
        }

        let started_at = *self.started_at.lock().unwrap();
        if let Some(started_at) = started_at {
            if started_at.elapsed() >= RESTART_AFTER && rss >= MEMORY_USAGE_THRESHOLD_BYTES {
                return Ok(Some("time+memory threshold"));
            }
        }

        let baseline_mean = self.baseline.lock().unwrap().mean;
        if let Some(baseline_mean) = baseline_mean {
            if rss.saturating_sub(baseline_mean) > RSS_GROWTH_THRESHOLD_BYTES {
                return Ok(Some("rss growth"));
            }
        }

        Ok(None)
    }

    /// `Running -> Restarting -> Starting -> Running`.
    async fn restart(&self, stop: &StopSignal) -> Result<()> {
        self.set_state(SamplerState::Restarting);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = self.runner.kill_and_reap(&handle, libc::SIGTERM).await;
            self.registry.untrack(&handle);
        }
        self.baseline.lock().unwrap().clear();
        self.start(stop).await
    }

    pub async fn stop(&self) -> Result<()> {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            self.runner.kill_and_reap(&handle, libc::SIGTERM).await?;
            self.registry.untrack(&handle);
        }
        self.set_state(SamplerState::Stopped);
        Ok(())
    }

    /// Run `perf script` (and, if configured, `perf inject --jit` first) to
    /// turn the rotated binary data file into collapsed-compatible text.
    async fn script_decode(&self, data_file: &Path) -> Result<String> {
        let input = if self.config.inject_jit {
            let injected = data_file.with_extension("inject");
            let spec = ChildSpec::new(&self.config.perf_binary).args([
                "inject".to_string(),
                "--jit".to_string(),
                "-i".to_string(),
                data_file.display().to_string(),
                "-o".to_string(),
                injected.display().to_string(),
            ]);
            let handle = self.runner.spawn(spec).await?;
            self.runner.reap(&handle).await?;
            injected
        } else {
            data_file.to_path_buf()
        };

        let spec = ChildSpec::new(&self.config.perf_binary).args([
            "script".to_string(),
            "-F".to_string(),
            "+pid".to_string(),
            "-i".to_string(),
            input.display().to_string(),
        ]);
        let handle = self.runner.spawn(spec).await?;
        let (exit_code, stdout, stderr) = self.runner.reap(&handle).await?;
        if input != data_file {
            let _ = std::fs::remove_file(&input);
        }
        if exit_code != 0 {
            return Err(AgentError::ChildFailed {
                exit_code: Some(exit_code),
                stdout,
                stderr,
            });
        }
        Ok(stdout)
    }
}

async fn wait_for_file(path: &Path, timeout: Duration, stop: &StopSignal) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if stop.is_set() {
            return Err(AgentError::Stopped);
        }
        if tokio::fs::metadata(path).await.is_ok() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(AgentError::Timeout {
                operation: format!("waiting for {}", path.display()),
            });
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Wait for exactly one `path.<suffix>` rotated file to appear. If more than
/// one is present by the time the wait resolves, keep the newest and delete
/// the rest (original behavior preserved per SPEC_FULL §10.6), logging a
/// warning — this should only happen after a missed prior rotation.
async fn wait_for_rotated_file(path: &Path, timeout: Duration, stop: &StopSignal) -> Result<PathBuf> {
    let deadline = Instant::now() + timeout;
    loop {
        if stop.is_set() {
            return Err(AgentError::Stopped);
        }
        let mut matches = rotated_files(path)?;
        if !matches.is_empty() {
            matches.sort();
            let newest = matches.pop().unwrap();
            if !matches.is_empty() {
                warn!(count = matches.len(), "multiple rotated files found, keeping newest");
                for stale in matches {
                    let _ = std::fs::remove_file(stale);
                }
            }
            return Ok(newest);
        }
        if Instant::now() >= deadline {
            return Err(AgentError::Timeout {
                operation: format!("waiting for rotated file at {}", path.display()),
            });
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn rotated_files(path: &Path) -> Result<Vec<PathBuf>> {
    let Some(parent) = path.parent() else {
        return Ok(Vec::new());
    };
    let prefix = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    if !parent.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in std::fs::read_dir(parent)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&format!("{prefix}.")) {
            out.push(entry.path());
        }
    }
    Ok(out)
}

fn cleanup_rotated_files(path: &Path) -> Result<()> {
    for file in rotated_files(path)? {
        debug!(file = %file.display(), "removing stale rotated file");
        let _ = std::fs::remove_file(file);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_is_mean_of_first_three_readings() {
        let mut baseline = RssBaseline::default();
        baseline.record(100);
        baseline.record(200);
        assert_eq!(baseline.mean, None);
        baseline.record(300);
        assert_eq!(baseline.mean, Some(200));
        baseline.record(999_999); // ignored once set
        assert_eq!(baseline.mean, Some(200));
    }

    #[test]
    fn mmap_pages_match_spec_constants() {
        assert_eq!(SamplerMode::Fp.mmap_pages(), 129);
        assert_eq!(SamplerMode::Dwarf.mmap_pages(), 257);
    }
}
