//! The orchestrator ("profile session", §4.6). Drives cycles, fans out to
//! the system sampler(s) and per-runtime profilers in parallel, merges,
//! enriches, and emits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::constants::profiler::SNAPSHOT_TIMEOUT_SLACK;
use crate::domain::model::{Pid, ProfileMetadata, StackSampleCounters};
use crate::domain::ports::{ContainerNameLookup, EmitRecord, Emitter, ExternalMetadataSource, RuntimeProfiler};
use crate::domain::services::hw_metrics_monitor::HwMetricsMonitor;
use crate::domain::services::perf_supervisor::{PerfSupervisor, SamplerMode};
use crate::domain::services::stack_merger::{default_anchors_for, StackMerger};
use crate::domain::services::system_metrics_monitor::SystemMetricsMonitor;
use crate::domain::stop_signal::StopSignal;
use crate::error::{AgentError, Result};

pub struct RegisteredProfiler {
    pub runtime: &'static str,
    pub profiler: Arc<dyn RuntimeProfiler>,
}

pub struct ProfileSession {
    pub perf_supervisors: Vec<Arc<PerfSupervisor>>,
    pub profilers: Vec<RegisteredProfiler>,
    pub container_lookup: Arc<dyn ContainerNameLookup>,
    pub external_metadata: Arc<dyn ExternalMetadataSource>,
    pub emitter: Arc<dyn Emitter>,
    pub system_metrics: Option<Arc<SystemMetricsMonitor>>,
    pub hw_metrics: Option<Arc<HwMetricsMonitor>>,
    pub stop: StopSignal,
    pub cycle_duration: Duration,
    pub static_metadata: ProfileMetadata,
}

impl ProfileSession {
    /// Run cycles until the stop signal is set.
    pub async fn run(&self) {
        let mut cycle: u64 = 0;
        loop {
            if self.stop.is_set() {
                info!("stop signal observed, exiting orchestrator loop");
                break;
            }

            let cycle_start = tokio::time::Instant::now();
            match self.run_cycle(cycle).await {
                Ok(()) => {}
                Err(AgentError::Stopped) => break,
                Err(e) => warn!(error = %e, "cycle failed, continuing"),
            }
            cycle += 1;

            let elapsed = cycle_start.elapsed();
            if elapsed < self.cycle_duration {
                tokio::select! {
                    _ = tokio::time::sleep(self.cycle_duration - elapsed) => {},
                    _ = self.stop.wait() => break,
                }
            }
        }
    }

    /// One full cycle per §4.6.
    pub async fn run_cycle(&self, cycle: u64) -> Result<()> {
        if self.stop.is_set() {
            return Err(AgentError::Stopped);
        }

        // 2. External metadata (logged-and-skipped on staleness, not fatal).
        let external = match self.external_metadata.read().await {
            Ok(meta) => meta,
            Err(e) => {
                warn!(error = %e, "external metadata unavailable this cycle");
                Default::default()
            }
        };

        // 3. Rotate every active system sampler in parallel.
        let rotations = join_all(self.perf_supervisors.iter().map(|sup| {
            let sup = sup.clone();
            let stop = self.stop.clone();
            async move { (sup.mode(), sup.rotate(&stop).await) }
        }))
        .await;

        let mut fp_text = None;
        let mut dwarf_text = None;
        for (mode, result) in rotations {
            match result {
                Ok(Some(text)) => match mode {
                    SamplerMode::Fp => fp_text = Some(text),
                    SamplerMode::Dwarf => dwarf_text = Some(text),
                },
                Ok(None) => {}
                Err(e) => warn!(error = %e, ?mode, "sampler rotation failed"),
            }
        }
        let fp = fp_text.map(|t| StackMerger::parse_system_wide(&t));
        let dwarf = dwarf_text.map(|t| StackMerger::parse_system_wide(&t));

        // 4. Per-runtime snapshots in parallel, each bounded individually.
        let timeout = self.cycle_duration + SNAPSHOT_TIMEOUT_SLACK;
        let snapshots = join_all(self.profilers.iter().map(|registered| {
            let duration = self.cycle_duration;
            let profiler = registered.profiler.clone();
            let runtime = registered.runtime;
            async move {
                let result = tokio::time::timeout(timeout, profiler.snapshot(duration)).await;
                match result {
                    Ok(Ok(data)) => (runtime, data),
                    Ok(Err(e)) => {
                        warn!(runtime, error = %e, "profiler snapshot failed");
                        (runtime, HashMap::new())
                    }
                    Err(_) => {
                        warn!(runtime, "profiler snapshot timed out");
                        (runtime, HashMap::new())
                    }
                }
            }
        }))
        .await;

        let mut managed_counters: HashMap<Pid, StackSampleCounters> = HashMap::new();
        let mut pid_runtime: HashMap<Pid, &'static str> = HashMap::new();
        let mut app_ids: HashMap<Pid, String> = HashMap::new();
        let mut app_metadata: HashMap<Pid, ProfileMetadata> = HashMap::new();

        for (runtime, data) in snapshots {
            for (pid, profile_data) in data {
                pid_runtime.insert(pid, runtime);
                managed_counters
                    .entry(pid)
                    .or_default()
                    .merge(profile_data.counters);
                if let Some(app_id) = profile_data.app_id {
                    app_ids.insert(pid, app_id);
                }
                if let Some(meta) = profile_data.app_metadata {
                    app_metadata.entry(pid).or_default().merge(meta);
                }
            }
        }

        // 5. Merge.
        let merged = StackMerger::merge_cycle(fp, dwarf, managed_counters, |pid| {
            pid_runtime
                .get(&pid)
                .map(|runtime| default_anchors_for(runtime))
                .unwrap_or(&[])
        });

        // 6. Enrich with application identity and container name.
        for (pid, app_id) in app_ids {
            app_metadata.entry(pid).or_default().insert("app_id", app_id);
        }
        for pid in merged.pids() {
            if let Some(name) = self.container_lookup.container_name(pid).await {
                app_metadata
                    .entry(pid)
                    .or_default()
                    .insert("container_name", name);
            }
        }
        for (pid, ext_meta) in external.application_metadata {
            app_metadata.entry(pid).or_default().merge(ext_meta);
        }

        let mut static_metadata = self.static_metadata.clone();
        static_metadata.merge(external.static_metadata);

        let sys_metrics = self
            .system_metrics
            .as_ref()
            .map(|m| m.drain_averages())
            .unwrap_or_default();
        let hw_metrics = self
            .hw_metrics
            .as_ref()
            .map(|m| m.build(None, None))
            .unwrap_or_default();

        let record = EmitRecord {
            static_metadata,
            application_metadata: app_metadata,
            hw_metrics,
            sys_metrics,
            stacks: merged,
        };

        // 7/8. Emit (failures logged, never fatal to the cycle).
        if let Err(e) = self.emitter.emit(&record).await {
            error!(cycle, error = %e, "emit failed");
        }

        Ok(())
    }
}

