//! Agent entry point: parses configuration, wires the domain's ports to
//! their concrete infrastructure adapters, and drives the orchestrator
//! until the stop signal fires (§4.6, §10).

use std::sync::Arc;

use gprofiler_engine::domain::model::ProfileMetadata;
use gprofiler_engine::domain::ports::{
    Arch, NoExternalMetadataSource, NoopContainerNameLookup, NoopUploadClient,
};
use gprofiler_engine::domain::process_registry::ProcessRegistry;
use gprofiler_engine::domain::profilers::descriptor_registry;
use gprofiler_engine::domain::profilers::dotnet::DotnetProfiler;
use gprofiler_engine::domain::profilers::java::JavaProfiler;
use gprofiler_engine::domain::profilers::nodejs::NodeProfiler;
use gprofiler_engine::domain::profilers::php::PhpSpyProfiler;
use gprofiler_engine::domain::profilers::python::PySpyProfiler;
use gprofiler_engine::domain::profilers::python_ebpf::{LinuxEbpfEnvironment, PyperfProfiler};
use gprofiler_engine::domain::profilers::ruby::RbSpyProfiler;
use gprofiler_engine::domain::services::hw_metrics_monitor::HwMetricsMonitor;
use gprofiler_engine::domain::services::perf_supervisor::{
    PerfSupervisor, PerfSupervisorConfig, SamplerMode,
};
use gprofiler_engine::domain::services::profile_session::{ProfileSession, RegisteredProfiler};
use gprofiler_engine::domain::services::system_metrics_monitor::SystemMetricsMonitor;
use gprofiler_engine::domain::stop_signal::StopSignal;
use gprofiler_engine::error::AgentError;
use gprofiler_engine::infrastructure::agent_mutex::AgentMutex;
use gprofiler_engine::infrastructure::child_process_runner::TokioChildProcessRunner;
use gprofiler_engine::infrastructure::config::Config;
use gprofiler_engine::infrastructure::container_name_lookup::CgroupContainerNameLookup;
use gprofiler_engine::infrastructure::emitter::CollapsedFileEmitter;
use gprofiler_engine::infrastructure::external_metadata_source::FileExternalMetadataSource;
use gprofiler_engine::infrastructure::host_usage_reader::ProcHostUsageReader;
use gprofiler_engine::infrastructure::upload_client::{SparkUploadClient, SparkUploadConfig};
use gprofiler_engine::infrastructure::{logging, signal_handlers, static_metadata};

#[tokio::main]
async fn main() {
    let config = Config::from_cli();
    logging::init(config.verbosity);

    let mutex = match AgentMutex::acquire() {
        Ok(mutex) => mutex,
        Err(AgentError::MutexHeld) => {
            eprintln!("Could not acquire gProfiler's lock; is another instance already running?");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("failed to acquire agent lock: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = std::fs::create_dir_all(&config.output_dir) {
        eprintln!("failed to create output directory {:?}: {e}", config.output_dir);
        std::process::exit(1);
    }

    let stop = StopSignal::new();
    signal_handlers::install(stop.clone());

    let registry = Arc::new(ProcessRegistry::new());
    let runner = Arc::new(TokioChildProcessRunner::new());

    let mut perf_supervisors = Vec::new();
    for mode in [SamplerMode::Fp, SamplerMode::Dwarf] {
        let suffix = match mode {
            SamplerMode::Fp => "fp",
            SamplerMode::Dwarf => "dwarf",
        };
        let supervisor_config = PerfSupervisorConfig {
            mode,
            frequency_hz: config.frequency_hz,
            output_path: config.output_dir.join(format!("perf.{suffix}.data")),
            rotation_timeout_s: config.cycle_duration.as_secs().max(1),
            perf_binary: "perf".to_string(),
            extra_args: config.perf_extra_args.clone(),
            inject_jit: false,
        };
        let supervisor = Arc::new(PerfSupervisor::new(
            supervisor_config,
            runner.clone(),
            registry.clone(),
        ));
        if let Err(e) = supervisor.start(&stop).await {
            tracing::warn!(?mode, error = %e, "perf supervisor failed to start, continuing without it");
            continue;
        }
        perf_supervisors.push(supervisor);
    }

    let descriptors = descriptor_registry();
    let arch = Arch::current();
    let mut profilers: Vec<RegisteredProfiler> = Vec::new();

    if should_enable("java", &config.java_mode, &descriptors, arch) {
        profilers.push(RegisteredProfiler {
            runtime: "java",
            profiler: Arc::new(JavaProfiler::new(
                runner.clone(),
                stop.clone(),
                config.output_dir.clone(),
                "asprof".to_string(),
            )),
        });
    }
    if should_enable("php", &config.php_mode, &descriptors, arch) {
        profilers.push(RegisteredProfiler {
            runtime: "php",
            profiler: Arc::new(PhpSpyProfiler::new(
                runner.clone(),
                stop.clone(),
                config.output_dir.clone(),
                "phpspy".to_string(),
            )),
        });
    }
    if should_enable("ruby", &config.ruby_mode, &descriptors, arch) {
        profilers.push(RegisteredProfiler {
            runtime: "ruby",
            profiler: Arc::new(RbSpyProfiler::new(
                runner.clone(),
                stop.clone(),
                config.output_dir.clone(),
                "rbspy".to_string(),
            )),
        });
    }
    if should_enable("dotnet", &config.dotnet_mode, &descriptors, arch) {
        profilers.push(RegisteredProfiler {
            runtime: "dotnet",
            profiler: Arc::new(DotnetProfiler::new(
                runner.clone(),
                stop.clone(),
                config.output_dir.clone(),
                "dotnet-trace".to_string(),
            )),
        });
    }
    if should_enable("nodejs", &config.nodejs_mode, &descriptors, arch) {
        profilers.push(RegisteredProfiler {
            runtime: "nodejs",
            profiler: Arc::new(NodeProfiler::new(
                runner.clone(),
                stop.clone(),
                config.output_dir.clone(),
                "node-perf-collapse".to_string(),
            )),
        });
    }
    if should_enable("python", &config.python_mode, &descriptors, arch) {
        if config.python_mode == "pyperf" {
            let profiler = Arc::new(PyperfProfiler::new(
                runner.clone(),
                Arc::new(LinuxEbpfEnvironment),
                config.output_dir.clone(),
                "pyperf".to_string(),
                config.frequency_hz,
            ));
            if let Err(e) = profiler.start().await {
                tracing::warn!(error = %e, "pyperf failed to start, disabling python profiling");
            } else {
                profilers.push(RegisteredProfiler {
                    runtime: "python",
                    profiler,
                });
            }
        } else {
            profilers.push(RegisteredProfiler {
                runtime: "python",
                profiler: Arc::new(PySpyProfiler::new(
                    runner.clone(),
                    stop.clone(),
                    config.output_dir.clone(),
                    "py-spy".to_string(),
                )),
            });
        }
    }

    let container_lookup = if cfg!(target_os = "linux") {
        Arc::new(CgroupContainerNameLookup) as Arc<dyn gprofiler_engine::domain::ports::ContainerNameLookup>
    } else {
        Arc::new(NoopContainerNameLookup)
    };

    let external_metadata = match &config.external_metadata_path {
        Some(path) => {
            Arc::new(FileExternalMetadataSource::new(path.clone()))
                as Arc<dyn gprofiler_engine::domain::ports::ExternalMetadataSource>
        }
        None => Arc::new(NoExternalMetadataSource),
    };

    let upload_client = config
        .server_address
        .as_ref()
        .map(|server_address| {
            Arc::new(SparkUploadClient::new(SparkUploadConfig {
                server_address: server_address.clone(),
                api_version: "v1".to_string(),
                auth_token: config.token.clone().unwrap_or_default(),
                service: config.service.clone().unwrap_or_else(|| "gprofiler".to_string()),
                hostname: hostname(),
                key: None,
            })) as Arc<dyn gprofiler_engine::domain::ports::UploadClient>
        })
        .unwrap_or_else(|| Arc::new(NoopUploadClient));

    let emitter = Arc::new(CollapsedFileEmitter::new(
        config.output_dir.clone(),
        config.flamegraph,
        Some(upload_client),
    ));

    let system_metrics = Arc::new(SystemMetricsMonitor::new(std::time::Duration::from_secs(1)));
    system_metrics.start(Arc::new(ProcHostUsageReader::new()));

    let hw_metrics = Arc::new(HwMetricsMonitor::new(config.pmu_helper_path.is_some()));

    let mut static_metadata = static_metadata::collect();
    static_metadata.merge(runtime_mode_metadata(&config));

    let session = ProfileSession {
        perf_supervisors,
        profilers,
        container_lookup,
        external_metadata,
        emitter,
        system_metrics: Some(system_metrics),
        hw_metrics: Some(hw_metrics),
        stop: stop.clone(),
        cycle_duration: config.cycle_duration,
        static_metadata,
    };

    session.run().await;

    shutdown(&*registry, &*runner, &session.perf_supervisors, &session.profilers, &config.output_dir).await;

    drop(mutex);
}

/// §5 Cancellation: every process still in the registry receives a kill, the
/// perf supervisors' long-lived children are stopped, and the always-on
/// eBPF helper (if running) is stopped — mirrors `session.run()`'s own
/// per-cycle error handling in that none of these are allowed to panic the
/// shutdown path. Finishes by clearing the agent's `/tmp`-scoped working
/// directory per §5 Shared resources.
async fn shutdown(
    registry: &ProcessRegistry,
    runner: &TokioChildProcessRunner,
    perf_supervisors: &[Arc<PerfSupervisor>],
    profilers: &[RegisteredProfiler],
    output_dir: &std::path::Path,
) {
    for supervisor in perf_supervisors {
        if let Err(e) = supervisor.stop().await {
            tracing::warn!(error = %e, "failed to stop perf supervisor on shutdown");
        }
    }
    for registered in profilers {
        if let Err(e) = registered.profiler.stop().await {
            tracing::warn!(runtime = registered.runtime, error = %e, "failed to stop profiler on shutdown");
        }
    }
    registry.terminate_all(runner).await;

    if let Err(e) = tokio::fs::remove_dir_all(output_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(?output_dir, error = %e, "failed to clean working directory on shutdown");
        }
    }
}

fn should_enable(
    name: &str,
    mode: &str,
    descriptors: &gprofiler_engine::domain::ports::ProfilerRegistry,
    arch: Arch,
) -> bool {
    if mode == "disabled" {
        return false;
    }
    match descriptors.get(name) {
        Some(descriptor) => {
            if !descriptor.supports_arch(arch) {
                tracing::warn!(profiler = name, ?arch, "unsupported architecture, skipping");
                return false;
            }
            if !descriptor.supports_mode(mode) {
                tracing::warn!(profiler = name, mode, "unsupported mode, skipping");
                return false;
            }
            true
        }
        None => {
            tracing::warn!(profiler = name, "no descriptor registered, skipping");
            false
        }
    }
}

fn runtime_mode_metadata(config: &Config) -> ProfileMetadata {
    let mut metadata = ProfileMetadata::new();
    metadata.insert("profiling_mode", config.profiling_mode.clone());
    metadata
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".to_string())
}
