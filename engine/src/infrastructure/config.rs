//! Agent configuration (§10.3): a `clap` derive CLI layered over
//! `GPROFILER_*` environment variable defaults, mirroring the teacher's
//! `DaemonConfig::from_env()` precedence (env as the fallback layer, the
//! explicit surface — there CLI flags didn't exist, here they do and take
//! priority — always winning over the fallback).

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;

fn default_duration() -> String {
    std::env::var("GPROFILER_DURATION").unwrap_or_else(|_| "60".to_string())
}

fn default_frequency() -> String {
    std::env::var("GPROFILER_FREQUENCY").unwrap_or_else(|_| "11".to_string())
}

fn default_profiling_mode() -> String {
    std::env::var("GPROFILER_PROFILING_MODE").unwrap_or_else(|_| "cpu".to_string())
}

fn default_output_dir() -> String {
    std::env::var("GPROFILER_OUTPUT_DIR")
        .or_else(|_| std::env::var("TMPDIR").map(|t| format!("{t}/gprofiler")))
        .unwrap_or_else(|_| "/tmp/gprofiler".to_string())
}

fn default_runtime_mode(var: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| "disabled".to_string())
}

/// Continuous whole-host CPU profiling agent.
#[derive(Parser, Debug, Clone)]
#[command(name = "gprofiler-agent", version, about)]
pub struct Cli {
    /// Seconds per profiling cycle.
    #[arg(long, default_value_t = default_duration().parse().unwrap_or(60))]
    pub duration: u64,

    /// Sampling frequency in Hz for the system-wide sampler.
    #[arg(long, default_value_t = default_frequency().parse().unwrap_or(11))]
    pub frequency: u32,

    /// "cpu" or "allocation".
    #[arg(long, default_value_t = default_profiling_mode())]
    pub profiling_mode: String,

    /// Directory for the per-cycle collapsed/flamegraph artifacts.
    #[arg(long, default_value_t = default_output_dir())]
    pub output_dir: String,

    #[arg(long, default_value_t = default_runtime_mode("GPROFILER_JAVA_MODE"))]
    pub java_mode: String,

    #[arg(long, default_value_t = default_runtime_mode("GPROFILER_PYTHON_MODE"))]
    pub python_mode: String,

    #[arg(long, default_value_t = default_runtime_mode("GPROFILER_PHP_MODE"))]
    pub php_mode: String,

    #[arg(long, default_value_t = default_runtime_mode("GPROFILER_RUBY_MODE"))]
    pub ruby_mode: String,

    #[arg(long, default_value_t = default_runtime_mode("GPROFILER_DOTNET_MODE"))]
    pub dotnet_mode: String,

    #[arg(long, default_value_t = default_runtime_mode("GPROFILER_NODEJS_MODE"))]
    pub nodejs_mode: String,

    /// Extra arguments appended verbatim to the `perf record` invocation.
    #[arg(long, value_delimiter = ' ')]
    pub perf_extra_args: Vec<String>,

    /// Path to a user-maintained JSON file of static/per-PID metadata.
    #[arg(long, env = "GPROFILER_EXTERNAL_METADATA_PATH")]
    pub external_metadata_path: Option<PathBuf>,

    /// Path to an optional external PMU top-down helper binary.
    #[arg(long, env = "GPROFILER_PMU_HELPER_PATH")]
    pub pmu_helper_path: Option<PathBuf>,

    /// Base URL of the upload destination; uploads are disabled if unset.
    #[arg(long, env = "GPROFILER_SERVER_ADDRESS")]
    pub server_address: Option<String>,

    #[arg(long, env = "GPROFILER_TOKEN")]
    pub token: Option<String>,

    #[arg(long, env = "GPROFILER_SERVICE")]
    pub service: Option<String>,

    /// Render a standalone HTML flamegraph alongside the collapsed file.
    #[arg(long)]
    pub flamegraph: bool,

    /// Repeatable; raises log verbosity one level per occurrence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Resolved, serde-serializable configuration the rest of the agent builds
/// its collaborators from.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub cycle_duration: Duration,
    pub frequency_hz: u32,
    pub profiling_mode: String,
    pub output_dir: PathBuf,
    pub java_mode: String,
    pub python_mode: String,
    pub php_mode: String,
    pub ruby_mode: String,
    pub dotnet_mode: String,
    pub nodejs_mode: String,
    pub perf_extra_args: Vec<String>,
    pub external_metadata_path: Option<PathBuf>,
    pub pmu_helper_path: Option<PathBuf>,
    pub server_address: Option<String>,
    pub token: Option<String>,
    pub service: Option<String>,
    pub flamegraph: bool,
    pub verbosity: u8,
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Self {
            cycle_duration: Duration::from_secs(cli.duration),
            frequency_hz: cli.frequency,
            profiling_mode: cli.profiling_mode,
            output_dir: PathBuf::from(cli.output_dir),
            java_mode: cli.java_mode,
            python_mode: cli.python_mode,
            php_mode: cli.php_mode,
            ruby_mode: cli.ruby_mode,
            dotnet_mode: cli.dotnet_mode,
            nodejs_mode: cli.nodejs_mode,
            perf_extra_args: cli.perf_extra_args,
            external_metadata_path: cli.external_metadata_path,
            pmu_helper_path: cli.pmu_helper_path,
            server_address: cli.server_address,
            token: cli.token,
            service: cli.service,
            flamegraph: cli.flamegraph,
            verbosity: cli.verbose,
        }
    }
}

impl Config {
    pub fn from_cli() -> Self {
        Cli::parse().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_parse_without_arguments() {
        let cli = Cli::parse_from(["gprofiler-agent"]);
        let config: Config = cli.into();
        assert_eq!(config.cycle_duration, Duration::from_secs(60));
        assert_eq!(config.frequency_hz, 11);
        assert_eq!(config.profiling_mode, "cpu");
    }

    #[test]
    fn explicit_flags_override_defaults() {
        let cli = Cli::parse_from([
            "gprofiler-agent",
            "--duration",
            "30",
            "--profiling-mode",
            "allocation",
            "--python-mode",
            "py-spy",
        ]);
        let config: Config = cli.into();
        assert_eq!(config.cycle_duration, Duration::from_secs(30));
        assert_eq!(config.profiling_mode, "allocation");
        assert_eq!(config.python_mode, "py-spy");
    }
}
