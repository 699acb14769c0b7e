//! Agent-wide constants and default values.
//!
//! Centralizes magic numbers from the spec so tuning them stays a one-line
//! change instead of a search-and-replace.

/// System-sampler supervisor (perf) tuning.
pub mod perf {
    use std::time::Duration;

    /// How long to wait for the output file to appear after start, or for a
    /// rotated file to appear after the rotation signal.
    pub const DUMP_TIMEOUT: Duration = Duration::from_secs(5);

    /// Restart a sampler that has been alive this long and whose RSS exceeds
    /// `MEMORY_USAGE_THRESHOLD_BYTES`.
    pub const RESTART_AFTER: Duration = Duration::from_secs(3600);

    /// RSS threshold paired with `RESTART_AFTER`.
    pub const MEMORY_USAGE_THRESHOLD_BYTES: u64 = 512 * 1024 * 1024;

    /// RSS growth above baseline that triggers an immediate restart,
    /// independent of how long the sampler has been running.
    pub const RSS_GROWTH_THRESHOLD_BYTES: u64 = 100 * 1024 * 1024;

    /// Number of post-start RSS samples averaged to compute the baseline.
    pub const BASELINE_COLLECTION_COUNT: usize = 3;

    /// mmap ring buffer size, in pages, per sampling mode.
    pub const MMAP_PAGES_FP: u32 = 129;
    pub const MMAP_PAGES_DWARF: u32 = 257;

    /// Health-check poll interval while a sampler is `Running`.
    pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(1);
}

/// Per-runtime / continuous-profiler tuning.
pub mod profiler {
    use std::time::Duration;

    /// Timeout waiting for a helper process to produce its first output file.
    pub const START_TIMEOUT: Duration = Duration::from_secs(10);

    /// Timeout waiting for a dump file after sending the dump signal.
    pub const DUMP_TIMEOUT: Duration = Duration::from_secs(5);

    /// Extra slack added to the configured cycle duration when awaiting all
    /// per-runtime snapshots.
    pub const SNAPSHOT_TIMEOUT_SLACK: Duration = Duration::from_secs(10);
}

/// Orchestrator / external-metadata tuning.
pub mod session {
    use std::time::Duration;

    pub const EXTERNAL_METADATA_STALENESS_THRESHOLD: Duration = Duration::from_secs(5 * 60);
}

/// Child-process runner / shutdown tuning.
pub mod runner {
    use std::time::Duration;

    /// Minimum spacing between delivered SIGINT/SIGTERM before a repeat is
    /// swallowed to avoid re-entrant shutdown.
    pub const SIGNAL_RATE_LIMIT: Duration = Duration::from_millis(500);

    /// Chunk size used when draining non-blocking stdout/stderr pipes.
    pub const STDIO_READ_CHUNK_BYTES: usize = 64 * 1024;

    /// Interval at which `wait_with_timeout` polls child exit / stop signal.
    pub const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(1);
}

/// Stack-merger tuning.
pub mod merger {
    /// Fewer than this many user frames in an FP stack is "too short" and a
    /// candidate for DWARF replacement.
    pub const FP_SHORT_STACK_USER_FRAMES: usize = 3;
}

/// Well-known abstract-namespace address for the single-instance mutex.
pub const AGENT_MUTEX_ADDRESS: &str = "gprofiler_lock";
