//! Logging initialization (§10.2). Human-readable stderr output via
//! `tracing-subscriber`, level controlled by `RUST_LOG` (default `info`),
//! with `-v`/`-vv` raising the default floor the way verbosity flags
//! commonly stack on top of an env-var baseline.

use tracing_subscriber::EnvFilter;

/// `verbosity` is the repeat count of `-v`; 0 leaves `RUST_LOG` (or its
/// `info` default) untouched, higher values raise the floor regardless of
/// what `RUST_LOG` says, since an explicit flag should win over an
/// unrelated ambient env var.
pub fn init(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = if verbosity > 0 {
        EnvFilter::new(default_level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
