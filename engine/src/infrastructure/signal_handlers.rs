//! SIGINT/SIGTERM wiring (§4.1, §7), grounded on the teacher daemon's
//! `wait_for_shutdown_signal`/`graceful_shutdown` split. Repeated signals
//! within `SIGNAL_RATE_LIMIT` are swallowed so a user holding down Ctrl-C
//! can't re-enter shutdown mid-flight.

use std::time::Instant;

use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

use crate::constants::runner::SIGNAL_RATE_LIMIT;
use crate::domain::stop_signal::StopSignal;

/// Spawns a background task that sets `stop` on the first SIGINT/SIGTERM
/// and ignores repeats inside the rate-limit window.
pub fn install(stop: StopSignal) {
    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGINT handler");
                return;
            }
        };

        let mut last_signal: Option<Instant> = None;
        loop {
            let name = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            };

            let now = Instant::now();
            if let Some(last) = last_signal {
                if now.duration_since(last) < SIGNAL_RATE_LIMIT {
                    continue;
                }
            }
            last_signal = Some(now);

            info!(signal = name, "received shutdown signal");
            stop.set();
        }
    });
}
