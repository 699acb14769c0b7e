//! Background system metrics monitor (§10.6, supplementing `system_metrics.py`).
//!
//! Samples host-wide CPU% and memory% at a fixed rate on a tokio background
//! task and exposes per-cycle averages. The captured-samples list is
//! protected by a mutex (standing in for the original's reentrant lock,
//! since this crate's single-executor model has no re-entrant-lock need);
//! reads drain and reset, per §5 Shared resources item 4.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::domain::model::SystemMetrics;
use crate::domain::stop_signal::StopSignal;

#[derive(Default)]
struct Samples {
    cpu_percentages: Vec<f64>,
    mem_percentages: Vec<f64>,
}

pub struct SystemMetricsMonitor {
    samples: std::sync::Arc<Mutex<Samples>>,
    polling_rate: Duration,
    stop: StopSignal,
    shutdown: std::sync::Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Reads instantaneous CPU%/mem% for the host. Implemented by
/// infrastructure (reads `/proc/stat` and `/proc/meminfo` deltas); kept as a
/// trait so the background loop stays unit-testable with synthetic readers.
pub trait HostUsageReader: Send + Sync {
    fn read(&self) -> Option<(f64, f64)>;
}

impl SystemMetricsMonitor {
    pub fn new(polling_rate: Duration) -> Self {
        Self {
            samples: std::sync::Arc::new(Mutex::new(Samples::default())),
            polling_rate,
            stop: StopSignal::new(),
            shutdown: std::sync::Arc::new(Notify::new()),
            task: Mutex::new(None),
        }
    }

    pub fn start(&self, reader: std::sync::Arc<dyn HostUsageReader>) {
        let samples = self.samples.clone();
        let polling_rate = self.polling_rate;
        let stop = self.stop.clone();
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            loop {
                if stop.is_set() {
                    break;
                }
                if let Some((cpu, mem)) = reader.read() {
                    let mut guard = samples.lock().unwrap();
                    guard.cpu_percentages.push(cpu);
                    guard.mem_percentages.push(mem);
                }
                tokio::select! {
                    _ = tokio::time::sleep(polling_rate) => {},
                    _ = shutdown.notified() => break,
                }
            }
            debug!("system metrics monitor stopped");
        });
        *self.task.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        self.stop.set();
        self.shutdown.notify_waiters();
    }

    /// Drain accumulated samples and return their averages for this cycle.
    pub fn drain_averages(&self) -> SystemMetrics {
        let mut guard = self.samples.lock().unwrap();
        let cpu_avg = average(&guard.cpu_percentages);
        let mem_avg = average(&guard.mem_percentages);
        guard.cpu_percentages.clear();
        guard.mem_percentages.clear();
        SystemMetrics {
            cpu_avg,
            mem_avg,
            ..Default::default()
        }
    }
}

fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedReader(f64, f64);
    impl HostUsageReader for FixedReader {
        fn read(&self) -> Option<(f64, f64)> {
            Some((self.0, self.1))
        }
    }

    #[test]
    fn drain_averages_resets_samples() {
        let monitor = SystemMetricsMonitor::new(Duration::from_millis(10));
        {
            let mut guard = monitor.samples.lock().unwrap();
            guard.cpu_percentages = vec![10.0, 20.0, 30.0];
            guard.mem_percentages = vec![50.0, 50.0];
        }
        let metrics = monitor.drain_averages();
        assert_eq!(metrics.cpu_avg, Some(20.0));
        assert_eq!(metrics.mem_avg, Some(50.0));

        let second = monitor.drain_averages();
        assert_eq!(second.cpu_avg, None);
    }

    #[test]
    fn fixed_reader_is_usable_as_trait_object() {
        let reader: std::sync::Arc<dyn HostUsageReader> = std::sync::Arc::new(FixedReader(1.0, 2.0));
        assert_eq!(reader.read(), Some((1.0, 2.0)));
    }
}
