//! `HostUsageReader` adapter: instantaneous CPU%/mem% from `/proc/stat` and
//! `/proc/meminfo`, the usual source for whole-host usage on Linux.

use std::sync::Mutex;

use crate::domain::services::system_metrics_monitor::HostUsageReader;

#[derive(Default)]
struct CpuTimes {
    idle: u64,
    total: u64,
}

pub struct ProcHostUsageReader {
    last_cpu: Mutex<Option<CpuTimes>>,
}

impl ProcHostUsageReader {
    pub fn new() -> Self {
        Self {
            last_cpu: Mutex::new(None),
        }
    }
}

impl Default for ProcHostUsageReader {
    fn default() -> Self {
        Self::new()
    }
}

impl HostUsageReader for ProcHostUsageReader {
    fn read(&self) -> Option<(f64, f64)> {
        let cpu = read_cpu_times()?;
        let mem = read_mem_percent()?;

        let mut last = self.last_cpu.lock().unwrap();
        let cpu_pct = match last.as_ref() {
            Some(prev) => {
                let total_delta = cpu.total.saturating_sub(prev.total);
                let idle_delta = cpu.idle.saturating_sub(prev.idle);
                if total_delta == 0 {
                    0.0
                } else {
                    100.0 * (1.0 - idle_delta as f64 / total_delta as f64)
                }
            }
            None => 0.0,
        };
        *last = Some(cpu);

        Some((cpu_pct, mem))
    }
}

fn read_cpu_times() -> Option<CpuTimes> {
    let stat = std::fs::read_to_string("/proc/stat").ok()?;
    let line = stat.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|f| f.parse().ok())
        .collect();
    if fields.len() < 4 {
        return None;
    }
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    let total: u64 = fields.iter().sum();
    Some(CpuTimes { idle, total })
}

fn read_mem_percent() -> Option<f64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let mut total_kb = None;
    let mut available_kb = None;
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total_kb = parse_kb(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available_kb = parse_kb(rest);
        }
    }
    let total = total_kb?;
    let available = available_kb?;
    if total == 0.0 {
        return None;
    }
    Some(100.0 * (1.0 - available / total))
}

fn parse_kb(field: &str) -> Option<f64> {
    field.trim().trim_end_matches(" kB").trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_read_reports_zero_cpu_with_no_baseline() {
        let reader = ProcHostUsageReader::new();
        let (cpu, mem) = reader.read().expect("proc filesystem available");
        assert_eq!(cpu, 0.0);
        assert!(mem >= 0.0 && mem <= 100.0);
    }

    #[test]
    fn parse_kb_strips_the_unit_suffix() {
        assert_eq!(parse_kb("   16384 kB"), Some(16384.0));
    }
}
