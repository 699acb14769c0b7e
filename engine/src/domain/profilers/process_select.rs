//! Shared process-selection helpers for §4.4's per-runtime
//! `select_processes()` step. Grounded on `utils/__init__.py`'s
//! `pgrep_maps`/`pgrep_exe`: scan `/proc`, match a regex against either the
//! resolved `exe` symlink or the `maps` file contents, skip PIDs that
//! disappear mid-scan (short-lived processes, per §1 Non-goals).

use regex::Regex;
use std::path::Path;

fn live_pids() -> Vec<u32> {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str()?.parse::<u32>().ok())
        .collect()
}

/// PIDs whose resolved executable path matches `pattern` (Node.js, .NET).
pub fn pgrep_exe(pattern: &Regex) -> Vec<u32> {
    live_pids()
        .into_iter()
        .filter(|pid| {
            std::fs::read_link(format!("/proc/{pid}/exe"))
                .ok()
                .and_then(|p| p.to_str().map(|s| pattern.is_match(s)))
                .unwrap_or(false)
        })
        .collect()
}

/// PIDs whose `/proc/<pid>/maps` contains a line matching `pattern`
/// (Python, Ruby, PHP: the interpreter's libs show up there even when the
/// main executable is a generic launcher script).
pub fn pgrep_maps(pattern: &Regex) -> Vec<u32> {
    live_pids()
        .into_iter()
        .filter(|pid| {
            let Ok(maps) = std::fs::read_to_string(format!("/proc/{pid}/maps")) else {
                return false;
            };
            maps.lines().any(|line| pattern.is_match(line))
        })
        .collect()
}

/// JVM detection: a `java`/`jre`/`jdk`-looking exe, or the presence of
/// `libjvm.so` in maps — either is sufficient, matching the original's
/// "detect by any of several heuristics" JVM probe.
pub fn pgrep_jvm() -> Vec<u32> {
    let exe_pattern = Regex::new(r"/(java|jre|jdk)[^/]*/bin/java$").unwrap();
    let maps_pattern = Regex::new(r"libjvm\.so").unwrap();
    let mut pids: std::collections::HashSet<u32> = pgrep_exe(&exe_pattern).into_iter().collect();
    pids.extend(pgrep_maps(&maps_pattern));
    pids.into_iter().collect()
}

/// `basename(readlink(/proc/<pid>/exe))`, used to label application identity
/// when a richer heuristic isn't available.
pub fn exe_basename(pid: u32) -> Option<String> {
    let target = std::fs::read_link(format!("/proc/{pid}/exe")).ok()?;
    Path::new(&target)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}
