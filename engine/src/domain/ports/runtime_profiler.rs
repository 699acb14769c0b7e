//! `RuntimeProfiler` capability set and the explicit profiler registry
//! (§4.4, §9 "Dynamic registry of profilers" / "Abstract profiler family").
//!
//! Rather than an inheritance hierarchy (base -> system, per-process,
//! per-process eBPF), each runtime profiler implements one trait with
//! optional (default no-op) lifecycle methods. `start`/`stop` matter only to
//! the always-on eBPF variant; every spawn-per-cycle profiler leaves them as
//! the default no-op.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::model::{Pid, ProfileData};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    Aarch64,
}

impl Arch {
    pub fn current() -> Self {
        if cfg!(target_arch = "aarch64") {
            Arch::Aarch64
        } else {
            Arch::X86_64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfilingMode {
    Cpu,
    Allocation,
    None,
}

/// The capability set every runtime profiler implements. `snapshot` is the
/// only required method; `start`/`stop`/`select_processes` default to no-ops
/// so spawn-per-cycle profilers don't have to restate them.
#[async_trait]
pub trait RuntimeProfiler: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    /// Live PIDs matching this runtime's selection criterion. The default
    /// empty result is appropriate for profilers (like the continuous eBPF
    /// variant) that discover PIDs internally as part of `snapshot`.
    async fn select_processes(&self) -> Result<Vec<Pid>> {
        Ok(Vec::new())
    }

    /// Produce one `ProfileData` per successfully profiled PID. Per-PID
    /// failures must be swallowed internally (logged, omitted) rather than
    /// failing the whole snapshot — only a failure affecting every PID should
    /// surface as `Err`.
    async fn snapshot(&self, duration: Duration) -> Result<HashMap<Pid, ProfileData>>;
}

/// Static facts about a profiler, known without instantiating it, used by
/// the orchestrator/factory to decide whether to build one at all.
pub struct ProfilerDescriptor {
    pub name: &'static str,
    pub supported_archs: &'static [Arch],
    pub supported_modes: &'static [&'static str],
    pub default_mode: &'static str,
    pub supported_profiling_modes: &'static [ProfilingMode],
}

impl ProfilerDescriptor {
    pub fn supports_arch(&self, arch: Arch) -> bool {
        self.supported_archs.contains(&arch)
    }

    pub fn supports_profiling_mode(&self, mode: ProfilingMode) -> bool {
        self.supported_profiling_modes.contains(&mode)
    }

    pub fn supports_mode(&self, mode: &str) -> bool {
        self.supported_modes.iter().any(|m| *m == mode)
    }
}

/// An explicit, startup-built registry of descriptors. Replaces the
/// decorator-based import-time registration in the original implementation.
#[derive(Default)]
pub struct ProfilerRegistry {
    descriptors: Vec<ProfilerDescriptor>,
}

impl ProfilerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ProfilerDescriptor) {
        self.descriptors.push(descriptor);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProfilerDescriptor> {
        self.descriptors.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ProfilerDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lookup_and_capability_checks() {
        let mut registry = ProfilerRegistry::new();
        registry.register(ProfilerDescriptor {
            name: "python",
            supported_archs: &[Arch::X86_64, Arch::Aarch64],
            supported_modes: &["py-spy", "pyperf"],
            default_mode: "py-spy",
            supported_profiling_modes: &[ProfilingMode::Cpu],
        });

        let descriptor = registry.get("python").unwrap();
        assert!(descriptor.supports_arch(Arch::Aarch64));
        assert!(descriptor.supports_mode("pyperf"));
        assert!(!descriptor.supports_mode("unknown"));
        assert!(registry.get("java").is_none());
    }
}
