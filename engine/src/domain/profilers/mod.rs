//! Per-runtime profiler implementations (§4.4) plus the explicit descriptor
//! registry a caller consults before deciding which ones to instantiate
//! (§9 "Dynamic registry of profilers").
//!
//! Each profiler module owns its process-selection heuristic and its
//! helper-invocation shape; `process_select` and `support` hold what's
//! shared between them.

pub mod dotnet;
pub mod java;
pub mod nodejs;
pub mod php;
pub mod process_select;
pub mod python;
pub mod python_ebpf;
pub mod ruby;
pub mod support;

use crate::domain::ports::{Arch, ProfilerDescriptor, ProfilerRegistry, ProfilingMode};

/// The descriptors for every runtime this agent knows how to profile,
/// independent of whether a given one is enabled or supported on the
/// current host — that filtering happens at startup against
/// `Arch::current()` and the configured profiling mode.
pub fn descriptor_registry() -> ProfilerRegistry {
    let mut registry = ProfilerRegistry::new();

    registry.register(ProfilerDescriptor {
        name: "java",
        supported_archs: &[Arch::X86_64, Arch::Aarch64],
        supported_modes: &["ap", "disabled"],
        default_mode: "ap",
        supported_profiling_modes: &[ProfilingMode::Cpu, ProfilingMode::Allocation],
    });
    registry.register(ProfilerDescriptor {
        name: "python",
        supported_archs: &[Arch::X86_64, Arch::Aarch64],
        supported_modes: &["py-spy", "pyperf", "disabled"],
        default_mode: "py-spy",
        supported_profiling_modes: &[ProfilingMode::Cpu],
    });
    registry.register(ProfilerDescriptor {
        name: "php",
        supported_archs: &[Arch::X86_64, Arch::Aarch64],
        supported_modes: &["phpspy", "disabled"],
        default_mode: "phpspy",
        supported_profiling_modes: &[ProfilingMode::Cpu],
    });
    registry.register(ProfilerDescriptor {
        name: "ruby",
        supported_archs: &[Arch::X86_64, Arch::Aarch64],
        supported_modes: &["rbspy", "disabled"],
        default_mode: "rbspy",
        supported_profiling_modes: &[ProfilingMode::Cpu],
    });
    registry.register(ProfilerDescriptor {
        name: "dotnet",
        supported_archs: &[Arch::X86_64, Arch::Aarch64],
        supported_modes: &["dotnet-trace", "disabled"],
        default_mode: "dotnet-trace",
        supported_profiling_modes: &[ProfilingMode::Cpu],
    });
    registry.register(ProfilerDescriptor {
        name: "nodejs",
        supported_archs: &[Arch::X86_64, Arch::Aarch64],
        supported_modes: &["perf", "disabled"],
        default_mode: "perf",
        supported_profiling_modes: &[ProfilingMode::Cpu],
    });

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_runtime_is_registered_and_supports_current_arch() {
        let registry = descriptor_registry();
        for name in ["java", "python", "php", "ruby", "dotnet", "nodejs"] {
            let descriptor = registry.get(name).expect("registered");
            assert!(descriptor.supports_arch(Arch::current()));
        }
    }
}
