//! Collects the static host/OS/CPU facts attached to every cycle's
//! `ProfileMetadata` (§4.6, §6). Grounded on the `sysinfo`-based
//! `SystemInfo::new()` pattern from the CodSpeed runner example — the
//! difference being that here missing facts degrade to omitted fields
//! rather than a startup failure, since profiling should still proceed on
//! hosts `sysinfo` can only partially describe.

use sysinfo::System;

use crate::domain::model::ProfileMetadata;

pub fn collect() -> ProfileMetadata {
    let mut system = System::new();
    system.refresh_cpu_all();

    let mut metadata = ProfileMetadata::new();
    if let Some(os) = System::name() {
        metadata.insert("os_name", os);
    }
    if let Some(os_version) = System::os_version() {
        metadata.insert("os_version", os_version);
    }
    if let Some(kernel_version) = System::kernel_version() {
        metadata.insert("kernel_version", kernel_version);
    }
    if let Some(arch) = System::cpu_arch() {
        metadata.insert("arch", arch);
    }
    if let Some(hostname) = System::host_name() {
        metadata.insert("hostname", hostname);
    }
    metadata.insert("cpu_count", system.cpus().len() as u64);
    metadata.insert("pid", std::process::id());

    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_includes_cpu_count_and_pid() {
        let metadata = collect();
        assert!(metadata.get("cpu_count").is_some());
        assert!(metadata.get("pid").is_some());
    }
}
