//! PID-namespace and debugfs helpers shared by the continuous eBPF Python
//! profiler's environment check (§4.5) and the `.NET` container-detection
//! redesign (§10.7): both need to compare a candidate process's PID
//! namespace against the agent's own.

use std::os::unix::fs::MetadataExt;
use std::path::Path;

use crate::error::{AgentError, Result};

/// The inode of `/proc/<pid>/ns/pid` for `pid`, used as that process's PID
/// namespace identity. Two processes share a PID namespace iff these inodes
/// match.
pub fn pid_namespace_inode(pid: u32) -> Result<u64> {
    let meta = std::fs::metadata(format!("/proc/{pid}/ns/pid"))?;
    Ok(meta.ino())
}

/// True when this agent process is running in the host's initial PID
/// namespace, required before pyperf's eBPF programs can be loaded.
pub fn is_init_pid_namespace() -> Result<bool> {
    let ours = pid_namespace_inode(std::process::id())?;
    let init = pid_namespace_inode(1)?;
    Ok(ours == init)
}

/// Mount debugfs at `/sys/kernel/debug` if it is not already mounted there.
#[cfg(target_os = "linux")]
pub fn ensure_debugfs_mounted() -> Result<()> {
    let path = Path::new("/sys/kernel/debug");
    if is_mount_point(path) {
        return Ok(());
    }
    std::fs::create_dir_all(path)?;
    nix::mount::mount(
        Some("none"),
        path,
        Some("debugfs"),
        nix::mount::MsFlags::empty(),
        None::<&str>,
    )
    .map_err(|e| AgentError::UnsupportedEnvironment(format!("mounting debugfs: {e}")))
}

#[cfg(target_os = "linux")]
fn is_mount_point(path: &Path) -> bool {
    let (Ok(path_dev), Some(parent)) = (std::fs::metadata(path).map(|m| m.dev()), path.parent()) else {
        return false;
    };
    std::fs::metadata(parent)
        .map(|parent_meta| parent_meta.dev() != path_dev)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_has_a_pid_namespace_inode() {
        assert!(pid_namespace_inode(std::process::id()).is_ok());
    }
}
