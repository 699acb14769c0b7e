//! Cgroup-based `ContainerNameLookup` adapter. Reads `/proc/<pid>/cgroup`
//! and extracts the container ID from the last cgroup path segment the way
//! `docker`/`containerd`-managed cgroups name them — a 64-hex-char ID or a
//! `docker-<id>.scope` segment. Anything else (host processes, unsupported
//! cgroup layouts) degrades to `None`, never an error, per §4.6 step 6.

use async_trait::async_trait;

use crate::domain::model::Pid;
use crate::domain::ports::ContainerNameLookup;

pub struct CgroupContainerNameLookup;

#[async_trait]
impl ContainerNameLookup for CgroupContainerNameLookup {
    async fn container_name(&self, pid: Pid) -> Option<String> {
        let contents = tokio::fs::read_to_string(format!("/proc/{pid}/cgroup")).await.ok()?;
        extract_container_id(&contents)
    }
}

fn extract_container_id(cgroup_file: &str) -> Option<String> {
    for line in cgroup_file.lines() {
        let path = line.rsplit(':').next()?;
        let segment = path.rsplit('/').find(|s| !s.is_empty())?;

        if let Some(id) = segment.strip_prefix("docker-").and_then(|s| s.strip_suffix(".scope")) {
            if is_hex_id(id) {
                return Some(id.to_string());
            }
        }
        if is_hex_id(segment) {
            return Some(segment.to_string());
        }
    }
    None
}

fn is_hex_id(s: &str) -> bool {
    s.len() >= 12 && s.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bare_docker_cgroup_id() {
        let cgroup = "0::/docker/aabbccddeeff00112233445566778899aabbccddeeff00112233445566778899\n";
        assert_eq!(
            extract_container_id(cgroup),
            Some("aabbccddeeff00112233445566778899aabbccddeeff00112233445566778899".to_string())
        );
    }

    #[test]
    fn extracts_systemd_scope_style_docker_id() {
        let cgroup = "0::/system.slice/docker-aabbccddeeff001122334455.scope\n";
        assert_eq!(
            extract_container_id(cgroup),
            Some("aabbccddeeff001122334455".to_string())
        );
    }

    #[test]
    fn host_process_cgroup_yields_none() {
        let cgroup = "0::/user.slice/user-1000.slice\n";
        assert_eq!(extract_container_id(cgroup), None);
    }
}
