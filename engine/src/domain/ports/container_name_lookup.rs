//! Container-runtime collaborator port (out of scope per §1; only the
//! contract lives here). Missing collaborators degrade silently to `None`
//! per §4.6 step 6.

use async_trait::async_trait;

use crate::domain::model::Pid;

#[async_trait]
pub trait ContainerNameLookup: Send + Sync {
    async fn container_name(&self, pid: Pid) -> Option<String>;
}

/// Used when no container runtime collaborator is configured.
pub struct NoopContainerNameLookup;

#[async_trait]
impl ContainerNameLookup for NoopContainerNameLookup {
    async fn container_name(&self, _pid: Pid) -> Option<String> {
        None
    }
}
