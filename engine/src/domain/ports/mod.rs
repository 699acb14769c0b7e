//! Ports: the interfaces the domain programs against. Infrastructure
//! implements them; profilers implement `RuntimeProfiler`.

mod child_process_runner;
mod container_name_lookup;
mod emitter;
mod external_metadata_source;
mod runtime_profiler;
mod upload_client;

pub use child_process_runner::{ChildHandle, ChildProcessRunner, ChildSpec, ExitOutcome, Stdio};
pub use container_name_lookup::{ContainerNameLookup, NoopContainerNameLookup};
pub use emitter::{EmitRecord, Emitter};
pub use external_metadata_source::{ExternalMetadataSource, NoExternalMetadataSource};
pub use runtime_profiler::{
    Arch, ProfilerDescriptor, ProfilerRegistry, ProfilingMode, RuntimeProfiler,
};
pub use upload_client::{NoopUploadClient, UploadClient};
