//! Emitter port (§4.7). Infrastructure writes the collapsed artifact
//! atomically and optionally renders HTML / hands off to the upload client.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::model::{
    HwMetrics, Pid, ProcessToStackSampleCounters, ProfileMetadata, SystemMetrics,
};
use crate::error::Result;

/// Everything a single cycle produces, ready to be written out.
#[derive(Debug, Clone, Default)]
pub struct EmitRecord {
    pub static_metadata: ProfileMetadata,
    pub application_metadata: HashMap<Pid, ProfileMetadata>,
    pub hw_metrics: HwMetrics,
    pub sys_metrics: SystemMetrics,
    pub stacks: ProcessToStackSampleCounters,
}

#[async_trait]
pub trait Emitter: Send + Sync {
    async fn emit(&self, record: &EmitRecord) -> Result<()>;
}
