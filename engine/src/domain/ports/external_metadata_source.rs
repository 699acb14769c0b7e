//! Port for re-reading the external metadata file every cycle (§3, §4.6
//! step 2). Infrastructure owns the mtime check; the parsing logic itself
//! lives in `domain::model::metadata` so it stays unit-testable without I/O.

use async_trait::async_trait;

use crate::domain::model::ExternalMetadata;
use crate::error::Result;

#[async_trait]
pub trait ExternalMetadataSource: Send + Sync {
    /// Returns `Ok(ExternalMetadata::empty())` when no path is configured,
    /// and `Err(AgentError::ExternalMetadataStale)` when configured but
    /// stale — the orchestrator logs and proceeds without it either way.
    async fn read(&self) -> Result<ExternalMetadata>;
}

/// Used when no external metadata path is configured.
pub struct NoExternalMetadataSource;

#[async_trait]
impl ExternalMetadataSource for NoExternalMetadataSource {
    async fn read(&self) -> Result<ExternalMetadata> {
        Ok(ExternalMetadata::empty())
    }
}
