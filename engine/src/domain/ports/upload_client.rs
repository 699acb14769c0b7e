//! Upload collaborator port (§6 Outputs, §10.4). Upload failures are logged
//! and never affect subsequent cycles — callers must not propagate them as
//! fatal.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait UploadClient: Send + Sync {
    /// `body` is the already-serialized (but not yet compressed) JSON
    /// payload `{format_version, timestamp, metrics}`; `timestamp` (unix
    /// seconds) is threaded through separately since it also belongs on the
    /// request's `timestamp` query parameter (§6 Outputs).
    async fn upload(&self, body: Vec<u8>, timestamp: u64) -> Result<()>;
}

/// Used when no upload destination is configured.
pub struct NoopUploadClient;

#[async_trait]
impl UploadClient for NoopUploadClient {
    async fn upload(&self, _body: Vec<u8>, _timestamp: u64) -> Result<()> {
        Ok(())
    }
}
