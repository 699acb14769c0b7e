//! File-based `ExternalMetadataSource` adapter. Re-reads the configured path
//! every cycle and enforces mtime staleness; parsing itself lives in
//! `domain::model::metadata` so it stays unit-testable without I/O.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::constants::session::EXTERNAL_METADATA_STALENESS_THRESHOLD;
use crate::domain::model::ExternalMetadata;
use crate::domain::ports::ExternalMetadataSource;
use crate::error::Result;

pub struct FileExternalMetadataSource {
    path: PathBuf,
}

impl FileExternalMetadataSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ExternalMetadataSource for FileExternalMetadataSource {
    async fn read(&self) -> Result<ExternalMetadata> {
        let metadata = tokio::fs::metadata(&self.path).await?;
        let age = metadata
            .modified()
            .ok()
            .and_then(|m| SystemTime::now().duration_since(m).ok())
            .unwrap_or(Duration::ZERO);

        let contents = tokio::fs::read_to_string(&self.path).await?;
        ExternalMetadata::parse(
            &contents,
            &self.path.display().to_string(),
            age,
            EXTERNAL_METADATA_STALENESS_THRESHOLD,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_and_parses_a_fresh_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        tokio::fs::write(&path, r#"{"static":{"env":"staging"}}"#)
            .await
            .unwrap();

        let source = FileExternalMetadataSource::new(path);
        let meta = source.read().await.unwrap();
        assert_eq!(
            meta.static_metadata.get("env"),
            Some(&serde_json::Value::String("staging".to_string()))
        );
    }

    #[tokio::test]
    async fn missing_file_surfaces_as_io_error() {
        let source = FileExternalMetadataSource::new(PathBuf::from("/nonexistent/meta.json"));
        assert!(source.read().await.is_err());
    }
}
