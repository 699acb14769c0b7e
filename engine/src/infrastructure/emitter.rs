//! Collapsed-file `Emitter` adapter (§4.7, §6). Writes `last_profile.col`
//! atomically (temp file + rename into place, matching the teacher's
//! config-writer pattern), optionally renders a standalone HTML flamegraph
//! via `inferno`, and optionally hands the cycle off to an `UploadClient`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::domain::ports::{EmitRecord, Emitter, UploadClient};
use crate::error::{AgentError, Result};

fn json_scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub struct CollapsedFileEmitter {
    output_dir: PathBuf,
    render_flamegraph: bool,
    upload: Option<Arc<dyn UploadClient>>,
    format_version: u32,
}

impl CollapsedFileEmitter {
    pub fn new(
        output_dir: PathBuf,
        render_flamegraph: bool,
        upload: Option<Arc<dyn UploadClient>>,
    ) -> Self {
        Self {
            output_dir,
            render_flamegraph,
            upload,
            format_version: 1,
        }
    }

    fn collapsed_lines(record: &EmitRecord) -> Vec<String> {
        let mut lines = Vec::new();
        for (pid, counters) in record.stacks.iter() {
            for (stack, count) in counters.iter() {
                lines.push(format!("{pid}/{pid} {stack} {count}", pid = pid, stack = stack, count = count));
            }
        }
        lines
    }

    /// Trailing `# key: value` comment block (§6 Outputs): static metadata
    /// first, then one line per PID carrying that PID's application
    /// metadata. Sorted for deterministic output; omitted entirely when
    /// there is nothing to report, so an idle cycle's file stays empty.
    fn metadata_header_lines(record: &EmitRecord) -> Vec<String> {
        let mut lines = Vec::new();

        let mut static_keys: Vec<_> = record.static_metadata.iter().collect();
        static_keys.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in static_keys {
            lines.push(format!("# {key}: {}", json_scalar(value)));
        }

        let mut pids: Vec<_> = record.application_metadata.keys().copied().collect();
        pids.sort_unstable();
        for pid in pids {
            let meta = &record.application_metadata[&pid];
            let mut keys: Vec<_> = meta.iter().collect();
            keys.sort_by(|a, b| a.0.cmp(b.0));
            for (key, value) in keys {
                lines.push(format!("# pid {pid} {key}: {}", json_scalar(value)));
            }
        }

        lines
    }

    async fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent).await?;
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, contents).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        Ok(())
    }

    fn render_html(lines: &[String]) -> Result<Vec<u8>> {
        use inferno::flamegraph::{from_lines, Options};

        let mut options = Options::default();
        let mut out = Vec::new();
        from_lines(
            &mut options,
            lines.iter().map(|l| l.as_str()),
            &mut out,
        )
        .map_err(|e| AgentError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        Ok(out)
    }

    fn spark_metrics_body(record: &EmitRecord, timestamp: u64) -> Result<Vec<u8>> {
        let mut metrics = serde_json::Map::new();
        for (key, value) in record.static_metadata.iter() {
            metrics.insert(key.clone(), value.clone());
        }

        let mut per_pid = serde_json::Map::new();
        for (pid, meta) in &record.application_metadata {
            let mut obj = serde_json::Map::new();
            for (k, v) in meta.iter() {
                obj.insert(k.clone(), v.clone());
            }
            per_pid.insert(pid.to_string(), serde_json::Value::Object(obj));
        }
        metrics.insert("application_metadata".to_string(), serde_json::Value::Object(per_pid));

        if let Some(cpu) = record.sys_metrics.cpu_avg {
            metrics.insert("cpu_avg".to_string(), serde_json::json!(cpu));
        }
        if let Some(mem) = record.sys_metrics.mem_avg {
            metrics.insert("mem_avg".to_string(), serde_json::json!(mem));
        }

        let payload = serde_json::json!({
            "format_version": 1,
            "timestamp": timestamp,
            "metrics": serde_json::Value::Object(metrics),
        });
        Ok(serde_json::to_vec(&payload)?)
    }
}

#[async_trait]
impl Emitter for CollapsedFileEmitter {
    async fn emit(&self, record: &EmitRecord) -> Result<()> {
        let lines = Self::collapsed_lines(record);
        let header = Self::metadata_header_lines(record);
        let collapsed_path = self.output_dir.join("last_profile.col");
        let mut all = lines.clone();
        all.extend(header);
        Self::write_atomically(&collapsed_path, all.join("\n").as_bytes()).await?;

        if self.render_flamegraph && !lines.is_empty() {
            match Self::render_html(&lines) {
                Ok(html) => {
                    let html_path = self.output_dir.join("last_profile.html");
                    if let Err(e) = Self::write_atomically(&html_path, &html).await {
                        warn!(error = %e, "failed to write flamegraph HTML");
                    }
                }
                Err(e) => warn!(error = %e, "failed to render flamegraph"),
            }
        }

        if let Some(upload) = &self.upload {
            let timestamp = std::time::SystemTime::now()
                .duration_since(std::time::SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            let body = Self::spark_metrics_body(record, timestamp)?;
            if let Err(e) = upload.upload(body, timestamp).await {
                warn!(error = %e, "upload failed, continuing without it");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{ProcessToStackSampleCounters, Stack, StackSampleCounters};

    #[tokio::test]
    async fn writes_collapsed_file_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = CollapsedFileEmitter::new(dir.path().to_path_buf(), false, None);

        let mut counters = StackSampleCounters::new();
        counters.add(Stack::parse("main;work").unwrap(), 5);
        let mut stacks = ProcessToStackSampleCounters::new();
        stacks.insert(100, counters);

        let record = EmitRecord {
            stacks,
            ..Default::default()
        };

        emitter.emit(&record).await.unwrap();

        let contents = tokio::fs::read_to_string(dir.path().join("last_profile.col"))
            .await
            .unwrap();
        assert_eq!(contents, "100/100 main;work 5");
    }

    #[tokio::test]
    async fn appends_metadata_as_trailing_comment_lines() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = CollapsedFileEmitter::new(dir.path().to_path_buf(), false, None);

        let mut counters = StackSampleCounters::new();
        counters.add(Stack::parse("main;work").unwrap(), 5);
        let mut stacks = ProcessToStackSampleCounters::new();
        stacks.insert(100, counters);

        let mut static_metadata = crate::domain::model::ProfileMetadata::new();
        static_metadata.insert("env", "prod");
        let mut app_metadata = std::collections::HashMap::new();
        let mut pid_meta = crate::domain::model::ProfileMetadata::new();
        pid_meta.insert("team", "A");
        app_metadata.insert(100, pid_meta);

        let record = EmitRecord {
            stacks,
            static_metadata,
            application_metadata: app_metadata,
            ..Default::default()
        };

        emitter.emit(&record).await.unwrap();

        let contents = tokio::fs::read_to_string(dir.path().join("last_profile.col"))
            .await
            .unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "100/100 main;work 5");
        assert!(lines.contains(&"# env: prod"));
        assert!(lines.contains(&"# pid 100 team: A"));
    }

    #[tokio::test]
    async fn empty_cycle_still_writes_an_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = CollapsedFileEmitter::new(dir.path().to_path_buf(), false, None);
        emitter.emit(&EmitRecord::default()).await.unwrap();
        let contents = tokio::fs::read_to_string(dir.path().join("last_profile.col"))
            .await
            .unwrap();
        assert!(contents.is_empty());
    }
}
