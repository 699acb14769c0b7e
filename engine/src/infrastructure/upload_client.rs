//! `ureq`-based `UploadClient` adapter (§10.4), matching the teacher's
//! choice of `ureq` wrapped in `spawn_blocking` for its health-check
//! executor rather than pulling in an async HTTP stack for one call site.
//! The body is gzip-compressed, matching the samply example's use of
//! `flate2` for its own compressed artifacts.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::warn;

use crate::domain::ports::UploadClient;
use crate::error::{AgentError, Result};

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone)]
pub struct SparkUploadConfig {
    pub server_address: String,
    pub api_version: String,
    pub auth_token: String,
    pub service: String,
    pub hostname: String,
    pub key: Option<String>,
}

pub struct SparkUploadClient {
    config: SparkUploadConfig,
}

impl SparkUploadClient {
    pub fn new(config: SparkUploadConfig) -> Self {
        Self { config }
    }

    fn url(&self, timestamp: u64) -> String {
        let mut url = format!(
            "{}/api/{}/spark_metrics?service={}&hostname={}&timestamp={}&version={}",
            self.config.server_address.trim_end_matches('/'),
            self.config.api_version,
            urlencode(&self.config.service),
            urlencode(&self.config.hostname),
            timestamp,
            urlencode(AGENT_VERSION),
        );
        if let Some(key) = &self.config.key {
            url.push_str(&format!("&key={}", urlencode(key)));
        }
        url
    }
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[async_trait]
impl UploadClient for SparkUploadClient {
    async fn upload(&self, body: Vec<u8>, timestamp: u64) -> Result<()> {
        let url = self.url(timestamp);
        let token = self.config.auth_token.clone();
        let service = self.config.service.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(&body)
                .map_err(AgentError::Io)?;
            let compressed = encoder.finish().map_err(AgentError::Io)?;

            let agent = ureq::AgentBuilder::new().timeout(UPLOAD_TIMEOUT).build();
            let result = agent
                .post(&url)
                .set("Content-Encoding", "gzip")
                .set("Content-Type", "application/json")
                .set("Authorization", &format!("Bearer {token}"))
                .set("X-Gprofiler-Service", &service)
                .send_bytes(&compressed);

            match result {
                Ok(_) => Ok(()),
                Err(ureq::Error::Status(code, response)) => {
                    let body = response.into_string().unwrap_or_default();
                    Err(AgentError::ApiError { status: code, body })
                }
                Err(ureq::Error::Transport(t)) => {
                    warn!(error = %t, "spark metrics upload transport error");
                    Err(AgentError::ApiError {
                        status: 0,
                        body: t.to_string(),
                    })
                }
            }
        })
        .await
        .map_err(|e| AgentError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_includes_query_parameters() {
        let client = SparkUploadClient::new(SparkUploadConfig {
            server_address: "https://example.com".to_string(),
            api_version: "v1".to_string(),
            auth_token: "tok".to_string(),
            service: "my service".to_string(),
            hostname: "host-1".to_string(),
            key: Some("abc123".to_string()),
        });
        let url = client.url(1_700_000_000);
        assert!(url.starts_with("https://example.com/api/v1/spark_metrics?"));
        assert!(url.contains("service=my%20service"));
        assert!(url.contains("hostname=host-1"));
        assert!(url.contains("key=abc123"));
        assert!(url.contains("timestamp=1700000000"));
        assert!(url.contains(&format!("version={}", AGENT_VERSION)));
    }
}
