//! Flat, JSON-serializable metadata maps and the external-metadata file
//! format.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Pid;
use crate::error::{AgentError, Result};

/// A flat string-keyed, JSON-serializable map. The three flavors described by
/// the spec (`static`, `application`, `external`) all share this shape; the
/// boundary helper `ProfileMetadata::from_serializable` is the single place
/// that enforces "duck-typed" values are actually JSON-serializable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileMetadata {
    fields: HashMap<String, Value>,
}

impl ProfileMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self> {
        use serde::de::Error as _;

        let json = serde_json::to_value(value)?;
        match json {
            Value::Object(map) => Ok(Self {
                fields: map.into_iter().collect(),
            }),
            other => Err(AgentError::Json(serde_json::Error::custom(format!(
                "metadata must serialize to a JSON object, got {other}"
            )))),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn merge(&mut self, other: ProfileMetadata) {
        self.fields.extend(other.fields);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }
}

/// `{ static: map, application: PID -> map }`, re-read every cycle from a
/// user-provided JSON file.
#[derive(Debug, Clone, Default)]
pub struct ExternalMetadata {
    pub static_metadata: ProfileMetadata,
    pub application_metadata: HashMap<Pid, ProfileMetadata>,
}

/// Wire shape of the external metadata file:
/// `{ "static": {...}, "application": { "<pid>": {...} } }`.
#[derive(Debug, Deserialize)]
struct ExternalMetadataFile {
    #[serde(default)]
    r#static: HashMap<String, Value>,
    #[serde(default)]
    application: HashMap<String, HashMap<String, Value>>,
}

impl ExternalMetadata {
    /// Parse the file contents. Callers are responsible for the mtime
    /// staleness check (`age` is supplied so this stays pure and testable).
    pub fn parse(contents: &str, path: &str, age: Duration, staleness_threshold: Duration) -> Result<Self> {
        if age > staleness_threshold {
            return Err(AgentError::ExternalMetadataStale {
                path: path.to_string(),
                age_secs: age.as_secs(),
            });
        }

        let file: ExternalMetadataFile = serde_json::from_str(contents)?;

        let application_metadata = file
            .application
            .into_iter()
            .filter_map(|(pid_str, fields)| {
                let pid: Pid = pid_str.parse().ok()?;
                Some((pid, ProfileMetadata { fields }))
            })
            .collect();

        Ok(ExternalMetadata {
            static_metadata: ProfileMetadata {
                fields: file.r#static,
            },
            application_metadata,
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_static_and_per_pid_application_metadata() {
        let json = r#"{"static":{"env":"prod"},"application":{"1234":{"team":"A"}}}"#;
        let meta = ExternalMetadata::parse(json, "meta.json", Duration::from_secs(1), Duration::from_secs(300))
            .unwrap();
        assert_eq!(
            meta.static_metadata.get("env"),
            Some(&Value::String("prod".to_string()))
        );
        assert_eq!(
            meta.application_metadata.get(&1234).unwrap().get("team"),
            Some(&Value::String("A".to_string()))
        );
    }

    #[test]
    fn stale_file_is_rejected() {
        let err = ExternalMetadata::parse("{}", "meta.json", Duration::from_secs(301), Duration::from_secs(300))
            .unwrap_err();
        assert!(matches!(err, AgentError::ExternalMetadataStale { .. }));
    }

    #[test]
    fn non_numeric_pid_keys_are_skipped_not_fatal() {
        let json = r#"{"static":{},"application":{"not-a-pid":{"x":"y"}}}"#;
        let meta = ExternalMetadata::parse(json, "meta.json", Duration::from_secs(0), Duration::from_secs(300))
            .unwrap();
        assert!(meta.application_metadata.is_empty());
    }
}
