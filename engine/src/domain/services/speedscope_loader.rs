//! Converts speedscope-format JSON (emitted by some managed-runtime
//! helpers, e.g. `dotnet-trace`) into `StackSampleCounters`, per §4.4:
//! "Helpers that support speedscope JSON are converted to collapsed via a
//! dedicated loader."
//!
//! Speedscope's "sampled" profile type stores a shared frame table and, per
//! profile, a list of sample stacks (root-first frame indexes) with parallel
//! weights. We read the first `sampled` profile, resolve frame indexes
//! through the shared table, reverse to leaf-first (this crate's stack
//! convention, §3 Glossary), and round each weight to an integer sample
//! count.

use crate::domain::model::{Stack, StackSampleCounters};
use crate::error::{AgentError, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SpeedscopeFile {
    shared: SharedFrames,
    profiles: Vec<SpeedscopeProfile>,
}

#[derive(Debug, Deserialize)]
struct SharedFrames {
    frames: Vec<FrameEntry>,
}

#[derive(Debug, Deserialize)]
struct FrameEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpeedscopeProfile {
    #[serde(rename = "type")]
    profile_type: String,
    samples: Vec<Vec<usize>>,
    weights: Vec<f64>,
}

/// Parses speedscope JSON text into collapsed-stack counters. Returns an
/// error rather than silently empty output if the file has no `"sampled"`
/// profile — callers (the owning profiler's `snapshot`) are expected to
/// downgrade this per-PID, per §7's propagation policy.
pub fn load_speedscope_as_collapsed(json: &str) -> Result<StackSampleCounters> {
    let file: SpeedscopeFile = serde_json::from_str(json)?;
    let profile = file
        .profiles
        .iter()
        .find(|p| p.profile_type == "sampled")
        .ok_or_else(|| AgentError::UnsupportedEnvironment("no sampled speedscope profile".to_string()))?;

    let mut counters = StackSampleCounters::new();
    for (sample, weight) in profile.samples.iter().zip(profile.weights.iter()) {
        let mut frames: Vec<String> = sample
            .iter()
            .filter_map(|idx| file.shared.frames.get(*idx).map(|f| f.name.clone()))
            .collect();
        frames.reverse(); // speedscope is root-first; this crate's stacks are leaf-first.
        let Some(stack) = Stack::new(frames) else {
            continue;
        };
        let count = weight.round().max(1.0) as u64;
        counters.add(stack, count);
    }
    Ok(counters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sampled_profile_leaf_first() {
        let json = r#"{
            "shared": {"frames": [{"name": "main"}, {"name": "work"}]},
            "profiles": [{
                "type": "sampled",
                "samples": [[0, 1], [0, 1]],
                "weights": [1, 2]
            }]
        }"#;
        let counters = load_speedscope_as_collapsed(json).unwrap();
        assert_eq!(counters.get(&Stack::parse("work;main").unwrap()), Some(3));
    }

    #[test]
    fn missing_sampled_profile_errors() {
        let json = r#"{"shared":{"frames":[]},"profiles":[{"type":"evented","samples":[],"weights":[]}]}"#;
        assert!(load_speedscope_as_collapsed(json).is_err());
    }
}
