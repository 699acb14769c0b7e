//! Per-PID profile data and the canonical per-cycle merge result.

use std::collections::HashMap;

use super::metadata::ProfileMetadata;
use super::stack::StackSampleCounters;
use super::Pid;

/// Everything known about a single PID for one cycle.
#[derive(Debug, Clone, Default)]
pub struct ProfileData {
    pub counters: StackSampleCounters,
    pub app_id: Option<String>,
    pub app_metadata: Option<ProfileMetadata>,
    pub container_name: Option<String>,
}

impl ProfileData {
    pub fn new(counters: StackSampleCounters) -> Self {
        Self {
            counters,
            app_id: None,
            app_metadata: None,
            container_name: None,
        }
    }
}

/// `PID -> StackSampleCounters`. The canonical per-cycle result before
/// enrichment. Invariant: a PID never appears with an empty counters map.
#[derive(Debug, Clone, Default)]
pub struct ProcessToStackSampleCounters {
    by_pid: HashMap<Pid, StackSampleCounters>,
}

impl ProcessToStackSampleCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert counters for `pid`, dropping the entry entirely if empty so the
    /// "never empty" invariant holds without the caller having to check.
    pub fn insert(&mut self, pid: Pid, counters: StackSampleCounters) {
        if counters.is_empty() {
            self.by_pid.remove(&pid);
        } else {
            self.by_pid.insert(pid, counters);
        }
    }

    /// Merge `counters` into whatever is already recorded for `pid`.
    pub fn merge_into(&mut self, pid: Pid, counters: StackSampleCounters) {
        if counters.is_empty() {
            return;
        }
        self.by_pid.entry(pid).or_default().merge(counters);
    }

    pub fn get(&self, pid: Pid) -> Option<&StackSampleCounters> {
        self.by_pid.get(&pid)
    }

    pub fn pids(&self) -> impl Iterator<Item = Pid> + '_ {
        self.by_pid.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Pid, &StackSampleCounters)> {
        self.by_pid.iter().map(|(pid, c)| (*pid, c))
    }

    pub fn is_empty(&self) -> bool {
        self.by_pid.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_pid.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Stack;

    #[test]
    fn insert_drops_empty_counters() {
        let mut map = ProcessToStackSampleCounters::new();
        map.insert(100, StackSampleCounters::new());
        assert!(map.get(100).is_none());
        assert!(map.is_empty());
    }

    #[test]
    fn merge_into_accumulates() {
        let mut map = ProcessToStackSampleCounters::new();
        let mut c1 = StackSampleCounters::new();
        c1.add(Stack::parse("a;b").unwrap(), 3);
        map.merge_into(1, c1);

        let mut c2 = StackSampleCounters::new();
        c2.add(Stack::parse("a;b").unwrap(), 2);
        map.merge_into(1, c2);

        assert_eq!(map.get(1).unwrap().get(&Stack::parse("a;b").unwrap()), Some(5));
    }
}
