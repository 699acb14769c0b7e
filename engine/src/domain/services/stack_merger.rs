//! The stack merger (§4.2). Pure, no I/O, deterministic for fixed input —
//! this is the one component of the pipeline with no async methods at all.

use std::collections::HashMap;

use crate::constants::merger::FP_SHORT_STACK_USER_FRAMES;
use crate::domain::model::{Pid, ProcessToStackSampleCounters, Stack, StackSampleCounters};

/// Well-known native interpreter-entry symbols used to find the splice
/// anchor for a given runtime (§4.2 job 3).
pub fn default_anchors_for(runtime: &str) -> &'static [&'static str] {
    match runtime {
        "python" => &["PyEval_EvalFrameDefault", "PyEval_EvalFrameEx"],
        "java" => &["JavaCalls::call_helper", "JavaThread::thread_main_inner"],
        "ruby" => &["vm_exec_core", "rb_vm_exec"],
        "php" => &["execute_ex", "zend_execute_ex"],
        "nodejs" => &["v8::internal::Execution::Call"],
        "dotnet" => &["CallDescrWorkerInternal"],
        _ => &[],
    }
}

pub struct StackMerger;

impl StackMerger {
    /// Split one collapsed-text line into `(remainder, count)`, skipping the
    /// line if it has no semicolon or its trailing token is not a positive
    /// integer.
    fn parse_line(line: &str) -> Option<(&str, u64)> {
        let line = line.trim();
        if line.is_empty() || !line.contains(';') {
            return None;
        }
        let (stack_part, count_part) = line.rsplit_once(' ')?;
        let count: u64 = count_part.parse().ok()?;
        if count == 0 {
            return None;
        }
        Some((stack_part, count))
    }

    /// Parse collapsed text with no PID tagging — used for a single
    /// already-known PID's managed-runtime output.
    pub fn parse_single(text: &str) -> StackSampleCounters {
        let mut counters = StackSampleCounters::new();
        for line in text.lines() {
            if let Some((stack_text, count)) = Self::parse_line(line) {
                if let Some(stack) = Stack::parse(stack_text) {
                    counters.add(stack, count);
                }
            }
        }
        counters
    }

    /// Parse collapsed text in the `pid/tid stack count` convention emitted
    /// by `perf script -F +pid` for the system-wide sampler. The variant is
    /// detected by checking whether the first token of the first parseable
    /// line looks like `<digits>/<digits>`; if it does not, the whole blob
    /// is treated as un-tagged and no PIDs are recovered (callers of a
    /// single already-known PID should use `parse_single` instead).
    pub fn parse_system_wide(text: &str) -> ProcessToStackSampleCounters {
        let mut result = ProcessToStackSampleCounters::new();

        let has_pid_prefix = text
            .lines()
            .find_map(Self::parse_line)
            .map(|(stack_text, _)| looks_like_pid_tid(first_token(stack_text)))
            .unwrap_or(false);

        if !has_pid_prefix {
            return result;
        }

        for line in text.lines() {
            let Some((stack_text, count)) = Self::parse_line(line) else {
                continue;
            };
            let Some((pid_tid, rest)) = stack_text.split_once(' ') else {
                continue;
            };
            let Some((pid_str, _tid)) = pid_tid.split_once('/') else {
                continue;
            };
            let Ok(pid) = pid_str.parse::<Pid>() else {
                continue;
            };
            if let Some(stack) = Stack::parse(rest.trim_start()) {
                result.merge_into(pid, StackSampleCounters::from_iter([(stack, count)]));
            }
        }

        result
    }

    /// FP/DWARF reconciliation (§4.2 job 2). For each PID present in both,
    /// replace FP stacks that are "too short" or kernel-only with the DWARF
    /// stack for that PID; otherwise keep the FP stack. Counts are summed
    /// without double-counting: a PID's final entry is either its (possibly
    /// replaced) FP counters, or DWARF-only/FP-only counters when the PID is
    /// present in just one source.
    pub fn reconcile_fp_dwarf(
        fp: Option<ProcessToStackSampleCounters>,
        dwarf: Option<ProcessToStackSampleCounters>,
    ) -> ProcessToStackSampleCounters {
        match (fp, dwarf) {
            (Some(fp), None) => fp,
            (None, Some(dwarf)) => dwarf,
            (None, None) => ProcessToStackSampleCounters::new(),
            (Some(fp), Some(dwarf)) => {
                let mut result = ProcessToStackSampleCounters::new();
                let mut seen: std::collections::HashSet<Pid> = std::collections::HashSet::new();

                for pid in fp.pids() {
                    seen.insert(pid);
                    let fp_counters = fp.get(pid).cloned().unwrap_or_default();
                    match dwarf.get(pid) {
                        Some(dwarf_counters) => {
                            result.insert(pid, reconcile_one_pid(fp_counters, dwarf_counters.clone()));
                        }
                        None => result.insert(pid, fp_counters),
                    }
                }
                for pid in dwarf.pids() {
                    if !seen.contains(&pid) {
                        result.insert(pid, dwarf.get(pid).cloned().unwrap_or_default());
                    }
                }
                result
            }
        }
    }

    /// Managed splice (§4.2 job 3) for a single PID. Finds the first native
    /// frame matching one of `anchors`, replaces the contiguous interpreter
    /// run starting there (exactly the anchor frame, conservatively — a
    /// richer "how many C frames to swallow" heuristic is left to runtime
    /// profilers that know their own interpreter's frame shape) with the
    /// managed stack's frames, preserving the managed stack's original
    /// count. If no anchor is found, the managed stack is appended verbatim.
    pub fn splice_one(native: StackSampleCounters, managed: StackSampleCounters, anchors: &[&str]) -> StackSampleCounters {
        if managed.is_empty() {
            return native;
        }
        if anchors.is_empty() || native.is_empty() {
            let mut out = native;
            out.merge(managed);
            return out;
        }

        let mut out = StackSampleCounters::new();
        for (stack, count) in native.into_iter() {
            match stack.find_anchor(anchors) {
                Some(anchor_idx) => {
                    for (managed_stack, managed_count) in managed.iter() {
                        let spliced =
                            stack.spliced(anchor_idx, anchor_idx + 1, managed_stack.frames());
                        out.add(spliced, (*managed_count).min(count));
                    }
                }
                None => out.add(stack, count),
            }
        }
        if out.is_empty() {
            out.merge(managed);
        }
        out
    }

    /// Full per-cycle merge: reconcile FP/DWARF, then splice managed-runtime
    /// stacks into the matching native PID (or append them verbatim).
    /// `anchors_for` maps a PID to the anchor symbol set for whichever
    /// runtime profiled it.
    pub fn merge_cycle(
        fp: Option<ProcessToStackSampleCounters>,
        dwarf: Option<ProcessToStackSampleCounters>,
        managed: HashMap<Pid, StackSampleCounters>,
        anchors_for: impl Fn(Pid) -> &'static [&'static str],
    ) -> ProcessToStackSampleCounters {
        let mut native = Self::reconcile_fp_dwarf(fp, dwarf);

        for (pid, managed_counters) in managed {
            let anchors = anchors_for(pid);
            let native_counters = native.get(pid).cloned().unwrap_or_default();
            let spliced = Self::splice_one(native_counters, managed_counters, anchors);
            native.insert(pid, spliced);
        }

        native
    }
}

fn reconcile_one_pid(fp: StackSampleCounters, dwarf: StackSampleCounters) -> StackSampleCounters {
    let mut out = StackSampleCounters::new();
    for (stack, count) in fp.iter() {
        if is_fp_stack_weak(stack) {
            continue;
        }
        out.add(stack.clone(), *count);
    }
    // Any FP stack deemed weak is dropped in favor of the DWARF data for
    // this PID; DWARF counters are added in full (summed, never doubled,
    // since the weak FP entries were skipped above).
    let dropped_any = fp.iter().any(|(s, _)| is_fp_stack_weak(s));
    if dropped_any || out.is_empty() {
        out.merge(dwarf);
    }
    out
}

fn is_fp_stack_weak(stack: &Stack) -> bool {
    stack.user_frame_count() < FP_SHORT_STACK_USER_FRAMES || stack.contains_only_kernel_frames()
}

fn first_token(s: &str) -> &str {
    s.split_whitespace().next().unwrap_or("")
}

fn looks_like_pid_tid(token: &str) -> bool {
    match token.split_once('/') {
        Some((a, b)) => !a.is_empty() && !b.is_empty() && a.bytes().all(|c| c.is_ascii_digit()) && b.bytes().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_skips_malformed_lines() {
        let text = "a;b 3\nno-semicolon 5\na;c notanumber\nx;y 0\n";
        let counters = StackMerger::parse_single(text);
        assert_eq!(counters.len(), 1);
        assert_eq!(counters.get(&Stack::parse("a;b").unwrap()), Some(3));
    }

    #[test]
    fn parse_system_wide_extracts_pid_from_prefix() {
        let text = "42/42 a;b;c 3\n42/43 a;b;d 2\n99/99 x;y 1\n";
        let result = StackMerger::parse_system_wide(text);
        assert_eq!(result.len(), 2);
        assert_eq!(
            result.get(42).unwrap().get(&Stack::parse("a;b;c").unwrap()),
            Some(3)
        );
    }

    #[test]
    fn parse_system_wide_without_pid_prefix_returns_empty() {
        let result = StackMerger::parse_system_wide("a;b;c 3\n");
        assert!(result.is_empty());
    }

    #[test]
    fn two_profiler_merge_seed_scenario() {
        // Seed scenario 1: system sampler emits a;b;PyEval_EvalFrameDefault 3
        // for PID 42; python runtime emits main;work 3 for the same PID.
        let mut native = ProcessToStackSampleCounters::new();
        native.insert(
            42,
            StackMerger::parse_single("a;b;PyEval_EvalFrameDefault 3"),
        );
        let managed = StackMerger::parse_single("main;work 3");

        let merged = StackMerger::merge_cycle(
            Some(native),
            None,
            HashMap::from([(42, managed)]),
            |_| default_anchors_for("python"),
        );

        let counters = merged.get(42).unwrap();
        assert_eq!(counters.len(), 1);
        assert_eq!(
            counters.get(&Stack::parse("a;b;main;work").unwrap()),
            Some(3)
        );
    }

    #[test]
    fn dwarf_fallback_seed_scenario() {
        // Seed scenario 2: FP has a too-short stack for PID 42; DWARF has a
        // full one; the merged result keeps only the DWARF stack.
        let mut fp = ProcessToStackSampleCounters::new();
        fp.insert(42, StackMerger::parse_single("short 10"));
        let mut dwarf = ProcessToStackSampleCounters::new();
        dwarf.insert(42, StackMerger::parse_single("a;b;c;d 10"));

        let merged = StackMerger::reconcile_fp_dwarf(Some(fp), Some(dwarf));
        let counters = merged.get(42).unwrap();
        assert_eq!(counters.len(), 1);
        assert_eq!(counters.get(&Stack::parse("a;b;c;d").unwrap()), Some(10));
    }

    #[test]
    fn splice_preserves_total_samples_when_anchor_absent() {
        let mut native = StackSampleCounters::new();
        native.add(Stack::parse("a;b").unwrap(), 4);
        let mut managed = StackSampleCounters::new();
        managed.add(Stack::parse("x;y").unwrap(), 2);

        let spliced = StackMerger::splice_one(native, managed, &["NoSuchAnchor"]);
        assert_eq!(spliced.total(), 6);
    }

    #[test]
    fn merger_idempotent_on_empty_and_commutative() {
        let mut a = StackSampleCounters::new();
        a.add(Stack::parse("a;b").unwrap(), 3);
        let mut copy = a.clone();
        copy.merge(StackSampleCounters::new());
        assert_eq!(copy, a);
    }
}
