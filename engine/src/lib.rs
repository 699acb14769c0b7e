//! gprofiler-style continuous whole-host profiling agent.
//!
//! The domain layer (`domain`) implements the profiling orchestrator, the
//! perf supervisor, the stack merger, and the per-runtime profiler registry
//! against a small set of ports. `infrastructure` supplies the concrete
//! adapters (child-process execution, the collapsed-file emitter, the
//! upload transport, configuration, logging) that the binary in
//! `src/bin/agent.rs` wires together.

pub mod constants;
pub mod domain;
pub mod error;
pub mod infrastructure;
