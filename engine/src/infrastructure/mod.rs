//! Concrete adapters for the domain's ports, plus startup wiring
//! (configuration, logging) that has no port of its own.

pub mod agent_mutex;
pub mod child_process_runner;
pub mod config;
pub mod container_name_lookup;
pub mod emitter;
pub mod external_metadata_source;
pub mod host_usage_reader;
pub mod logging;
pub mod process_namespace;
pub mod signal_handlers;
pub mod static_metadata;
pub mod upload_client;
