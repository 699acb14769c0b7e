//! Domain layer: value types (`model`), ports the domain programs against,
//! and the services that implement §4's component design. Nothing in here
//! does raw I/O beyond what a port's trait object provides; concrete
//! adapters live in `crate::infrastructure`.

pub mod model;
pub mod ports;
pub mod process_registry;
pub mod profilers;
pub mod services;
pub mod stop_signal;
