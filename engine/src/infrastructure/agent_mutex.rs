//! Single-instance lock (§4.1, §7): binds an abstract-namespace Unix domain
//! socket (`\0gprofiler_lock`, never a path on disk, so nothing to clean up
//! after a crash) and holds it for the process lifetime. A second agent
//! binding the same address fails with `EADDRINUSE`, which we surface as
//! `AgentError::MutexHeld`.

use std::os::linux::net::SocketAddrExt;
use std::os::unix::net::{SocketAddr, UnixListener};

use crate::constants::AGENT_MUTEX_ADDRESS;
use crate::error::{AgentError, Result};

/// Holds the bound socket for as long as the agent runs; dropping it frees
/// the abstract address immediately.
pub struct AgentMutex {
    _listener: UnixListener,
}

impl AgentMutex {
    pub fn acquire() -> Result<Self> {
        Self::acquire_named(AGENT_MUTEX_ADDRESS)
    }

    fn acquire_named(name: &str) -> Result<Self> {
        let addr = SocketAddr::from_abstract_name(name.as_bytes()).map_err(AgentError::Io)?;
        let listener = UnixListener::bind_addr(&addr).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                AgentError::MutexHeld
            } else {
                AgentError::Io(e)
            }
        })?;
        Ok(Self { _listener: listener })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_of_the_same_address_fails() {
        let address = format!("gprofiler_lock_test_{}", std::process::id());
        let _first = AgentMutex::acquire_named(&address).unwrap();
        let second = AgentMutex::acquire_named(&address);
        assert!(matches!(second, Err(AgentError::MutexHeld)));
    }
}
