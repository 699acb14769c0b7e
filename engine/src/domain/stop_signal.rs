//! The shared, level-triggered stop signal.
//!
//! A plain `Arc<AtomicBool>` wrapper rather than a `tokio::sync::Notify` or
//! broadcast channel: the spec requires it be readable from any thread
//! without blocking, and idempotent (setting it twice is a no-op from the
//! readers' point of view). Async waiters combine it with `tokio::select!`
//! against their own timeout/IO future; see `ChildProcessRunner::wait_with_timeout`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once the signal is set. Intended to be raced with other
    /// futures via `tokio::select!`; polls at a coarse interval since the
    /// signal has no waker registration of its own.
    pub async fn wait(&self) {
        while !self.is_set() {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_is_idempotent_and_visible_from_clones() {
        let signal = StopSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_set());
        signal.set();
        signal.set();
        assert!(clone.is_set());
    }
}
