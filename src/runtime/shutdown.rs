//! Process-wide cooperative stop signal.
//!
//! The flag only ever goes from unset to set. Every loop polls with a short
//! timeout and re-reads it each iteration, so a set flag is observed within
//! one poll interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why shutdown was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// A client sent the stop command.
    StopCommand { conn_id: u64 },
    /// An I/O error configured to halt the whole service.
    FatalIo,
}

/// Shared handle to the shutdown flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    stopped: Arc<AtomicBool>,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Request shutdown.
    ///
    /// Returns `true` only for the call that actually set the flag; later
    /// calls are no-ops.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let first = !self.stopped.swap(true, Ordering::AcqRel);
        if !first {
            debug!(?reason, "Shutdown already in progress");
            return false;
        }

        match reason {
            ShutdownReason::StopCommand { conn_id } => {
                info!(conn_id, "Stop command received, shutting down");
            }
            ShutdownReason::FatalIo => {
                warn!("Fatal I/O error, shutting down");
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_trigger_once() {
        let flag = ShutdownFlag::new();
        assert!(!flag.is_set());

        assert!(flag.trigger(ShutdownReason::StopCommand { conn_id: 1 }));
        assert!(flag.is_set());

        assert!(!flag.trigger(ShutdownReason::StopCommand { conn_id: 2 }));
        assert!(!flag.trigger(ShutdownReason::FatalIo));
        assert!(flag.is_set());
    }

    #[test]
    fn test_clones_share_state() {
        let flag = ShutdownFlag::new();
        let other = flag.clone();
        other.trigger(ShutdownReason::FatalIo);
        assert!(flag.is_set());
    }

    #[test]
    fn test_concurrent_triggers_single_winner() {
        let flag = ShutdownFlag::new();
        let handles: Vec<_> = (0..8)
            .map(|conn_id| {
                let flag = flag.clone();
                thread::spawn(move || flag.trigger(ShutdownReason::StopCommand { conn_id }))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&first| first)
            .count();
        assert_eq!(winners, 1);
        assert!(flag.is_set());
    }
}
