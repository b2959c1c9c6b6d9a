//! One-shot ownership handoff between the acceptor and a new handler thread.
//!
//! The resource moves into the spawned thread inside a [`Handoff`]. The
//! thread calls [`Handoff::take`], which blocks on a zero-capacity channel
//! until the acceptor has observed the acknowledgment through
//! [`HandoffWait::wait`]. Neither side moves on until both have met, so the
//! acceptor cannot start its next accept before the previous socket has a new
//! owner, and the handler cannot start servicing before the acceptor knows it.

use crate::runtime::ShutdownFlag;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;
use tracing::{debug, trace};

/// Unanswered intervals between operator-visible reports of a slow handoff.
const SLOW_HANDOFF_REPORT: u32 = 10;

/// Resource in transit, owned by the receiving thread.
pub struct Handoff<T> {
    resource: T,
    ack: SyncSender<()>,
}

/// Acceptor side of a handoff.
pub struct HandoffWait {
    ack: Receiver<()>,
}

/// How a handoff wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffOutcome {
    /// The receiving thread owns the resource.
    Acknowledged,
    /// The `Handoff` was dropped without being taken.
    Abandoned,
}

/// Wrap `resource` for transfer to another thread.
pub fn handoff<T>(resource: T) -> (Handoff<T>, HandoffWait) {
    let (tx, rx) = mpsc::sync_channel(0);
    (Handoff { resource, ack: tx }, HandoffWait { ack: rx })
}

impl<T> Handoff<T> {
    /// Take ownership, blocking until the acceptor sees the acknowledgment.
    pub fn take(self) -> T {
        // A gone receiver means nobody is waiting any more; ownership is ours
        // either way.
        let _ = self.ack.send(());
        self.resource
    }
}

impl HandoffWait {
    /// Block until the handoff is acknowledged or abandoned, waking every
    /// `interval` to report progress. Returns the outcome and the number of
    /// intervals that elapsed without an answer.
    ///
    /// A pending shutdown does not cut the wait short: the receiving thread
    /// still has to take the resource so it can be released and joined.
    pub fn wait(self, interval: Duration, shutdown: &ShutdownFlag) -> (HandoffOutcome, u32) {
        let mut timeouts = 0;
        loop {
            match self.ack.recv_timeout(interval) {
                Ok(()) => return (HandoffOutcome::Acknowledged, timeouts),
                Err(RecvTimeoutError::Timeout) => {
                    timeouts += 1;
                    if timeouts % SLOW_HANDOFF_REPORT == 0 {
                        debug!(
                            timeouts,
                            shutting_down = shutdown.is_set(),
                            "Handoff not yet acknowledged"
                        );
                    } else {
                        trace!(timeouts, "Still waiting for handoff acknowledgment");
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return (HandoffOutcome::Abandoned, timeouts)
                }
            }
        }
    }
}
