//! Change notification.
//!
//! A payloadless "tickets changed" signal fanned out to subscribers so they
//! can refresh cached views. Correctness never depends on delivery: every
//! reservation re-reads storage under the lock.

use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 16;

/// Emitted after any committed mutation of the partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketsChanged;

/// Fan-out channel for [`TicketsChanged`].
///
/// Cloning yields another handle on the same channel, so store handles
/// sharing a bus notify each other.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<TicketsChanged>,
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeBus {
    /// Creates a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribes to future change events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TicketsChanged> {
        self.sender.subscribe()
    }

    /// Signals subscribers. Having none is not an error.
    pub fn notify(&self) {
        let _ = self.sender.send(TicketsChanged);
    }
}
