//! Single-permit wake signal.
//!
//! Any number of [`WakeSignal::release`] calls before an acquire collapse
//! into one permit, so a burst of change notifications costs one pass.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

#[derive(Clone)]
pub struct WakeSignal {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl WakeSignal {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    /// Make a permit available. No-op if one is already pending.
    pub fn release(&self) {
        let _ = self.tx.try_send(());
    }

    /// Block until a permit is available and take it.
    pub fn acquire(&self) {
        // Both ends live in `self`, so the channel cannot disconnect here.
        let _ = self.rx.recv();
    }

    pub fn try_acquire(&self) -> bool {
        match self.rx.try_recv() {
            Ok(()) => true,
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => false,
        }
    }

    /// Wait at most `timeout` for a permit. Returns whether one was taken.
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }

    pub fn has_permit(&self) -> bool {
        !self.rx.is_empty()
    }
}

impl Default for WakeSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WakeSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeSignal")
            .field("has_permit", &self.has_permit())
            .finish()
    }
}
