//! Single-resolution finalize waiter
//!
//! `finalize()` races a provider acknowledgment against a bounded timeout
//! and must resolve exactly once. The cell holds at most one armed waiter;
//! resolution takes the sender out of the cell before completing it, so a
//! second resolution attempt finds the cell empty and loses the race.

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// First-writer-wins completion cell for a pending finalize request.
#[derive(Debug, Default)]
pub struct FinalizeCell {
    waiter: Mutex<Option<oneshot::Sender<String>>>,
}

impl FinalizeCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the cell and return the receiving half, or `None` if a finalize
    /// request is already outstanding.
    pub fn arm(&self) -> Option<oneshot::Receiver<String>> {
        let mut waiter = self.waiter.lock();
        if waiter.is_some() {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        *waiter = Some(tx);
        Some(rx)
    }

    /// Resolve the pending waiter with `text`. Returns true if a waiter was
    /// armed and this call won the race.
    pub fn resolve(&self, text: String) -> bool {
        let sender = self.waiter.lock().take();
        match sender {
            // Receiver may already be gone if the timeout won; that still
            // counts as cleared.
            Some(tx) => tx.send(text).is_ok(),
            None => false,
        }
    }

    /// Discard the pending waiter without resolving it. Used by `stop()`
    /// when the caller has abandoned the session, and by the timeout path
    /// to clear the cell.
    pub fn discard(&self) {
        self.waiter.lock().take();
    }

    pub fn is_armed(&self) -> bool {
        self.waiter.lock().is_some()
    }
}
