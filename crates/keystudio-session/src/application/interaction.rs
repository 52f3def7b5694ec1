//! Tracks whether a drag interaction is in progress.
//!
//! Device polling is skipped while the user is dragging a binding or an
//! element, so the device list never reorders mid-gesture.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::debug;

/// Shared drag state, cheap to query from the poller.
#[derive(Debug, Default)]
pub struct InteractionMonitor {
    dragging: AtomicBool,
    drag_seq: AtomicU64,
}

impl InteractionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a drag as started and returns its sequence number.
    pub fn start_drag(&self) -> u64 {
        let drag_id = self.drag_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.dragging.store(true, Ordering::SeqCst);
        debug!(drag_id, "drag started");
        drag_id
    }

    pub fn end_drag(&self) {
        if self.dragging.swap(false, Ordering::SeqCst) {
            debug!(drag_id = self.drag_seq.load(Ordering::SeqCst), "drag ended");
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging.load(Ordering::SeqCst)
    }
}
