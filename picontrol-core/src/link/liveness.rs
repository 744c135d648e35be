//! Per-slot evidence that a module is still present
//!
//! Written from the receive context and read by the scan loop without a
//! lock; each timestamp is a single atomic word.

use portable_atomic::{AtomicU32, Ordering};

use crate::scheduler::elapsed;

/// Last-frame and last-idle-line timestamps of one slot
#[derive(Debug, Default)]
pub struct SlotLiveness {
    last_frame_ms: AtomicU32,
    last_idle_ms: AtomicU32,
}

impl SlotLiveness {
    pub const fn new() -> Self {
        Self {
            last_frame_ms: AtomicU32::new(0),
            last_idle_ms: AtomicU32::new(0),
        }
    }

    /// A valid frame arrived
    pub fn record_frame(&self, now_ms: u32) {
        self.last_frame_ms.store(now_ms, Ordering::Release);
    }

    /// The receive line was seen at its idle level
    pub fn record_idle(&self, now_ms: u32) {
        self.last_idle_ms.store(now_ms, Ordering::Release);
    }

    /// Restart both windows, as on detection
    pub fn reset(&self, now_ms: u32) {
        self.record_frame(now_ms);
        self.record_idle(now_ms);
    }

    pub fn last_frame_ms(&self) -> u32 {
        self.last_frame_ms.load(Ordering::Acquire)
    }

    pub fn last_idle_ms(&self) -> u32 {
        self.last_idle_ms.load(Ordering::Acquire)
    }

    /// No frame and no idle line for longer than `timeout_ms`
    pub fn is_silent(&self, now_ms: u32, timeout_ms: u32) -> bool {
        elapsed(now_ms, self.last_frame_ms()) > timeout_ms
            && elapsed(now_ms, self.last_idle_ms()) > timeout_ms
    }
}
