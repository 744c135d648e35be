//! Rate limiting of host parameter notifications
//!
//! Only the host-facing `param_changed` lines are limited; mapping output
//! always sees every change. A change arriving inside the throttle window
//! is held as pending and flushed by [`NotifyThrottle::sweep`] once the
//! parameter has been quiet for a full window.

use heapless::LinearMap;
use picontrol_protocol::{ParameterValue, MAX_PARAMETERS};

use crate::port::{SlotId, SLOT_COUNT};
use crate::scheduler::elapsed;

/// Notification state of one parameter
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingEvent {
    pub last_emitted: ParameterValue,
    pub last_emit_ms: u32,
    pub last_change_ms: u32,
    /// Latest value not yet reported
    pub pending: Option<ParameterValue>,
}

type SlotEvents = LinearMap<u8, PendingEvent, MAX_PARAMETERS>;

/// Per-parameter notification throttle for every slot
#[derive(Debug, Clone)]
pub struct NotifyThrottle {
    window_ms: u32,
    slots: [SlotEvents; SLOT_COUNT],
}

impl NotifyThrottle {
    pub fn new(window_ms: u32) -> Self {
        Self {
            window_ms,
            slots: core::array::from_fn(|_| LinearMap::new()),
        }
    }

    /// Record an accepted change
    ///
    /// Returns true if the host should be told now; otherwise the value
    /// waits for [`NotifyThrottle::sweep`].
    pub fn observe(
        &mut self,
        slot: SlotId,
        param_id: u8,
        value: ParameterValue,
        now_ms: u32,
    ) -> bool {
        let window_ms = self.window_ms;
        let events = &mut self.slots[slot.index()];

        let Some(event) = events.get_mut(&param_id) else {
            let first = PendingEvent {
                last_emitted: value,
                last_emit_ms: now_ms,
                last_change_ms: now_ms,
                pending: None,
            };
            // A full map only happens for ids beyond the descriptor limit;
            // those are reported unthrottled
            let _ = events.insert(param_id, first);
            return true;
        };

        event.last_change_ms = now_ms;
        if elapsed(now_ms, event.last_emit_ms) >= window_ms {
            event.last_emitted = value;
            event.last_emit_ms = now_ms;
            event.pending = None;
            true
        } else {
            event.pending = Some(value);
            false
        }
    }

    /// Flush pending values that have settled for a full window
    pub fn sweep(&mut self, now_ms: u32, mut emit: impl FnMut(SlotId, u8, ParameterValue)) {
        let window_ms = self.window_ms;
        for (index, events) in self.slots.iter_mut().enumerate() {
            let Some(slot) = SlotId::from_index(index) else {
                continue;
            };
            for (&param_id, event) in events.iter_mut() {
                let Some(value) = event.pending else {
                    continue;
                };
                if elapsed(now_ms, event.last_change_ms) >= window_ms {
                    event.last_emitted = value;
                    event.last_emit_ms = now_ms;
                    event.pending = None;
                    emit(slot, param_id, value);
                }
            }
        }
    }

    /// Forget a slot's history, as on module removal
    pub fn clear_slot(&mut self, slot: SlotId) {
        self.slots[slot.index()].clear();
    }

    pub fn get(&self, slot: SlotId, param_id: u8) -> Option<&PendingEvent> {
        self.slots[slot.index()].get(&param_id)
    }
}
