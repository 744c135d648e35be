//! State shared between the receive context, the console and the scan loop
//!
//! Everything here is usable through a shared reference so a single
//! `static` can serve every context on the firmware.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::host::RequestQueues;
use crate::link::{FrameQueue, SlotLiveness};
use crate::mapping::{MappingTable, SharedMappings};
use crate::port::{SlotId, SLOT_COUNT};

/// Cross-context hub state
pub struct HubShared<M: RawMutex> {
    /// Decoded frames from every slot, drained by the scan loop
    pub frames: FrameQueue<M>,
    /// Host requests, filled by the console
    pub requests: RequestQueues<M>,
    pub mappings: SharedMappings<M>,
    liveness: [SlotLiveness; SLOT_COUNT],
}

impl<M: RawMutex> HubShared<M> {
    pub const fn new() -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const SILENT: SlotLiveness = SlotLiveness::new();

        Self {
            frames: FrameQueue::new(),
            requests: RequestQueues::new(),
            mappings: Mutex::new(RefCell::new(MappingTable::new())),
            liveness: [SILENT; SLOT_COUNT],
        }
    }

    pub fn liveness(&self, slot: SlotId) -> &SlotLiveness {
        &self.liveness[slot.index()]
    }
}

impl<M: RawMutex> Default for HubShared<M> {
    fn default() -> Self {
        Self::new()
    }
}
