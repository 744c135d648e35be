//! Slot wiring of the board

use picontrol_hal::{ByteChannel, LineLevels};

use crate::port::SlotId;

/// Access to the lines and transports of every slot
pub trait Backplane {
    /// Transport used by each slot
    type Channel: ByteChannel;

    /// Sample both lines of a slot
    ///
    /// Absent cells report [`LineLevels::IDLE_EMPTY`].
    fn lines(&mut self, slot: SlotId) -> LineLevels;

    /// The transport of a slot, `None` for cells without a connector
    fn channel(&mut self, slot: SlotId) -> Option<&mut Self::Channel>;
}
